//! Route definitions for the `/evidencias` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::evidencias;
use crate::state::AppState;

/// Routes mounted at `/evidencias`.
///
/// ```text
/// POST /entrada/{visita_id}   -> entrada  (multipart)
/// POST /salida/{visita_id}    -> salida   (multipart)
/// GET  /{visita_id}           -> list
/// ```
///
/// `body_limit` replaces axum's 2 MiB default for the upload routes.
pub fn router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/entrada/{visita_id}", post(evidencias::entrada))
        .route("/salida/{visita_id}", post(evidencias::salida))
        .route("/{visita_id}", get(evidencias::list))
        .layer(DefaultBodyLimit::max(body_limit))
}
