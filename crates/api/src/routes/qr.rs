//! Route definitions for the `/qr` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::qr;
use crate::state::AppState;

/// Routes mounted at `/qr`.
///
/// ```text
/// POST /validar                 -> validar
/// POST /{visita_id}/generar     -> generar  (?minutos_vigencia=N)
/// GET  /{visita_id}/reenviar    -> reenviar
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/validar", post(qr::validar))
        .route("/{visita_id}/generar", post(qr::generar))
        .route("/{visita_id}/reenviar", get(qr::reenviar))
}
