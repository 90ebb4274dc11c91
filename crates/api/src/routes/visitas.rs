//! Route definitions for the `/visitas` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::visitas;
use crate::state::AppState;

/// Routes mounted at `/visitas`.
///
/// ```text
/// GET  /                       -> list_condominium
/// POST /                       -> create
/// GET  /mias                   -> list_mine
/// GET  /{visita_id}            -> get_by_id
/// POST /{visita_id}/salida     -> register_exit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(visitas::list_condominium).post(visitas::create))
        .route("/mias", get(visitas::list_mine))
        .route("/{visita_id}", get(visitas::get_by_id))
        .route("/{visita_id}/salida", post(visitas::register_exit))
}
