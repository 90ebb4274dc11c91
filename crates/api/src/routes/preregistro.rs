//! Route definitions for the `/preregistro` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::preregistro;
use crate::state::AppState;

/// Routes mounted at `/preregistro`.
///
/// ```text
/// POST /crear   -> crear
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/crear", post(preregistro::crear))
}
