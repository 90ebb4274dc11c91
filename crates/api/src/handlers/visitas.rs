//! Handlers for the `/visitas` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use axs_core::domain::Visit;
use axs_core::visits::CreateVisit;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/visitas
///
/// Direct creation by a condominium administrator. No credential is issued.
pub async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<CreateVisit>,
) -> AppResult<(StatusCode, Json<DataResponse<Visit>>)> {
    let visit = state.visits.create_direct(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: visit })))
}

/// GET /api/v1/visitas/mias
pub async fn list_mine(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> AppResult<Json<DataResponse<Vec<Visit>>>> {
    let visits = state.visits.list_for_resident(&principal).await?;
    Ok(Json(DataResponse { data: visits }))
}

/// GET /api/v1/visitas
pub async fn list_condominium(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> AppResult<Json<DataResponse<Vec<Visit>>>> {
    let visits = state.visits.list_for_condominium(&principal).await?;
    Ok(Json(DataResponse { data: visits }))
}

/// GET /api/v1/visitas/{visita_id}
pub async fn get_by_id(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
) -> AppResult<Json<DataResponse<Visit>>> {
    let visit = state.visits.get_visit(&principal, &visita_id).await?;
    Ok(Json(DataResponse { data: visit }))
}

/// POST /api/v1/visitas/{visita_id}/salida
pub async fn register_exit(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
) -> AppResult<Json<DataResponse<Visit>>> {
    let visit = state.visits.register_exit(&principal, &visita_id).await?;
    Ok(Json(DataResponse { data: visit }))
}
