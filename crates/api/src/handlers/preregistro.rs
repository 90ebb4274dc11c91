//! Handler for resident pre-registration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axs_core::visits::PreregistroInput;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::{CredentialResponse, DataResponse};
use crate::state::AppState;

/// POST /api/v1/preregistro/crear
///
/// Creates the visit, its credential and (when notes, plate or document are
/// given) one metadata evidence row atomically. Returns the QR as base64 PNG.
pub async fn crear(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<PreregistroInput>,
) -> AppResult<(StatusCode, Json<DataResponse<CredentialResponse>>)> {
    let grant = state
        .visits
        .create_from_preregistro(&principal, input)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: grant.into(),
        }),
    ))
}
