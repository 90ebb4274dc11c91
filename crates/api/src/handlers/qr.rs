//! Handlers for credential issue, resend and gate validation.

use axum::extract::{Path, Query, State};
use axum::Json;
use axs_core::credential::CredentialPayload;
use axs_core::domain::Visit;
use axs_core::error::CoreError;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::{CredentialResponse, DataResponse};
use crate::state::AppState;

/// Query parameters for `POST /qr/{visita_id}/generar`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerarParams {
    pub minutos_vigencia: Option<i64>,
}

/// Request body for `POST /qr/validar`.
///
/// Either the raw scanned `payload` (`AXS|<visita_id>|<token>`) or the
/// `visita_id` + `token` pair.
#[derive(Debug, Deserialize)]
pub struct ValidarRequest {
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub visita_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl ValidarRequest {
    fn into_presented(self) -> Result<CredentialPayload, AppError> {
        if let Some(raw) = self.payload {
            return Ok(CredentialPayload::parse(&raw)?);
        }
        match (self.visita_id, self.token) {
            (Some(visita_id), Some(token)) => Ok(CredentialPayload { visita_id, token }),
            _ => Err(AppError::Core(CoreError::Validation(
                "Provide either payload or both visita_id and token".into(),
            ))),
        }
    }
}

/// POST /api/v1/qr/{visita_id}/generar
///
/// Mint a new credential, replacing any previous token.
pub async fn generar(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
    Query(params): Query<GenerarParams>,
) -> AppResult<Json<DataResponse<CredentialResponse>>> {
    let grant = state
        .visits
        .issue_credential(&principal, &visita_id, params.minutos_vigencia)
        .await?;
    Ok(Json(DataResponse { data: grant.into() }))
}

/// GET /api/v1/qr/{visita_id}/reenviar
///
/// Return the current credential, minting one only if it is absent or
/// expired.
pub async fn reenviar(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
) -> AppResult<Json<DataResponse<CredentialResponse>>> {
    let grant = state
        .visits
        .resend_credential(&principal, &visita_id)
        .await?;
    Ok(Json(DataResponse { data: grant.into() }))
}

/// POST /api/v1/qr/validar
///
/// Gate scan. On success the visit moves to `entrada_registrada`.
pub async fn validar(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<ValidarRequest>,
) -> AppResult<Json<DataResponse<Visit>>> {
    let presented = input.into_presented()?;
    let visit = state
        .visits
        .validate_credential(&principal, &presented.visita_id, &presented.token)
        .await?;
    Ok(Json(DataResponse { data: visit }))
}
