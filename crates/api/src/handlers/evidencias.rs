//! Handlers for the `/evidencias` resource.
//!
//! Uploads are multipart forms with up to six optional file slots. Unknown
//! fields and empty files are skipped.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use axs_core::domain::{Evidence, EvidenceCategory};
use axs_core::error::CoreError;
use axs_core::evidence::{slot_for_field, EvidenceItem};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/evidencias/entrada/{visita_id}
pub async fn entrada(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<Evidence>>>)> {
    attach(state, principal, visita_id, EvidenceCategory::Entrada, multipart).await
}

/// POST /api/v1/evidencias/salida/{visita_id}
pub async fn salida(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<Evidence>>>)> {
    attach(state, principal, visita_id, EvidenceCategory::Salida, multipart).await
}

/// GET /api/v1/evidencias/{visita_id}
pub async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(visita_id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<Evidence>>>> {
    let records = state.evidence.list(&principal, &visita_id).await?;
    Ok(Json(DataResponse { data: records }))
}

async fn attach(
    state: AppState,
    principal: axs_core::domain::Usuario,
    visita_id: String,
    categoria: EvidenceCategory,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<Evidence>>>)> {
    let items = read_slots(multipart).await?;
    let records = state
        .evidence
        .attach(&principal, &visita_id, categoria, items)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: records })))
}

async fn read_slots(mut multipart: Multipart) -> Result<Vec<EvidenceItem>, AppError> {
    let mut items = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(slot) = field.name().and_then(slot_for_field) else {
            continue;
        };
        let filename = field.file_name().unwrap_or(slot).to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            continue;
        }
        items.push(EvidenceItem {
            sub_tipo: slot.to_string(),
            filename,
            content_type,
            bytes: data.to_vec(),
        });
    }

    Ok(items)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Core(CoreError::PayloadTooLarge(err.body_text()))
    } else {
        AppError::BadRequest(err.body_text())
    }
}
