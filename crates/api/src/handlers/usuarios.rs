//! Handlers for the `/usuarios` resource.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axs_core::domain::Usuario;
use axs_core::error::CoreError;
use axs_core::roles::Role;
use axs_core::usuarios::ProvisionUsuario;
use serde::Deserialize;

use crate::auth::password::{hash_password, validate_password_strength, MIN_PASSWORD_LENGTH};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /usuarios`.
#[derive(Debug, Deserialize)]
pub struct CreateUsuarioRequest {
    pub nombre: String,
    pub correo: String,
    pub password: String,
    pub rol: Role,
    #[serde(default)]
    pub condominio_id: Option<String>,
    #[serde(default)]
    pub casa_unidad: Option<String>,
}

/// POST /api/v1/usuarios
pub async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<CreateUsuarioRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Usuario>>)> {
    validate_password_strength(&input.password, MIN_PASSWORD_LENGTH)
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;
    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let request = ProvisionUsuario {
        nombre: input.nombre,
        correo: input.correo,
        rol: input.rol,
        condominio_id: input.condominio_id,
        casa_unidad: input.casa_unidad,
    };
    let usuario = state
        .usuarios
        .provision(&principal, request, password_hash)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: usuario })))
}

/// GET /api/v1/usuarios
pub async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> AppResult<Json<DataResponse<Vec<Usuario>>>> {
    let usuarios = state.usuarios.list(&principal).await?;
    Ok(Json(DataResponse { data: usuarios }))
}
