//! Handlers for the `/auth` resource (login, current principal).

use axum::extract::State;
use axum::Json;
use axs_core::domain::Usuario;
use axs_core::error::CoreError;
use serde::{Deserialize, Serialize};

use crate::auth::password::verify_password;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub correo: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub usuario: Usuario,
}

/// POST /api/v1/auth/login
///
/// Exchange email + password for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let invalid = || AppError::Core(CoreError::Unauthorized("Invalid email or password".into()));

    let usuario = state
        .usuarios
        .find_by_correo(&input.correo)
        .await?
        .ok_or_else(invalid)?;

    let password_valid = verify_password(&input.password, &usuario.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !password_valid {
        tracing::info!(usuario_id = %usuario.usuario_id, "Login rejected");
        return Err(invalid());
    }

    let access_token = state
        .config
        .jwt
        .issue_access_token(&usuario.usuario_id, usuario.rol)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    tracing::info!(usuario_id = %usuario.usuario_id, rol = %usuario.rol, "Login succeeded");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.config.jwt.expires_in_secs(),
        usuario,
    }))
}

/// GET /api/v1/auth/me
pub async fn me(AuthUser(usuario): AuthUser) -> Json<DataResponse<Usuario>> {
    Json(DataResponse { data: usuario })
}
