//! Principal extraction for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axs_core::domain::Usuario;
use axs_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying an opaque principal id from a trusted gateway.
pub const PRINCIPAL_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved to its current stored record.
///
/// Authorization itself is not decided here; each engine operation runs the
/// role gate against this principal.
///
/// ```ignore
/// async fn my_handler(AuthUser(usuario): AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(usuario_id = %usuario.usuario_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub Usuario);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let subject = subject_from_headers(parts, state)?;
        let usuario = state.usuarios.resolve(&subject).await?;
        Ok(AuthUser(usuario))
    }
}

fn subject_from_headers(parts: &Parts, state: &AppState) -> Result<String, AppError> {
    if let Some(auth_header) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = state.config.jwt.verify(token).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;
        return Ok(claims.sub);
    }

    if state.config.trust_principal_header {
        if let Some(id) = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Ok(id.to_string());
        }
    }

    Err(AppError::Core(CoreError::Unauthorized(
        "Missing Authorization header".into(),
    )))
}
