pub mod auth;
pub mod evidencias;
pub mod health;
pub mod preregistro;
pub mod qr;
pub mod usuarios;
pub mod visitas;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                          login (public)
/// /auth/me                             current principal
///
/// /usuarios                            list, create (MSP_ADMIN, ADMIN_CONDOMINIO)
///
/// /visitas                             list (staff), create (ADMIN_CONDOMINIO)
/// /visitas/mias                        resident's own visits
/// /visitas/{visita_id}                 get
/// /visitas/{visita_id}/salida          register exit (GUARDIA)
///
/// /preregistro/crear                   resident pre-registration + credential
///
/// /qr/{visita_id}/generar              issue credential (POST)
/// /qr/{visita_id}/reenviar             resend credential (GET)
/// /qr/validar                          gate scan (POST, GUARDIA)
///
/// /evidencias/entrada/{visita_id}      multipart upload (GUARDIA)
/// /evidencias/salida/{visita_id}       multipart upload (GUARDIA)
/// /evidencias/{visita_id}              list
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        // Authentication.
        .nest("/auth", auth::router())
        // Account provisioning.
        .nest("/usuarios", usuarios::router())
        // Visit lifecycle.
        .nest("/visitas", visitas::router())
        .nest("/preregistro", preregistro::router())
        // Credentials.
        .nest("/qr", qr::router())
        // Evidence ledger; uploads get their own body limit.
        .nest(
            "/evidencias",
            evidencias::router(config.evidence_body_limit()),
        )
}
