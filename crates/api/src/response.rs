//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Credential-bearing
//! responses share [`CredentialResponse`].

use axs_core::credential::CredentialPayload;
use axs_core::domain::Visit;
use axs_core::types::Timestamp;
use axs_core::visits::CredentialGrant;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// A visit with its scannable credential image.
///
/// This is the only response that carries the entry token; [`Visit`]
/// never serializes it.
#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub visita: Visit,
    pub qr_token: Option<String>,
    /// The `AXS|<visita_id>|<token>` string encoded in the image.
    pub qr_payload: Option<String>,
    /// PNG image, standard base64.
    pub qr_base64: String,
    pub qr_vigencia: Option<Timestamp>,
    /// Minutes of validity the image carries.
    pub minutos_vigencia: i64,
    /// Whether a new token was minted by this request.
    pub reemitido: bool,
}

impl From<CredentialGrant> for CredentialResponse {
    fn from(grant: CredentialGrant) -> Self {
        let qr_payload = grant.visit.qr_token.as_ref().map(|token| {
            CredentialPayload {
                visita_id: grant.visit.visita_id.clone(),
                token: token.clone(),
            }
            .encode()
        });
        Self {
            qr_token: grant.visit.qr_token.clone(),
            qr_payload,
            qr_base64: STANDARD.encode(&grant.image_png),
            qr_vigencia: grant.visit.qr_vigencia,
            minutos_vigencia: grant.minutes,
            reemitido: grant.reissued,
            visita: grant.visit,
        }
    }
}
