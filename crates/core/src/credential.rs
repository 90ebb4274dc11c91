//! Credential generator: random single-use tokens, expiry windows and the
//! scannable QR rendering of a `(visit, token)` pair.
//!
//! Pure and stateless. The rendered image carries no authority; only the
//! token stored on the visit is authoritative, so the PNG is regenerated on
//! demand and never persisted.

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::QrCode;
use rand::Rng;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Validity used when the caller does not ask for a duration.
pub const DEFAULT_CREDENTIAL_MINUTES: i64 = 60;

/// Shortest validity a credential can be issued with.
pub const MIN_CREDENTIAL_MINUTES: i64 = 1;

/// Hard ceiling on credential validity (7 days).
pub const MAX_CREDENTIAL_MINUTES: i64 = 7 * 24 * 60;

/// Length of the generated token (alphanumeric characters, ~119 bits).
pub const TOKEN_LENGTH: usize = 20;

/// System tag that opens every QR payload.
pub const PAYLOAD_TAG: &str = "AXS";

const PAYLOAD_SEPARATOR: char = '|';

/// Minimum edge length of the rendered QR image, in pixels.
const QR_MIN_DIMENSION: u32 = 256;

// ---------------------------------------------------------------------------
// Issuance
// ---------------------------------------------------------------------------

/// A freshly minted credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub expiry: Timestamp,
    /// Effective validity after clamping.
    pub minutes: i64,
    pub image_png: Vec<u8>,
}

/// Clamp a requested validity into `[1, 10080]` minutes.
///
/// Callers that recompute "remaining time" can hand in negative or huge
/// values after clock skew; those are clamped silently, never rejected.
pub fn clamp_minutes(requested: i64) -> i64 {
    requested.clamp(MIN_CREDENTIAL_MINUTES, MAX_CREDENTIAL_MINUTES)
}

/// Mint a token and expiry for `visit_id` and render its QR image.
pub fn issue(
    visit_id: &str,
    duration_minutes: i64,
    now: Timestamp,
) -> Result<IssuedCredential, CoreError> {
    let visit_id = normalize_visit_id(visit_id)?;
    let minutes = clamp_minutes(duration_minutes);
    let token = generate_token();
    let expiry = now + chrono::Duration::minutes(minutes);
    let image_png = render_png(visit_id, &token)?;

    Ok(IssuedCredential {
        token,
        expiry,
        minutes,
        image_png,
    })
}

/// Generate a random alphanumeric token from the thread-local CSPRNG.
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Whole minutes left before `expiry`, never less than one.
pub fn remaining_minutes(expiry: Timestamp, now: Timestamp) -> i64 {
    (expiry - now).num_minutes().max(MIN_CREDENTIAL_MINUTES)
}

/// Compare a presented token against the stored one without short-circuiting
/// on the first differing byte.
pub fn tokens_match(stored: &str, presented: &str) -> bool {
    let (a, b) = (stored.as_bytes(), presented.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn normalize_visit_id(visit_id: &str) -> Result<&str, CoreError> {
    let trimmed = visit_id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("visita_id must not be empty".into()));
    }
    if trimmed.contains(PAYLOAD_SEPARATOR) {
        return Err(CoreError::Validation(format!(
            "visita_id must not contain '{PAYLOAD_SEPARATOR}'"
        )));
    }
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The `(tag, visit, token)` triple encoded into the QR image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPayload {
    pub visita_id: String,
    pub token: String,
}

impl CredentialPayload {
    pub fn encode(&self) -> String {
        format!(
            "{PAYLOAD_TAG}{PAYLOAD_SEPARATOR}{}{PAYLOAD_SEPARATOR}{}",
            self.visita_id, self.token
        )
    }

    /// Decode a scanned `AXS|<visita_id>|<token>` string.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut parts = raw.trim().split(PAYLOAD_SEPARATOR);
        let (Some(tag), Some(visita_id), Some(token), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::Validation(
                "QR payload must have the form AXS|<visita_id>|<token>".into(),
            ));
        };

        if tag != PAYLOAD_TAG {
            return Err(CoreError::Validation(format!(
                "QR payload tag '{tag}' is not '{PAYLOAD_TAG}'"
            )));
        }
        if visita_id.is_empty() || token.is_empty() {
            return Err(CoreError::Validation(
                "QR payload is missing the visit id or token".into(),
            ));
        }

        Ok(Self {
            visita_id: visita_id.to_string(),
            token: token.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the QR image (PNG bytes) for a stored `(visit, token)` pair.
pub fn render_png(visit_id: &str, token: &str) -> Result<Vec<u8>, CoreError> {
    let payload = CredentialPayload {
        visita_id: normalize_visit_id(visit_id)?.to_string(),
        token: token.to_string(),
    }
    .encode();

    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| CoreError::Internal(format!("QR generation failed: {e}")))?;

    let pixels = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(pixels)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| CoreError::Internal(format!("QR rendering failed: {e}")))?;

    Ok(png)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
