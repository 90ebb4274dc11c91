/// Domain error taxonomy shared by every component.
///
/// The credential variants are kept separate so the boundary can render a
/// precise denial reason at the gate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Credential does not match the visit")]
    InvalidCredential,

    #[error("Credential is missing or has expired")]
    ExpiredCredential,

    #[error("Credential has already been used")]
    AlreadyConsumed,

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
