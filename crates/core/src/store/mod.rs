//! Persistence boundary.
//!
//! [`VisitStore`] is the only way the engine touches durable state. Every
//! method that writes more than one row owns its unit of work: it opens
//! exactly one transaction and commits or rolls back before returning.
//! Callers never pass a transaction in, so nesting cannot happen.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Evidence, NewEvidence, NewUsuario, NewVisit, Usuario, Visit};
use crate::error::CoreError;
use crate::types::Timestamp;

/// Failure reported by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached in time; safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness rule was violated.
    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CoreError::Transient(msg),
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Backend(msg) => CoreError::Internal(msg),
        }
    }
}

/// Durable storage for usuarios, visitas and evidencias.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Cheap round-trip used by the health endpoint.
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_usuario(&self, usuario_id: &str) -> Result<Option<Usuario>, StoreError>;

    async fn find_usuario_by_correo(&self, correo: &str) -> Result<Option<Usuario>, StoreError>;

    async fn create_usuario(&self, input: &NewUsuario) -> Result<Usuario, StoreError>;

    /// All users, or only those of one condominium.
    async fn list_usuarios(&self, condominio_id: Option<&str>)
        -> Result<Vec<Usuario>, StoreError>;

    /// Insert a visit and, when given, its companion metadata evidence in a
    /// single transaction. Either both rows land or neither does.
    async fn create_visit(
        &self,
        visit: &NewVisit,
        metadata: Option<&NewEvidence>,
    ) -> Result<Visit, StoreError>;

    async fn find_visit(&self, visita_id: &str) -> Result<Option<Visit>, StoreError>;

    /// Replace token and expiry, only while the visit is still `pending`.
    ///
    /// Returns `None` when the visit is missing or no longer pending.
    async fn replace_credential(
        &self,
        visita_id: &str,
        token: &str,
        expiry: Timestamp,
    ) -> Result<Option<Visit>, StoreError>;

    /// Compare-and-swap `pending -> entrada_registrada`.
    ///
    /// Succeeds only if the stored state is `pending`, the stored token equals
    /// `token` and the stored expiry is after `now`. Returns `None` when any
    /// of those no longer hold, which is how a losing concurrent scan is
    /// detected.
    async fn consume_credential(
        &self,
        visita_id: &str,
        token: &str,
        now: Timestamp,
    ) -> Result<Option<Visit>, StoreError>;

    /// Compare-and-swap `entrada_registrada -> salida_registrada`.
    async fn record_exit(&self, visita_id: &str, now: Timestamp)
        -> Result<Option<Visit>, StoreError>;

    /// Visits of a condominium (optionally one unit), most recent validity
    /// window first.
    async fn list_visits(
        &self,
        condominio_id: &str,
        casa_unidad: Option<&str>,
    ) -> Result<Vec<Visit>, StoreError>;

    /// Insert a batch of evidence rows in one transaction.
    async fn append_evidence(&self, rows: &[NewEvidence]) -> Result<Vec<Evidence>, StoreError>;

    /// Evidence attached to a visit, oldest first.
    async fn list_evidence(&self, visita_id: &str) -> Result<Vec<Evidence>, StoreError>;
}

/// Run a store call under `limit`, surfacing a timeout as a transient
/// failure instead of hanging the request.
///
/// Dropping the inner future on timeout drops any transaction it holds,
/// which rolls it back.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(CoreError::from),
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Storage call timed out");
            Err(CoreError::Transient(format!(
                "storage call exceeded {}ms",
                limit.as_millis()
            )))
        }
    }
}
