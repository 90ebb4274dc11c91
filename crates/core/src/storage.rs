//! Blob storage collaborator for evidence files.
//!
//! The ledger only relies on `store(filename, bytes) -> locator` and a
//! best-effort `remove(locator)`. [`LocalBlobStore`] writes under a root
//! directory on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::store::StoreError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under `filename` (a relative path) and return a locator.
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, StoreError>;

    /// Remove a previously stored blob.
    async fn remove(&self, locator: &str) -> Result<(), StoreError>;
}

/// Replace anything outside `[A-Za-z0-9._-]` so client-supplied names cannot
/// escape the storage root. Empty names become `archivo.bin`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "archivo.bin".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let dest = self.root.join(filename);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| StoreError::Unavailable(format!("write {}: {e}", dest.display())))?;
        Ok(dest.to_string_lossy().into_owned())
    }

    async fn remove(&self, locator: &str) -> Result<(), StoreError> {
        tokio::fs::remove_file(locator)
            .await
            .map_err(|e| StoreError::Backend(format!("remove {locator}: {e}")))
    }
}
