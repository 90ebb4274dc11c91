use std::sync::Arc;

use axs_core::evidence::EvidenceLedger;
use axs_core::storage::BlobStore;
use axs_core::store::VisitStore;
use axs_core::types::Clock;
use axs_core::usuarios::UserDirectory;
use axs_core::visits::VisitLifecycle;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every component sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence boundary (Postgres or in-memory).
    pub store: Arc<dyn VisitStore>,
    pub config: Arc<ServerConfig>,
    pub visits: Arc<VisitLifecycle>,
    pub evidence: Arc<EvidenceLedger>,
    pub usuarios: Arc<UserDirectory>,
    /// `false` when startup migrations failed; `/health` then reports
    /// `degraded`.
    pub schema_ready: bool,
}

impl AppState {
    /// Wire the engine components around one store, blob store and clock.
    pub fn new(
        store: Arc<dyn VisitStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
        schema_ready: bool,
    ) -> Self {
        let access = config.access.clone();
        Self {
            visits: Arc::new(VisitLifecycle::new(
                Arc::clone(&store),
                clock,
                access.clone(),
            )),
            evidence: Arc::new(EvidenceLedger::new(Arc::clone(&store), blobs, &access)),
            usuarios: Arc::new(UserDirectory::new(Arc::clone(&store), access.store_timeout)),
            store,
            config: Arc::new(config),
            schema_ready,
        }
    }
}
