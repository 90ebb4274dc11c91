use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axs_core::storage::LocalBlobStore;
use axs_core::store::memory::MemoryStore;
use axs_core::store::VisitStore;
use axs_core::types::SystemClock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axs_api::auth::password::hash_password;
use axs_api::config::ServerConfig;
use axs_api::router::build_app_router;
use axs_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axs_api=debug,axs_core=debug,axs_db=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json().with_current_span(true)))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Storage ---
    let (store, schema_ready) = open_store(&config).await;

    let blobs = Arc::new(LocalBlobStore::new(config.access.upload_dir.clone()));
    tracing::info!(upload_dir = %blobs.root().display(), "Evidence blob store ready");

    // --- App state ---
    let state = AppState::new(
        store,
        blobs,
        Arc::new(SystemClock),
        config.clone(),
        schema_ready,
    );

    bootstrap_admin(&state).await;

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Pick the persistence backend.
///
/// With `DATABASE_URL` the Postgres store is used and migrations run. A
/// failed migration does not stop the process; `/health` reports
/// `degraded` until a restart succeeds. Without `DATABASE_URL` the server
/// runs on the in-memory store.
async fn open_store(config: &ServerConfig) -> (Arc<dyn VisitStore>, bool) {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
        let store: Arc<dyn VisitStore> = Arc::new(MemoryStore::new());
        return (store, true);
    };

    let pool = axs_db::create_pool(
        database_url,
        config.db_max_connections,
        Duration::from_secs(config.db_acquire_timeout_secs),
    )
    .expect("Invalid DATABASE_URL");
    tracing::info!("Database connection pool created");

    let schema_ready = match axs_db::run_migrations(&pool).await {
        Ok(()) => {
            tracing::info!("Database migrations applied");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed; serving in degraded mode");
            false
        }
    };

    let store: Arc<dyn VisitStore> = Arc::new(axs_db::PgVisitStore::new(pool));
    (store, schema_ready)
}

/// Create the first `MSP_ADMIN` from `BOOTSTRAP_ADMIN_CORREO` and
/// `BOOTSTRAP_ADMIN_PASSWORD` when both are set.
async fn bootstrap_admin(state: &AppState) {
    let (Ok(correo), Ok(password)) = (
        std::env::var("BOOTSTRAP_ADMIN_CORREO"),
        std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
    ) else {
        return;
    };
    let nombre =
        std::env::var("BOOTSTRAP_ADMIN_NOMBRE").unwrap_or_else(|_| "Administrador MSP".into());

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "Could not hash bootstrap admin password");
            return;
        }
    };

    match state
        .usuarios
        .bootstrap_msp_admin(&nombre, &correo, password_hash)
        .await
    {
        Ok(Some(admin)) => tracing::info!(usuario_id = %admin.usuario_id, "Bootstrap admin ready"),
        Ok(None) => tracing::debug!("Bootstrap admin already exists"),
        Err(e) => tracing::error!(error = %e, "Bootstrap admin creation failed"),
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
