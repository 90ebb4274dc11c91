#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use axs_api::auth::jwt::JwtConfig;
use axs_api::auth::password::hash_password;
use axs_api::config::ServerConfig;
use axs_api::router::build_app_router;
use axs_api::state::AppState;
use axs_core::config::AccessConfig;
use axs_core::domain::{new_usuario_id, NewUsuario, Usuario};
use axs_core::roles::Role;
use axs_core::storage::LocalBlobStore;
use axs_core::store::memory::MemoryStore;
use axs_core::store::VisitStore;
use axs_core::types::ManualClock;

pub const TEST_PASSWORD: &str = "test_password_123!";

/// Per-item evidence ceiling used by the test config.
pub const TEST_MAX_EVIDENCE_BYTES: usize = 1024;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(upload_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        db_max_connections: 1,
        db_acquire_timeout_secs: 1,
        trust_principal_header: true,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        access: AccessConfig {
            upload_dir: upload_dir.to_path_buf(),
            max_evidence_bytes: TEST_MAX_EVIDENCE_BYTES,
            ..AccessConfig::default()
        },
    }
}

/// A running application over the in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub uploads: TempDir,
}

impl TestApp {
    /// A fresh handle to the router for one request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Insert a user directly and return it with a bearer token.
    pub async fn seed_usuario(
        &self,
        rol: Role,
        condominio_id: Option<&str>,
        casa_unidad: Option<&str>,
    ) -> (Usuario, String) {
        let usuario_id = new_usuario_id();
        let input = NewUsuario {
            correo: format!("{}@test.com", usuario_id.to_lowercase()),
            usuario_id,
            condominio_id: condominio_id.map(str::to_string),
            casa_unidad: casa_unidad.map(str::to_string),
            rol,
            nombre: format!("Test {rol}"),
            password_hash: hash_password(TEST_PASSWORD).expect("hashing should succeed"),
        };
        let usuario = self
            .store
            .create_usuario(&input)
            .await
            .expect("user creation should succeed");
        let token = self
            .state
            .config
            .jwt
            .issue_access_token(&usuario.usuario_id, usuario.rol)
            .expect("token generation should succeed");
        (usuario, token)
    }
}

/// Build the full application router over a memory store, a temp upload
/// directory and a manual clock starting at 2025-06-01T12:00:00Z.
pub fn build_test_app() -> TestApp {
    let uploads = tempfile::tempdir().expect("tempdir");
    let config = test_config(uploads.path());

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemoryStore::with_clock(
        Arc::clone(&clock) as Arc<dyn axs_core::types::Clock>
    ));
    let blobs = Arc::new(LocalBlobStore::new(uploads.path()));

    let state = AppState::new(
        Arc::clone(&store) as Arc<dyn VisitStore>,
        blobs,
        Arc::clone(&clock) as Arc<dyn axs_core::types::Clock>,
        config.clone(),
        true,
    );
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        store,
        clock,
        uploads,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("request should complete")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub const MULTIPART_BOUNDARY: &str = "axs-test-boundary";

/// Encode `(field, filename, bytes)` parts as a multipart/form-data body.
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, bytes) in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart_auth(
    app: Router,
    uri: &str,
    body: Vec<u8>,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// Pre-register a visit as `resident_token` and return the `data` object.
pub async fn preregister(app: Router, resident_token: &str, nombre: &str) -> serde_json::Value {
    let body = serde_json::json!({
        "nombre_visitante": nombre,
        "fecha_visita": "2025-06-01T18:00:00Z",
        "tipo_visita": "personal",
        "placa": "ABC-123",
        "minutos_vigencia": 30,
    });
    let response = post_json_auth(app, "/api/v1/preregistro/crear", body, resident_token).await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"].clone()
}
