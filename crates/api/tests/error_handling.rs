//! Error envelope and rejection behaviour at the HTTP boundary.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axs_core::roles::Role;
use common::{body_json, post_json_auth, send};
use serde_json::json;

#[tokio::test]
async fn errors_use_the_error_code_envelope() {
    let test = common::build_test_app();
    let (_, guard) = test.seed_usuario(Role::Guardia, Some("C1"), None).await;

    let response = post_json_auth(
        test.app(),
        "/api/v1/visitas/VIS-nope/salida",
        json!({}),
        &guard,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["error"].as_str().unwrap().contains("VIS-nope"));
}

#[tokio::test]
async fn validar_needs_payload_or_both_fields() {
    let test = common::build_test_app();
    let (_, guard) = test.seed_usuario(Role::Guardia, Some("C1"), None).await;

    let response = post_json_auth(
        test.app(),
        "/api/v1/qr/validar",
        json!({ "visita_id": "VIS-1" }),
        &guard,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn blank_visitor_name_is_a_validation_error() {
    let test = common::build_test_app();
    let (_, resident) = test
        .seed_usuario(Role::Residente, Some("C1"), Some("U1"))
        .await;

    let response = post_json_auth(
        test.app(),
        "/api/v1/preregistro/crear",
        json!({
            "nombre_visitante": "   ",
            "fecha_visita": "2025-06-01T18:00:00Z",
            "tipo_visita": "personal",
        }),
        &resident,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test.store.evidence_count(), 0);
}

#[tokio::test]
async fn residents_cannot_create_visits_directly() {
    let test = common::build_test_app();
    let (_, resident) = test
        .seed_usuario(Role::Residente, Some("C1"), Some("U1"))
        .await;

    let response = post_json_auth(
        test.app(),
        "/api/v1/visitas",
        json!({
            "nombre_visitante": "Juan",
            "tipo_visita": "personal",
            "vigencia": "2025-06-01T18:00:00Z",
        }),
        &resident,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn malformed_json_is_rejected_before_the_engine() {
    let test = common::build_test_app();
    let (_, guard) = test.seed_usuario(Role::Guardia, Some("C1"), None).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/qr/validar")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {guard}"))
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(test.app(), request).await;
    assert!(response.status().is_client_error());
}
