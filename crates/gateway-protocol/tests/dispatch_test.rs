//! Integration tests for the `/mcp` surface, exercised through the real
//! `axum::Router` with `tower::ServiceExt::oneshot` (mirrors the
//! teacher's own transport tests).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gateway_audit::{AuditLogger, SqliteAuditStorage};
use gateway_core::config::ConfigStore;
use gateway_identity::keys::Keyring;
use gateway_identity::token::TokenService;
use gateway_protocol::{router, GatewayState};
use gateway_rbac::bootstrap::bootstrap_admin_if_empty;
use gateway_rbac::{RbacEngine, RbacStore};
use gateway_registry::{HealthConfig, Registry, RegistryStore};
use gateway_session::{SessionManager, SessionManagerConfig};
use gateway_transport::TransportClient;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

async fn build_state(dev_mode: bool) -> Arc<GatewayState> {
    let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
    let config = Arc::new(ConfigStore::new(pool.clone()).await.unwrap());
    let audit_storage = Arc::new(SqliteAuditStorage::new(pool.clone()).await.unwrap());
    let audit = AuditLogger::new(audit_storage, 90);

    let rbac_store = Arc::new(RbacStore::new(pool.clone()).await.unwrap());
    let rbac = RbacEngine::new(rbac_store);
    bootstrap_admin_if_empty(&rbac, &audit).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let keyring = Keyring::load_or_generate(&dir.path().join("k"), &[7u8; 32]).unwrap();
    let tokens = Arc::new(TokenService::new(keyring, None, false, 8));

    let transport = Arc::new(TransportClient::new(4, 8, Duration::from_secs(5)).unwrap());
    let registry_store = Arc::new(RegistryStore::new(pool.clone()).await.unwrap());
    let registry = Arc::new(Registry::new(registry_store, transport, audit.clone(), HealthConfig::default()));

    let sessions = Arc::new(SessionManager::new(SessionManagerConfig::default()));

    Arc::new(GatewayState {
        config,
        tokens,
        rbac,
        registry,
        sessions,
        audit,
        dev_mode,
        unary_call_timeout: Duration::from_secs(5),
        admin_first_run_bypass_paths: vec![
            "/admin/oauth/providers".to_string(),
            "/admin/ad/config".to_string(),
            "/admin/ad/groups".to_string(),
        ],
    })
}

#[tokio::test]
async fn missing_origin_without_dev_mode_is_rejected() {
    let state = build_state(false).await;
    let app = router().with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "protocolVersion": "2025-06-18" } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn initialize_in_dev_mode_returns_session_header() {
    let state = build_state(true).await;
    let app = router().with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "protocolVersion": "2025-06-18" } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("Mcp-Session-Id").is_some());
}

#[tokio::test]
async fn initialize_with_mismatched_protocol_version_is_jsonrpc_error() {
    let state = build_state(true).await;
    let app = router().with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "protocolVersion": "1999-01-01" } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["data"]["kind"], "PROTOCOL_VERSION_MISMATCH");
}

#[tokio::test]
async fn tools_list_without_authentication_is_rejected() {
    let state = build_state(true).await;
    let app = router().with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-protocol-version", "2025-06-18")
                .body(Body::from(serde_json::json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["data"]["kind"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn delete_without_session_header_is_bad_request() {
    let state = build_state(true).await;
    let app = router().with_state(state);

    let response = app
        .oneshot(Request::builder().method("DELETE").uri("/mcp").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
