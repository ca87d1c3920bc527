//! Integration tests for the REST API endpoints
//!
//! Exercises the real router over the mock windowing collaborator using
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use ki_identity_browser::api::{create_router, AppState};
use ki_identity_browser::config::{IdentitySettings, ViewportConfig};
use ki_identity_browser::context::{ContextHandle, ContextLifecycleManager, MockWindowing};
use ki_identity_browser::fingerprint::generate;
use ki_identity_browser::injection::script::guard_key;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_state() -> (Arc<MockWindowing>, AppState) {
    let windowing = Arc::new(MockWindowing::new());
    let manager = ContextLifecycleManager::new(windowing.clone(), IdentitySettings::default());
    (windowing, AppState::new(manager))
}

fn create_test_router() -> Router {
    create_router(create_state().1)
}

async fn make_request(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, body_json)
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router();

    let (status, body) = make_request(app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["running_contexts"], 0);
    assert!(!body["data"]["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_disabled_api_rejects_requests() {
    let (_windowing, state) = create_state();
    state.set_enabled(false).await;
    let app = create_router(state);

    let (status, body) = make_request(app.clone(), Method::GET, "/accounts", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    // Health stays reachable.
    let (status, body) = make_request(app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["api_enabled"], false);
}

// ============================================================================
// Fingerprints
// ============================================================================

#[tokio::test]
async fn test_generate_with_seed_is_deterministic() {
    let app = create_test_router();

    let (status, first) = make_request(
        app.clone(),
        Method::POST,
        "/fingerprints/generate",
        Some(json!({ "seed": "account-1" })),
    )
    .await;
    let (_, second) = make_request(
        app,
        Method::POST,
        "/fingerprints/generate",
        Some(json!({ "seed": "account-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["profile"], second["data"]["profile"]);
    assert_eq!(first["data"]["quality"]["score"], 100);
    assert!(first["data"]["userAgent"].as_str().unwrap().contains("Chrome/"));
    assert_eq!(
        first["data"]["profile"]["navigator"]["platform"],
        json!(generate(Some("account-1")).navigator.platform)
    );
}

#[tokio::test]
async fn test_generate_without_seed() {
    let app = create_test_router();

    let (status, body) =
        make_request(app, Method::POST, "/fingerprints/generate", Some(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["profile"]["canvas"]["noiseAmplitude"].is_number());
}

#[tokio::test]
async fn test_validate_reports_penalties() {
    let app = create_test_router();
    let mut profile = serde_json::to_value(generate(Some("validate"))).unwrap();
    profile["canvas"]["noiseAmplitude"] = json!(0.6);

    let (status, body) =
        make_request(app, Method::POST, "/fingerprints/validate", Some(profile)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"], 90);
    assert_eq!(body["data"]["isConsistent"], false);
}

#[tokio::test]
async fn test_validate_rejects_malformed_profile() {
    let app = create_test_router();

    let (status, body) = make_request(
        app,
        Method::POST,
        "/fingerprints/validate",
        Some(json!({ "canvas": "nope" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Malformed"));
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_start_list_and_stop_account() {
    let (windowing, state) = create_state();
    let app = create_router(state);

    let (status, body) =
        make_request(app.clone(), Method::POST, "/accounts/a1/start", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accountId"], "a1");
    assert_eq!(body["data"]["state"]["state"], "running");
    assert_eq!(body["data"]["partition"], "persist:account-a1");

    let (_, list) = make_request(app.clone(), Method::GET, "/accounts", None).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);

    let (status, body) = make_request(app.clone(), Method::POST, "/accounts/a1/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "stopped");
    assert_eq!(windowing.open_count().await, 0);

    let (_, list) = make_request(app, Method::GET, "/accounts", None).await;
    assert!(list["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_twice_returns_same_context() {
    let (windowing, state) = create_state();
    let app = create_router(state);

    let (_, first) =
        make_request(app.clone(), Method::POST, "/accounts/a1/start", Some(json!({}))).await;
    let (_, second) =
        make_request(app, Method::POST, "/accounts/a1/start", Some(json!({}))).await;

    assert_eq!(first["data"]["contextId"], second["data"]["contextId"]);
    assert_eq!(windowing.created_count(), 1);
}

#[tokio::test]
async fn test_start_with_account_config() {
    let (windowing, state) = create_state();
    let app = create_router(state);

    let config = json!({
        "proxy": { "type": "socks5", "host": "10.0.0.2", "port": 9050 },
        "userAgentOverride": "Agent/2.0",
        "viewport": { "width": 1280, "height": 720 }
    });
    let (status, body) =
        make_request(app, Method::POST, "/accounts/cfg/start", Some(config)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userAgent"], "Agent/2.0");

    let handle = ContextHandle::new(body["data"]["contextId"].as_str().unwrap());
    assert_eq!(
        windowing.proxy_rules(&handle).await.as_deref(),
        Some("socks5://10.0.0.2:9050")
    );
    assert_eq!(windowing.viewport(&handle).await, Some(ViewportConfig::new(1280, 720)));
}

#[tokio::test]
async fn test_start_reports_creation_failure() {
    let (windowing, state) = create_state();
    windowing.set_fail_creation(true);
    let app = create_router(state);

    let (status, body) =
        make_request(app.clone(), Method::POST, "/accounts/a1/start", Some(json!({}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    let (_, account) = make_request(app, Method::GET, "/accounts/a1", None).await;
    assert_eq!(account["data"]["state"]["state"], "error");
}

#[tokio::test]
async fn test_stop_unknown_account_is_noop() {
    let app = create_test_router();

    let (status, body) = make_request(app, Method::POST, "/accounts/ghost/stop", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "idle");
}

// ============================================================================
// Per-account fingerprints and scripts
// ============================================================================

#[tokio::test]
async fn test_fingerprint_get_put_delete() {
    let app = create_test_router();

    let (status, _) = make_request(app.clone(), Method::GET, "/accounts/a1/fingerprint", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let profile = serde_json::to_value(generate(Some("custom"))).unwrap();
    let (status, body) = make_request(
        app.clone(),
        Method::PUT,
        "/accounts/a1/fingerprint",
        Some(profile.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"], 100);

    let (status, body) = make_request(app.clone(), Method::GET, "/accounts/a1/fingerprint", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["navigator"], profile["navigator"]);

    let (status, _) = make_request(app.clone(), Method::DELETE, "/accounts/a1/fingerprint", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = make_request(app, Method::GET, "/accounts/a1/fingerprint", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_rejects_invalid_profile() {
    let app = create_test_router();
    let mut profile = serde_json::to_value(generate(Some("broken"))).unwrap();
    profile["screen"]["width"] = json!(0);

    let (status, body) =
        make_request(app, Method::PUT, "/accounts/a1/fingerprint", Some(profile)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_script_for_started_account() {
    let app = create_test_router();

    let (status, _) = make_request(app.clone(), Method::GET, "/accounts/s1/script", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    make_request(app.clone(), Method::POST, "/accounts/s1/start", Some(json!({}))).await;

    let (status, body) = make_request(app, Method::GET, "/accounts/s1/script", None).await;
    assert_eq!(status, StatusCode::OK);
    let script = body["data"]["script"].as_str().unwrap();
    assert!(script.contains(&format!("Symbol.for('{}')", guard_key())));
    assert!(script.contains(&generate(Some("s1")).navigator.platform));
}

// ============================================================================
// API management
// ============================================================================

#[tokio::test]
async fn test_toggle_and_status() {
    let app = create_test_router();

    let (status, body) = make_request(
        app.clone(),
        Method::POST,
        "/api/toggle",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);

    let (_, body) = make_request(app, Method::GET, "/api/status", None).await;
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(body["data"]["connected_clients"], 0);
}
