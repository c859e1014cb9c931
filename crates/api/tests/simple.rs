use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use qa_api::{app, AppState};
use qa_control::{Backends, ControlPlane, StateStore};
use qa_metrics::MetricsService;
use qa_testsupport::{test_config, FakeResolver, FakeRunner, FakeRuntime, FakeTunnels, TEST_SHA};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

async fn create_test_app(tunnels: FakeTunnels) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = Arc::new(
        StateStore::open(&dir.path().join(&config.data.state_file))
            .await
            .unwrap(),
    );
    let control = Arc::new(ControlPlane::new(
        config,
        store,
        Backends {
            resolver: Arc::new(FakeResolver::new().with_branch("main", TEST_SHA)),
            runner: Arc::new(FakeRunner::new()),
            runtime: Arc::new(FakeRuntime::new()),
            tunnels: Arc::new(tunnels),
        },
    ));
    let metrics = Arc::new(MetricsService::new().unwrap());
    (dir, app(AppState::new(control, metrics)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_environment_count() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;

    let (status, body) = send(&app, get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "environments": 0}));
}

#[tokio::test]
async fn provision_list_destroy_round() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;

    let (status, provisioned) = send(&app, post_json("/provision", json!({"branch": "main"}))).await;
    assert_eq!(status, StatusCode::OK);
    let env_id = provisioned["env_id"].as_str().unwrap().to_string();
    assert!(env_id.starts_with("main-0123456-"));
    assert_eq!(provisioned["sha"], TEST_SHA);
    assert_eq!(provisioned["url"], format!("https://{}.ngrok.test", env_id));
    assert!(provisioned["expires_at"].is_i64());

    let (status, listed) = send(&app, get("/list")).await;
    assert_eq!(status, StatusCode::OK);
    let environments = listed["environments"].as_array().unwrap();
    assert_eq!(environments.len(), 1);
    assert_eq!(environments[0]["env_id"], env_id.as_str());
    assert_eq!(environments[0]["branch"], "main");
    assert_eq!(environments[0]["service"], "web");
    assert!(environments[0]["ttl_min"].as_i64().unwrap() >= 119);

    let (status, destroyed) = send(&app, post_json("/destroy", json!({"env_id": env_id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(destroyed, json!({"ok": true}));

    let (_, listed) = send(&app, get("/list")).await;
    assert!(listed["environments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_service_is_a_bad_request() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;

    let (status, body) = send(
        &app,
        post_json("/provision", json!({"branch": "main", "service": "db"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid service 'db'. Allowed: api, web");
    assert_eq!(body["error_type"], "InvalidParameterValue");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;

    let (status, body) = send(&app, post_json("/provision", json!({"service": "web"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "InvalidParameterValue");
}

#[tokio::test]
async fn destroy_unknown_environment_is_not_found() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;

    let (status, body) = send(&app, post_json("/destroy", json!({"env_id": "ghost"}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_type"], "ResourceNotFound");
}

#[tokio::test]
async fn tunnel_failure_is_a_server_error() {
    let (_dir, app) = create_test_app(FakeTunnels::failing()).await;

    let (status, body) = send(&app, post_json("/provision", json!({"branch": "main"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_type"], "TunnelError");

    let (_, health) = send(&app, get("/healthz")).await;
    assert_eq!(health["environments"], 0);
}

#[tokio::test]
async fn gc_with_nothing_expired_returns_empty_list() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;
    send(&app, post_json("/provision", json!({"branch": "main"}))).await;

    let (status, body) = send(&app, Request::post("/gc").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"garbage_collected": []}));
}

#[tokio::test]
async fn metrics_endpoint_exposes_counters() {
    let (_dir, app) = create_test_app(FakeTunnels::new()).await;
    send(&app, post_json("/provision", json!({"branch": "main"}))).await;

    let res = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("qa_provisions_total 1"));
    assert!(text.contains("qa_active_environments 1"));
}
