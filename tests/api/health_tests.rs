//! Health Check API Tests

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new();

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_storage_and_connections() {
    let app = TestApp::new();
    let (_id, _rx) = app
        .state
        .gateway
        .connect(chat_sync::domain::UserId::from("alice"))
        .unwrap();

    let response = app.server.get("/health/ready").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["checks"]["storage"]["status"], "healthy");
    assert_eq!(body["checks"]["gateway"]["active_connections"], 1);
    assert_eq!(body["checks"]["gateway"]["online_users"], 1);
}

#[tokio::test]
async fn test_readiness_fails_when_store_is_down() {
    let app = TestApp::new();
    app.store.set_unavailable(true);

    let response = app.server.get("/health/ready").expect_failure().await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["status"], "unhealthy");
}

#[tokio::test]
async fn test_readiness_fails_when_gateway_is_stopped() {
    let app = TestApp::new();
    app.state.gateway.stop();

    let response = app.server.get("/health/ready").expect_failure().await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let app = TestApp::new();

    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("chat_sync_"));
}
