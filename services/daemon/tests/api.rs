//! End-to-end tests for the control API.
//!
//! Drive the router directly with `tower::ServiceExt::oneshot`, a mock
//! reboot runner, and a config store on a temp directory.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use reboot_daemon::api::{create_router, AppState, AuthToken};
use reboot_daemon::config::ConfigStore;
use reboot_daemon::runner::{MockRunner, RebootRunner};
use reboot_daemon::scheduler::RebootScheduler;
use reboot_daemon::types::RebootStrategy;

const TOKEN: &str = "test-token";

fn test_app(strategy: RebootStrategy) -> (Router, Arc<MockRunner>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("rebootd.toml"));
    let settings = store.load();
    let runner = Arc::new(MockRunner::new());
    let scheduler = RebootScheduler::new(
        Arc::clone(&runner) as Arc<dyn RebootRunner>,
        store,
        strategy,
        settings.window,
    );
    let app = create_router(AppState {
        scheduler,
        auth: AuthToken::new(TOKEN.to_string()),
    });
    (app, runner, dir)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_status_is_open_and_idle_by_default() {
    let (app, _runner, _dir) = test_app(RebootStrategy::BestEffort);

    let response = app.oneshot(get("/v1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "not-requested");
    assert!(body.get("requested_method").is_none());
}

#[tokio::test]
async fn test_mutating_route_requires_token() {
    let (app, runner, _dir) = test_app(RebootStrategy::Instantly);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/reboot")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "method": "hard" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "PermissionDenied");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_token_is_denied() {
    let (app, _runner, _dir) = test_app(RebootStrategy::Instantly);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/cancel")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reboot_then_replay_reports_in_progress() {
    let (app, _runner, _dir) = test_app(RebootStrategy::MaintWindow);

    // Pin the window hours away so the scheduled reboot stays pending for
    // the whole test regardless of when it runs.
    let start = (chrono::Utc::now() + chrono::Duration::hours(6))
        .format("%H:%M")
        .to_string();
    let response = app
        .clone()
        .oneshot(authed(
            "PUT",
            "/v1/window",
            json!({ "start": start, "duration": "1h" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed("POST", "/v1/reboot", json!({ "method": "soft" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await;
    assert_eq!(first["method"], "soft");
    let scheduled_at = first["scheduled_at"].clone();

    let response = app
        .oneshot(authed("POST", "/v1/reboot", json!({ "method": "hard" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "AlreadyInProgress");
    assert_eq!(body["method"], "soft");
    assert_eq!(body["scheduled_at"], scheduled_at);
}

#[tokio::test]
async fn test_cancel_when_idle_names_the_condition() {
    let (app, _runner, _dir) = test_app(RebootStrategy::BestEffort);

    let response = app
        .oneshot(authed("POST", "/v1/cancel", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NoRebootScheduled");
}

#[tokio::test]
async fn test_set_window_validation_names_offending_field() {
    let (app, _runner, _dir) = test_app(RebootStrategy::BestEffort);

    let response = app
        .clone()
        .oneshot(authed(
            "PUT",
            "/v1/window",
            json!({ "start": "25:00", "duration": "1h" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "InvalidParameter");
    assert_eq!(body["variable"], "start time");

    let response = app
        .oneshot(authed(
            "PUT",
            "/v1/window",
            json!({ "start": "03:30", "duration": "never" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["variable"], "duration");
}

#[tokio::test]
async fn test_set_strategy_rejects_unknown_value() {
    let (app, _runner, _dir) = test_app(RebootStrategy::BestEffort);

    let response = app
        .oneshot(authed(
            "PUT",
            "/v1/strategy",
            json!({ "strategy": "sometimes" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "InvalidParameter");
    assert_eq!(body["variable"], "strategy");
}

#[tokio::test]
async fn test_set_strategy_and_window_round_trip_in_full_status() {
    let (app, _runner, _dir) = test_app(RebootStrategy::BestEffort);

    let response = app
        .clone()
        .oneshot(authed(
            "PUT",
            "/v1/strategy",
            json!({ "strategy": "maint-window" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed(
            "PUT",
            "/v1/window",
            json!({ "start": "Mon,Fri 02:00", "duration": "1h30m" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/v1/full-status")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["strategy"], "maint-window");
    assert_eq!(body["window_start"], "Mon,Fri 02:00");
    assert_eq!(body["window_duration"], "1h30m");
}

#[tokio::test]
async fn test_pause_reports_strategy_off_until_resumed() {
    let (app, _runner, _dir) = test_app(RebootStrategy::Instantly);

    let response = app
        .clone()
        .oneshot(authed("PUT", "/v1/active", json!({ "active": false })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(app.clone().oneshot(get("/v1/full-status")).await.unwrap()).await;
    assert_eq!(body["strategy"], "off");

    // While paused, reboot requests are refused.
    let response = app
        .clone()
        .oneshot(authed("POST", "/v1/reboot", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "RebootDisabled");

    let response = app
        .clone()
        .oneshot(authed("PUT", "/v1/active", json!({ "active": true })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(app.oneshot(get("/v1/full-status")).await.unwrap()).await;
    assert_eq!(body["strategy"], "instantly");
}

#[tokio::test]
async fn test_ping_is_open() {
    let (app, _runner, _dir) = test_app(RebootStrategy::BestEffort);
    let response = app.oneshot(get("/v1/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["alive"], true);
}
