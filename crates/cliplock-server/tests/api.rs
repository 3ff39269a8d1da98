//! HTTP integration tests for the lock coordination API.
//!
//! Each test builds the full router over a manual clock and a temp log
//! directory, then drives it with `tower::ServiceExt::oneshot`. Timer
//! behaviour is exercised by advancing the clock and invoking the same
//! engine sweeps the background loops call.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use cliplock_core::ManualClock;
use cliplock_server::config::Config;
use cliplock_server::router::build_router;
use cliplock_server::state::AppState;

struct TestApp {
    app: Router,
    state: AppState,
    clock: Arc<ManualClock>,
    _log_dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let log_dir = tempfile::tempdir().expect("failed to create temp log dir");
    let clock = Arc::new(ManualClock::new());
    let config = Config {
        log_dir: log_dir.path().to_path_buf(),
        ..Default::default()
    };
    let state = AppState::with_clock(config, clock.clone()).expect("failed to build AppState");
    TestApp {
        app: build_router(state.clone()),
        state,
        clock,
        _log_dir: log_dir,
    }
}

async fn request_json(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, value)
}

async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::POST, path, Some(body)).await
}

async fn patch_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::PATCH, path, Some(body)).await
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::GET, path, None).await
}

async fn register_tool(app: &Router, tool_id: &str) {
    let (status, body) = post_json(app, "/tool/register", json!({ "tool_id": tool_id })).await;
    assert_eq!(status, StatusCode::OK, "register failed: {body:?}");
}

async fn request_lock(app: &Router, tool_id: &str, thread_id: &str) -> (String, u64) {
    let (status, body) = post_json(
        app,
        "/lock/request",
        json!({ "tool_id": tool_id, "thread_id": thread_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "lock request failed: {body:?}");
    (
        body["ticket_id"].as_str().unwrap().to_string(),
        body["position"].as_u64().unwrap(),
    )
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test]
async fn health_reports_uptime_and_version() {
    let t = test_app();
    t.clock.advance(secs(7));

    let (status, body) = get_json(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["uptime_seconds"], 7);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn tool_registration_lifecycle() {
    let t = test_app();

    let (status, body) = post_json(&t.app, "/tool/register", json!({ "tool_id": "bas-1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["tool_id"], "bas-1");
    assert_eq!(body["config"]["lock_max_duration"], 20);
    assert_eq!(body["config"]["poll_interval"], 200);

    // Registering an online tool again conflicts.
    let (status, body) = post_json(&t.app, "/tool/register", json!({ "tool_id": "bas-1" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "tool_already_registered");

    let (status, body) = post_json(&t.app, "/tool/heartbeat", json!({ "tool_id": "bas-1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["next_heartbeat_before"].is_string());

    let (status, body) = get_json(&t.app, "/tool/status?tool_id=bas-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert!(body["next_heartbeat_deadline"].is_string());

    let (status, body) = post_json(&t.app, "/tool/unregister", json!({ "tool_id": "bas-1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unregistered");

    let (status, body) = get_json(&t.app, "/tool/status?tool_id=bas-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");

    // A heartbeat from a known-but-offline tool brings it back online.
    let (status, _) = post_json(&t.app, "/tool/heartbeat", json!({ "tool_id": "bas-1" })).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get_json(&t.app, "/tool/status?tool_id=bas-1").await;
    assert_eq!(body["status"], "online");
}

#[tokio::test]
async fn unknown_tool_paths_return_not_found() {
    let t = test_app();

    let (status, body) = post_json(&t.app, "/tool/heartbeat", json!({ "tool_id": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "tool_not_found");

    let (status, _) = post_json(&t.app, "/tool/unregister", json!({ "tool_id": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&t.app, "/tool/status?tool_id=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_invalid_requests() {
    let t = test_app();

    let (status, body) = post_json(&t.app, "/tool/register", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, body) = post_json(&t.app, "/lock/request", json!({ "tool_id": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, body) = get_json(&t.app, "/lock/check").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn grant_and_release_round_trip() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;

    let (status, body) = post_json(
        &t.app,
        "/lock/request",
        json!({ "tool_id": "bas-1", "thread_id": "th-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 0);
    assert_eq!(body["status"], "granted");
    assert_eq!(body["lock_duration_ms"], 20_000);
    assert_eq!(body["poll_interval"], 200);
    assert!(body["ticket_expires_at"].is_string());
    assert!(body["expires_at"].is_string());
    let ticket_id = body["ticket_id"].as_str().unwrap().to_string();

    t.clock.advance(secs(3));
    let (status, body) = post_json(&t.app, "/lock/release", json!({ "ticket_id": ticket_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "released");
    assert_eq!(body["held_duration_ms"], 3_000);
}

#[tokio::test]
async fn queue_is_fifo_and_release_hands_over() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    register_tool(&t.app, "bas-2").await;

    let (first, first_pos) = request_lock(&t.app, "bas-1", "th-1").await;
    assert_eq!(first_pos, 0);

    let (status, body) = post_json(
        &t.app,
        "/lock/request",
        json!({ "tool_id": "bas-2", "thread_id": "th-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 1);
    assert!(body.get("status").is_none(), "waiting ticket has no status field");
    let second = body["ticket_id"].as_str().unwrap().to_string();

    let (_, waiting) = get_json(&t.app, &format!("/lock/check?ticket_id={second}")).await;
    assert_eq!(waiting["status"], "waiting");
    assert_eq!(waiting["position"], 1);
    assert_eq!(waiting["estimated_wait_ms"], 10_000);

    let (_, queue) = get_json(&t.app, "/lock/status").await;
    assert_eq!(queue["queue_length"], 1);
    assert_eq!(queue["current_lock"]["tool_id"], "bas-1");
    assert_eq!(queue["queue"][0]["position"], 1);

    let (status, _) = post_json(&t.app, "/lock/release", json!({ "ticket_id": first })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, granted) = get_json(&t.app, &format!("/lock/check?ticket_id={second}")).await;
    assert_eq!(granted["status"], "granted");
    assert_eq!(granted["lock_duration_ms"], 20_000);
    assert!(granted["expires_at"].is_string());
}

#[tokio::test]
async fn repeated_request_returns_same_ticket() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;

    let (first, first_pos) = request_lock(&t.app, "bas-1", "th-1").await;
    let (second, second_pos) = request_lock(&t.app, "bas-1", "th-1").await;
    assert_eq!(first, second);
    assert_eq!(first_pos, second_pos);

    // A different thread of the same tool queues separately.
    let (other, other_pos) = request_lock(&t.app, "bas-1", "th-2").await;
    assert_ne!(other, first);
    assert_eq!(other_pos, 1);
}

#[tokio::test]
async fn offline_tool_cannot_request() {
    let t = test_app();

    let (status, body) = post_json(
        &t.app,
        "/lock/request",
        json!({ "tool_id": "never-registered", "thread_id": "th-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "tool_offline");

    register_tool(&t.app, "bas-1").await;
    post_json(&t.app, "/tool/unregister", json!({ "tool_id": "bas-1" })).await;
    let (status, body) = post_json(
        &t.app,
        "/lock/request",
        json!({ "tool_id": "bas-1", "thread_id": "th-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "tool_offline");
}

#[tokio::test]
async fn holder_is_expired_after_max_duration() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    let (ticket, _) = request_lock(&t.app, "bas-1", "th-1").await;

    t.clock.advance(secs(21));
    let expired = t.state.lock_manager.expire_overdue_holder();
    assert!(expired.is_some());

    let (status, body) = get_json(&t.app, &format!("/lock/check?ticket_id={ticket}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    assert_eq!(body["reason"], "max_duration_expired");
}

#[tokio::test]
async fn silent_holder_is_expired_after_grace_period() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    let (ticket, _) = request_lock(&t.app, "bas-1", "th-1").await;

    t.clock.advance(secs(6));
    let expired = t.state.lock_manager.expire_unpolled_holder();
    assert!(expired.is_some());

    let (_, body) = get_json(&t.app, &format!("/lock/check?ticket_id={ticket}")).await;
    assert_eq!(body["status"], "expired");
    assert_eq!(body["reason"], "grace_period_expired");
}

#[tokio::test]
async fn polling_holder_survives_grace_period() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    let (ticket, _) = request_lock(&t.app, "bas-1", "th-1").await;

    t.clock.advance(secs(2));
    get_json(&t.app, &format!("/lock/check?ticket_id={ticket}")).await;

    t.clock.advance(secs(10));
    assert!(t.state.lock_manager.expire_unpolled_holder().is_none());
}

#[tokio::test]
async fn waiting_ticket_expires_by_ttl_then_is_reaped() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    register_tool(&t.app, "bas-2").await;
    request_lock(&t.app, "bas-1", "th-1").await;
    let (waiter, _) = request_lock(&t.app, "bas-2", "th-1").await;

    t.clock.advance(secs(121));
    let expired = t.state.lock_manager.sweep_waiting_ttl();
    assert_eq!(expired.len(), 1);

    // First observation after expiry still reads the terminal record.
    let (status, body) = get_json(&t.app, &format!("/lock/check?ticket_id={waiter}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    assert_eq!(body["reason"], "ttl_expired");

    // Once the terminal record ages out, the ticket is gone for good.
    t.clock.advance(secs(121));
    t.state.lock_manager.sweep_waiting_ttl();
    let (status, body) = get_json(&t.app, &format!("/lock/check?ticket_id={waiter}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ticket_not_found");
}

#[tokio::test]
async fn extend_caps_out_after_two() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    let (ticket, _) = request_lock(&t.app, "bas-1", "th-1").await;

    t.clock.advance(secs(10));
    let (status, body) = post_json(&t.app, "/lock/extend", json!({ "ticket_id": ticket })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "extended");
    assert_eq!(body["extend_count"], 1);
    assert_eq!(body["extend_remaining"], 1);
    assert!(body["new_expires_at"].is_string());

    let (status, body) = post_json(&t.app, "/lock/extend", json!({ "ticket_id": ticket })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["extend_count"], 2);
    assert_eq!(body["extend_remaining"], 0);

    let (status, body) = post_json(&t.app, "/lock/extend", json!({ "ticket_id": ticket })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "max_extend_reached");
}

#[tokio::test]
async fn extend_respects_the_feature_flag() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    let (ticket, _) = request_lock(&t.app, "bas-1", "th-1").await;

    let (status, _) = patch_json(&t.app, "/config", json!({ "lock_extendable": false })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(&t.app, "/lock/extend", json!({ "ticket_id": ticket })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "extend_disabled");
}

#[tokio::test]
async fn release_error_paths() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    register_tool(&t.app, "bas-2").await;

    let (status, body) = post_json(
        &t.app,
        "/lock/release",
        json!({ "ticket_id": "00000000-0000-4000-8000-000000000000" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ticket_not_found");

    // A malformed id can never name a ticket.
    let (status, _) = post_json(&t.app, "/lock/release", json!({ "ticket_id": "nonsense" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    request_lock(&t.app, "bas-1", "th-1").await;
    let (waiter, _) = request_lock(&t.app, "bas-2", "th-1").await;
    let (status, body) = post_json(&t.app, "/lock/release", json!({ "ticket_id": waiter })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_lock_holder");
}

#[tokio::test]
async fn unregister_cascades_to_tickets() {
    let t = test_app();
    register_tool(&t.app, "flaky").await;
    register_tool(&t.app, "steady").await;

    let (holder, _) = request_lock(&t.app, "flaky", "th-1").await;
    let (waiter, _) = request_lock(&t.app, "steady", "th-1").await;

    let (status, body) = post_json(&t.app, "/tool/unregister", json!({ "tool_id": "flaky" })).await;
    assert_eq!(status, StatusCode::OK);
    let released = body["released_tickets"].as_array().unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0], holder.as_str());

    let (_, body) = get_json(&t.app, &format!("/lock/check?ticket_id={holder}")).await;
    assert_eq!(body["status"], "expired");
    assert_eq!(body["reason"], "tool_offline");

    let (_, body) = get_json(&t.app, &format!("/lock/check?ticket_id={waiter}")).await;
    assert_eq!(body["status"], "granted");
}

#[tokio::test]
async fn heartbeat_timeout_cascade_via_sweeps() {
    let t = test_app();
    register_tool(&t.app, "flaky").await;
    register_tool(&t.app, "steady").await;

    request_lock(&t.app, "flaky", "th-1").await;
    let (waiter, _) = request_lock(&t.app, "steady", "th-1").await;

    // Only the steady tool keeps heartbeating past the timeout window.
    t.clock.advance(secs(200));
    post_json(&t.app, "/tool/heartbeat", json!({ "tool_id": "steady" })).await;
    get_json(&t.app, &format!("/lock/check?ticket_id={waiter}")).await;
    t.clock.advance(secs(101));

    // What the 30s heartbeat-sweep loop does each tick.
    let lapsed = t.state.registry.sweep_offline();
    assert_eq!(lapsed, vec!["flaky".to_string()]);
    for tool_id in &lapsed {
        t.state.lock_manager.remove_tool_tickets(tool_id);
    }

    let (_, body) = get_json(&t.app, &format!("/lock/check?ticket_id={waiter}")).await;
    assert_eq!(body["status"], "granted");

    let (_, body) = get_json(&t.app, "/tool/status?tool_id=flaky").await;
    assert_eq!(body["status"], "offline");
}

#[tokio::test]
async fn config_get_and_patch_round_trip() {
    let t = test_app();

    let (status, body) = get_json(&t.app, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 8899);
    assert_eq!(body["lock_max_duration"], 20);
    assert_eq!(body["ticket_ttl_on_poll"], true);
    assert_eq!(body["log_retention_days"], 30);

    let (status, body) = patch_json(
        &t.app,
        "/config",
        json!({ "lock_max_duration": 40, "lock_grace_period": 10 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "updated");
    assert_eq!(body["config"]["lock_max_duration"], 40);

    // The next grant uses the new duration.
    register_tool(&t.app, "bas-1").await;
    let (_, granted) = post_json(
        &t.app,
        "/lock/request",
        json!({ "tool_id": "bas-1", "thread_id": "th-1" }),
    )
    .await;
    assert_eq!(granted["lock_duration_ms"], 40_000);
}

#[tokio::test]
async fn invalid_config_patch_is_rejected_without_side_effects() {
    let t = test_app();

    // grace >= max duration violates the relational constraint.
    let (status, body) = patch_json(&t.app, "/config", json!({ "lock_grace_period": 20 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_config");

    let (_, body) = get_json(&t.app, "/config").await;
    assert_eq!(body["lock_grace_period"], 5);
}

#[tokio::test]
async fn debug_endpoints_expose_events_and_file_stats() {
    let t = test_app();
    register_tool(&t.app, "bas-1").await;
    let (ticket, _) = request_lock(&t.app, "bas-1", "th-1").await;
    post_json(&t.app, "/lock/release", json!({ "ticket_id": ticket })).await;

    let (status, body) = get_json(&t.app, "/debug/logs/recent?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    // Newest first: the release precedes the grant in the listing.
    assert_eq!(body["events"][0]["event_type"], "lock_released");

    let (status, body) = get_json(&t.app, "/debug/logs/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["files"].is_object());
    assert!(body["log_dir"].is_string());
}
