//! Router-level regression tests.
//!
//! Drives the full router the way instances and operators would: creates
//! an application and group, checks instances in, grants updates and
//! walks them through the event lifecycle.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use updraft_api::build_router;
use updraft_core::{EventKind, FLATCAR_APP_ID, ProtocolResult, RolloutConfig};
use updraft_state::*;

fn test_router(config: RolloutConfig) -> (StateStore, Router) {
    let store = StateStore::open_in_memory().unwrap();
    let router = build_router(store.clone(), config);
    (store, router)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// One application with one group targeting 2.0.0 and `instances`
/// instances checked in at 1.0.0.
async fn seed(router: &Router, app: &str, instances: usize) {
    let (status, _) = send(
        router,
        "POST",
        "/api/v1/apps",
        Some(json!({ "id": app, "name": "Test app" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        router,
        "POST",
        &format!("/api/v1/apps/{app}/groups"),
        Some(json!({ "id": "stable", "name": "Stable", "version": "2.0.0" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for n in 0..instances {
        let (status, _) = send(
            router,
            "POST",
            "/api/v1/instances",
            Some(json!({
                "instance_id": format!("i{n}"),
                "application_id": app,
                "group_id": "stable",
                "version": "1.0.0",
                "ip": "10.0.0.1",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

async fn grant(router: &Router, app: &str, instance: &str) -> (StatusCode, Value) {
    send(
        router,
        "POST",
        "/api/v1/instances/grant",
        Some(json!({ "instance_id": instance, "application_id": app, "group_id": "stable" })),
    )
    .await
}

async fn report(
    router: &Router,
    app: &str,
    instance: &str,
    kind: EventKind,
    result: ProtocolResult,
    previous_version: &str,
) -> (StatusCode, Value) {
    let error_code = if result == ProtocolResult::Failed { "1" } else { "" };
    send(
        router,
        "POST",
        "/api/v1/events",
        Some(json!({
            "instance_id": instance,
            "application_id": app,
            "group_id": "stable",
            "event_type": kind.code(),
            "event_result": result.code(),
            "previous_version": previous_version,
            "error_code": error_code,
        })),
    )
    .await
}

fn activity_classes(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["class"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn list_apps_empty() {
    let (_, router) = test_router(RolloutConfig::default());
    let (status, body) = send(&router, "GET", "/api/v1/apps", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn unknown_instance_event_is_not_found() {
    let (_, router) = test_router(RolloutConfig::default());
    seed(&router, "app", 0).await;
    let (status, body) = report(
        &router,
        "app",
        "ghost",
        EventKind::DownloadStarted,
        ProtocolResult::Success,
        "1.0.0",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "invalid instance");
}

#[tokio::test]
async fn unsupported_event_pair_is_bad_request() {
    let (store, router) = test_router(RolloutConfig::default());
    seed(&router, "app", 1).await;
    grant(&router, "app", "i0").await;

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/events",
        Some(json!({
            "instance_id": "i0",
            "application_id": "app",
            "group_id": "stable",
            "event_type": 13,
            "event_result": 0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.list_events_for_instance("i0", "app").unwrap().is_empty());
}

#[tokio::test]
async fn full_rollout_finishes_once() {
    let (_, router) = test_router(RolloutConfig::default());
    seed(&router, "app", 3).await;

    for n in 0..3 {
        let (status, body) = grant(&router, "app", &format!("i{n}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rollout_started"], n == 0);
    }

    for n in 0..3 {
        let instance = format!("i{n}");
        for (kind, result) in [
            (EventKind::DownloadStarted, ProtocolResult::Success),
            (EventKind::DownloadFinished, ProtocolResult::Success),
            (EventKind::Installed, ProtocolResult::Success),
            (EventKind::UpdateComplete, ProtocolResult::Success),
        ] {
            let (status, body) = report(&router, "app", &instance, kind, result, "1.0.0").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["outcome"], "recorded");
        }
    }

    let (_, group) = send(&router, "GET", "/api/v1/groups/stable", None).await;
    assert_eq!(group["data"]["rollout_in_progress"], false);

    let (_, stats) = send(&router, "GET", "/api/v1/groups/stable/stats", None).await;
    assert_eq!(stats["data"]["total_instances"], 3);
    assert_eq!(stats["data"]["updates_to_current_version_succeeded"], 3);

    let (_, activity) = send(&router, "GET", "/api/v1/activity", None).await;
    assert_eq!(
        activity_classes(&activity),
        vec!["rollout_started", "rollout_finished"]
    );

    // Nothing left to report against.
    let (status, _) = report(
        &router,
        "app",
        "i0",
        EventKind::UpdateComplete,
        ProtocolResult::Success,
        "1.0.0",
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn first_failure_halts_rollout() {
    let config = RolloutConfig {
        disable_updates_on_failed_rollout: true,
        ..RolloutConfig::default()
    };
    let (store, router) = test_router(config);
    seed(&router, "app", 5).await;
    grant(&router, "app", "i0").await;

    let (status, body) = report(
        &router,
        "app",
        "i0",
        EventKind::UpdateComplete,
        ProtocolResult::Failed,
        "1.0.0",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rollout"], "halted");

    let group = store.get_group("stable").unwrap().unwrap();
    assert!(!group.updates_enabled);
    assert!(!group.rollout_in_progress);

    let (status, body) = grant(&router, "app", "i1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "updates disabled for group stable");

    let (_, activity) = send(&router, "GET", "/api/v1/activity", None).await;
    assert_eq!(
        activity_classes(&activity),
        vec!["rollout_started", "instance_update_failed", "rollout_failed"]
    );

    let (status, body) = send(&router, "GET", "/api/v1/apps/app/instances/i0/error-code", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["error_code"], "1");
}

#[tokio::test]
async fn flatcar_stale_completion_is_ignored() {
    let (store, router) = test_router(RolloutConfig::default());
    seed(&router, FLATCAR_APP_ID, 1).await;
    grant(&router, FLATCAR_APP_ID, "i0").await;

    let (status, body) = report(
        &router,
        FLATCAR_APP_ID,
        "i0",
        EventKind::UpdateComplete,
        ProtocolResult::SuccessReboot,
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "ignored");

    let inst = store.get_instance("i0", FLATCAR_APP_ID).unwrap().unwrap();
    assert_eq!(inst.application.status, InstanceStatus::Undefined);
    assert!(store.list_events_for_instance("i0", FLATCAR_APP_ID).unwrap().is_empty());
    assert!(store.get_group("stable").unwrap().unwrap().rollout_in_progress);
}

#[tokio::test]
async fn metrics_reflect_registrations() {
    let (_, router) = test_router(RolloutConfig::default());
    seed(&router, "app", 1).await;
    report(
        &router,
        "app",
        "i0",
        EventKind::DownloadStarted,
        ProtocolResult::Success,
        "1.0.0",
    )
    .await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("updraft_event_registrations_total{outcome=\"no_update_in_progress\"} 1"));
    assert!(text.contains("updraft_group_instances{application=\"app\",group=\"stable\",status=\"undefined\"} 1"));
}
