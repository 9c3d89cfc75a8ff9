//! REST API handlers for instance events and update grants.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use updraft_metrics::Outcome;
use updraft_rollout::{EventError, EventSubmission};
use updraft_state::now_millis;

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response};

/// HTTP status for a registration or grant error.
pub fn event_error_status(err: &EventError) -> StatusCode {
    match err {
        EventError::InvalidInstance => StatusCode::NOT_FOUND,
        EventError::InvalidApplicationOrGroup | EventError::InvalidEventTypeOrResult => {
            StatusCode::BAD_REQUEST
        }
        EventError::NoUpdateInProgress
        | EventError::UpdatesDisabled(_)
        | EventError::NoTargetVersion(_)
        | EventError::AlreadyUpToDate(_)
        | EventError::UpdateAlreadyInProgress => StatusCode::CONFLICT,
        EventError::FlatcarEventIgnored => StatusCode::OK,
        EventError::EventRegistrationFailed(_) | EventError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// POST /api/v1/events
pub async fn register_event(
    State(state): State<ApiState>,
    Json(sub): Json<EventSubmission>,
) -> impl IntoResponse {
    match state.registrar.register_event(&sub) {
        Ok(reg) => {
            state.metrics.record(Outcome::Accepted);
            if reg.decision.is_none() {
                state.metrics.record_consequence_failure();
            }
            ApiResponse::ok(json!({
                "outcome": "recorded",
                "event": reg.event,
                "rollout": reg.decision.map(|d| d.as_str()),
            }))
            .into_response()
        }
        Err(EventError::FlatcarEventIgnored) => {
            state.metrics.record(Outcome::Ignored);
            ApiResponse::ok(json!({ "outcome": "ignored" })).into_response()
        }
        Err(e) => {
            state.metrics.record(Outcome::of_error(&e));
            if e.is_expected() {
                debug!(instance = %sub.instance_id, error = %e, "event rejected");
            } else {
                warn!(instance = %sub.instance_id, error = %e, "event rejected");
            }
            error_response(&e.to_string(), event_error_status(&e)).into_response()
        }
    }
}

/// Grant request body.
#[derive(Deserialize)]
pub struct GrantRequest {
    pub instance_id: String,
    pub application_id: String,
    pub group_id: String,
}

/// POST /api/v1/instances/grant
pub async fn grant_update(
    State(state): State<ApiState>,
    Json(req): Json<GrantRequest>,
) -> impl IntoResponse {
    match state
        .granter
        .grant_update(&req.instance_id, &req.application_id, &req.group_id)
    {
        Ok(grant) => ApiResponse::ok(json!({
            "instance": grant.instance,
            "rollout_started": grant.rollout_started,
        }))
        .into_response(),
        Err(e) => {
            debug!(instance = %req.instance_id, error = %e, "update not granted");
            error_response(&e.to_string(), event_error_status(&e)).into_response()
        }
    }
}

/// GET /api/v1/apps/{app_id}/instances/{instance_id}/events
pub async fn list_events(
    State(state): State<ApiState>,
    Path((app_id, instance_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.list_events_for_instance(&instance_id, &app_id) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[derive(Deserialize)]
pub struct AtQuery {
    #[serde(default)]
    pub at: Option<u64>,
}

/// GET /api/v1/apps/{app_id}/instances/{instance_id}/error-code?at=
pub async fn latest_error_code(
    State(state): State<ApiState>,
    Path((app_id, instance_id)): Path<(String, String)>,
    Query(query): Query<AtQuery>,
) -> impl IntoResponse {
    let at = query.at.unwrap_or_else(now_millis);
    match state.store.latest_error_code(&instance_id, &app_id, at) {
        Ok(Some(code)) => ApiResponse::ok(json!({ "error_code": code })).into_response(),
        Ok(None) => error_response("no event recorded", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/apps/{app_id}/instances/{instance_id}/history
pub async fn status_history(
    State(state): State<ApiState>,
    Path((app_id, instance_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.list_status_history(&instance_id, &app_id) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use updraft_core::{EventKind, ProtocolResult, RolloutConfig};
    use updraft_state::{Application, Group, StateError, StateStore};

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_application(&Application {
                id: "app".into(),
                name: "app".into(),
                description: String::new(),
                requires_reboot_completion: true,
                created_at: 0,
            })
            .unwrap();
        store
            .put_group(&Group {
                id: "g1".into(),
                application_id: "app".into(),
                name: "stable".into(),
                version: "2.0.0".into(),
                rollout_in_progress: false,
                updates_enabled: true,
                created_at: 0,
            })
            .unwrap();
        store
            .register_instance("i0", "app", "g1", "1.0.0", "10.0.0.1", 1)
            .unwrap();
        ApiState::new(store, RolloutConfig::default())
    }

    fn event(kind: EventKind, result: ProtocolResult, previous: &str) -> EventSubmission {
        EventSubmission {
            instance_id: "i0".into(),
            application_id: "app".into(),
            group_id: "g1".into(),
            event_type: kind.code(),
            event_result: result.code(),
            previous_version: previous.into(),
            error_code: String::new(),
        }
    }

    fn grant_req() -> GrantRequest {
        GrantRequest {
            instance_id: "i0".into(),
            application_id: "app".into(),
            group_id: "g1".into(),
        }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(event_error_status(&EventError::InvalidInstance), StatusCode::NOT_FOUND);
        assert_eq!(
            event_error_status(&EventError::InvalidEventTypeOrResult),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(event_error_status(&EventError::NoUpdateInProgress), StatusCode::CONFLICT);
        assert_eq!(
            event_error_status(&EventError::EventRegistrationFailed(StateError::Write(
                "disk".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn event_without_grant_is_conflict() {
        let state = test_state();
        let resp = register_event(
            State(state.clone()),
            Json(event(EventKind::DownloadStarted, ProtocolResult::Success, "1.0.0")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(state.metrics.count(Outcome::NoUpdateInProgress), 1);
    }

    #[tokio::test]
    async fn grant_then_complete_rollout() {
        let state = test_state();
        let resp = grant_update(State(state.clone()), Json(grant_req())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["rollout_started"], true);

        for (kind, result) in [
            (EventKind::DownloadStarted, ProtocolResult::Success),
            (EventKind::DownloadFinished, ProtocolResult::Success),
            (EventKind::Installed, ProtocolResult::Success),
            (EventKind::UpdateComplete, ProtocolResult::SuccessReboot),
        ] {
            let resp = register_event(State(state.clone()), Json(event(kind, result, "1.0.0")))
                .await
                .into_response();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        assert!(!state.store.get_group("g1").unwrap().unwrap().rollout_in_progress);
        assert_eq!(state.metrics.count(Outcome::Accepted), 4);

        let resp = list_events(
            State(state.clone()),
            Path(("app".to_string(), "i0".to_string())),
        )
        .await
        .into_response();
        let body = body_json(resp).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 4);

        let resp = status_history(State(state), Path(("app".to_string(), "i0".to_string())))
            .await
            .into_response();
        let body = body_json(resp).await;
        let statuses: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            statuses,
            vec!["update_granted", "downloading", "downloaded", "installed", "complete"]
        );
    }

    #[tokio::test]
    async fn stale_reboot_completion_is_ignored_with_ok() {
        let state = test_state();
        grant_update(State(state.clone()), Json(grant_req())).await;

        let resp = register_event(
            State(state.clone()),
            Json(event(EventKind::UpdateComplete, ProtocolResult::SuccessReboot, "0.0.0.0")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["outcome"], "ignored");
        assert_eq!(state.metrics.count(Outcome::Ignored), 1);
    }

    #[tokio::test]
    async fn second_grant_conflicts() {
        let state = test_state();
        grant_update(State(state.clone()), Json(grant_req())).await;
        let resp = grant_update(State(state), Json(grant_req())).await.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn error_code_lookup() {
        let state = test_state();
        let resp = latest_error_code(
            State(state.clone()),
            Path(("app".to_string(), "i0".to_string())),
            Query(AtQuery { at: None }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        grant_update(State(state.clone()), Json(grant_req())).await;
        let mut failed = event(EventKind::UpdateComplete, ProtocolResult::Failed, "1.0.0");
        failed.error_code = "2001".into();
        register_event(State(state.clone()), Json(failed)).await;

        let resp = latest_error_code(
            State(state),
            Path(("app".to_string(), "i0".to_string())),
            Query(AtQuery { at: None }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["error_code"], "2001");
    }
}
