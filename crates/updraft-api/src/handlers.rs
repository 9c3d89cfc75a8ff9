//! REST API handlers for the fleet catalog.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, warn};

use updraft_rollout::RolloutStats;
use updraft_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal_error(e: StateError) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn invalid_id(field: &str) -> axum::response::Response {
    let msg = format!("{field} must not contain '{KEY_SEPARATOR}'");
    error_response(&msg, StatusCode::BAD_REQUEST).into_response()
}

// ── Applications ───────────────────────────────────────────────

/// Create application request body.
#[derive(Deserialize)]
pub struct CreateApplication {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_reboot_completion: bool,
}

/// GET /api/v1/apps
pub async fn list_apps(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_applications() {
        Ok(apps) => ApiResponse::ok(apps).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/apps/{app_id}
pub async fn get_app(
    State(state): State<ApiState>,
    Path(app_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_application(&app_id) {
        Ok(Some(app)) => ApiResponse::ok(app).into_response(),
        Ok(None) => error_response("application not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/apps
pub async fn create_app(
    State(state): State<ApiState>,
    Json(req): Json<CreateApplication>,
) -> impl IntoResponse {
    if req.id.trim().is_empty() || req.name.trim().is_empty() {
        return error_response("id and name are required", StatusCode::BAD_REQUEST)
            .into_response();
    }
    if !is_valid_id(&req.id) {
        return invalid_id("id");
    }
    match state.store.get_application(&req.id) {
        Ok(Some(_)) => {
            return error_response("application already exists", StatusCode::CONFLICT)
                .into_response();
        }
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    let app = Application {
        id: req.id,
        name: req.name,
        description: req.description,
        requires_reboot_completion: req.requires_reboot_completion,
        created_at: now_millis(),
    };
    match state.store.put_application(&app) {
        Ok(()) => {
            info!(application = %app.id, "application created");
            (StatusCode::CREATED, ApiResponse::ok(app)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ── Groups ─────────────────────────────────────────────────────

/// Create group request body.
#[derive(Deserialize)]
pub struct CreateGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "enabled")]
    pub updates_enabled: bool,
}

fn enabled() -> bool {
    true
}

/// GET /api/v1/apps/{app_id}/groups
pub async fn list_groups(
    State(state): State<ApiState>,
    Path(app_id): Path<String>,
) -> impl IntoResponse {
    match state.store.list_groups_for_application(&app_id) {
        Ok(groups) => ApiResponse::ok(groups).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/apps/{app_id}/groups
pub async fn create_group(
    State(state): State<ApiState>,
    Path(app_id): Path<String>,
    Json(req): Json<CreateGroup>,
) -> impl IntoResponse {
    if req.id.trim().is_empty() || req.name.trim().is_empty() {
        return error_response("id and name are required", StatusCode::BAD_REQUEST)
            .into_response();
    }
    if !is_valid_id(&req.id) {
        return invalid_id("id");
    }
    match state.store.get_application(&app_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response("application not found", StatusCode::NOT_FOUND)
                .into_response();
        }
        Err(e) => return internal_error(e),
    }
    match state.store.get_group(&req.id) {
        Ok(Some(_)) => {
            return error_response("group already exists", StatusCode::CONFLICT).into_response();
        }
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    let group = Group {
        id: req.id,
        application_id: app_id,
        name: req.name,
        version: req.version,
        rollout_in_progress: false,
        updates_enabled: req.updates_enabled,
        created_at: now_millis(),
    };
    match state.store.put_group(&group) {
        Ok(()) => {
            info!(group = %group.id, application = %group.application_id, "group created");
            (StatusCode::CREATED, ApiResponse::ok(group)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/groups/{group_id}
pub async fn get_group(
    State(state): State<ApiState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_group(&group_id) {
        Ok(Some(group)) => ApiResponse::ok(group).into_response(),
        Ok(None) => error_response("group not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/groups/{group_id}/stats
pub async fn group_stats(
    State(state): State<ApiState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    let group = match state.store.get_group(&group_id) {
        Ok(Some(group)) => group,
        Ok(None) => {
            return error_response("group not found", StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => return internal_error(e),
    };
    match RolloutStats::compute(&state.store, &group) {
        Ok(stats) => ApiResponse::ok(stats).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/groups/{group_id}/instances
pub async fn list_group_instances(
    State(state): State<ApiState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    match state.store.list_instances_for_group(&group_id) {
        Ok(instances) => ApiResponse::ok(instances).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Instances ──────────────────────────────────────────────────

/// Check-in request body.
#[derive(Deserialize)]
pub struct RegisterInstance {
    pub instance_id: String,
    pub application_id: String,
    pub group_id: String,
    pub version: String,
    #[serde(default)]
    pub ip: String,
}

/// POST /api/v1/instances
pub async fn register_instance(
    State(state): State<ApiState>,
    Json(req): Json<RegisterInstance>,
) -> impl IntoResponse {
    if req.instance_id.trim().is_empty() {
        return error_response("instance_id is required", StatusCode::BAD_REQUEST)
            .into_response();
    }
    if !is_valid_id(&req.instance_id) {
        return invalid_id("instance_id");
    }
    let (application_id, group_id) = match state
        .store
        .resolve_application_and_group(&req.application_id, &req.group_id)
    {
        Ok(Some(ids)) => ids,
        Ok(None) => {
            return error_response("invalid application or group", StatusCode::BAD_REQUEST)
                .into_response();
        }
        Err(e) => return internal_error(e),
    };
    match state.store.register_instance(
        &req.instance_id,
        &application_id,
        &group_id,
        &req.version,
        &req.ip,
        now_millis(),
    ) {
        Ok(instance) => ApiResponse::ok(instance).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Activity ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ActivityRange {
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
}

/// GET /api/v1/activity?start=&end=
pub async fn list_activity(
    State(state): State<ApiState>,
    Query(range): Query<ActivityRange>,
) -> impl IntoResponse {
    let start = range.start.unwrap_or(0);
    let end = range.end.unwrap_or(u64::MAX);
    if start > end {
        return error_response("start must not be after end", StatusCode::BAD_REQUEST)
            .into_response();
    }
    match state.store.list_activity(start, end) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let groups = match updraft_metrics::collect_groups(&state.store) {
        Ok(groups) => groups,
        Err(e) => {
            warn!(error = %e, "failed to collect group snapshots");
            Vec::new()
        }
    };

    let body = updraft_metrics::render_prometheus(&state.metrics, &groups);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
