//! updraft-api — REST API for Updraft.
//!
//! Provides axum route handlers for registering instance events, granting
//! updates, and managing applications and groups.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/apps` | List applications |
//! | POST | `/api/v1/apps` | Create an application |
//! | GET | `/api/v1/apps/{app_id}` | Get application details |
//! | GET | `/api/v1/apps/{app_id}/groups` | List an application's groups |
//! | POST | `/api/v1/apps/{app_id}/groups` | Create a group |
//! | GET | `/api/v1/apps/{app_id}/instances/{instance_id}/events` | List events |
//! | GET | `/api/v1/apps/{app_id}/instances/{instance_id}/error-code` | Latest error code |
//! | GET | `/api/v1/apps/{app_id}/instances/{instance_id}/history` | Status history |
//! | GET | `/api/v1/groups/{group_id}` | Get group details |
//! | GET | `/api/v1/groups/{group_id}/stats` | Rollout stats |
//! | GET | `/api/v1/groups/{group_id}/instances` | List group instances |
//! | POST | `/api/v1/instances` | Register an instance check-in |
//! | POST | `/api/v1/instances/grant` | Grant an update |
//! | POST | `/api/v1/events` | Register an instance event |
//! | GET | `/api/v1/activity` | Activity log in a time range |
//! | GET | `/metrics` | Prometheus exposition |

pub mod event_handlers;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use updraft_core::RolloutConfig;
use updraft_metrics::RegistrationMetrics;
use updraft_rollout::{EventRegistrar, UpdateGranter};
use updraft_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub registrar: EventRegistrar<StateStore>,
    pub granter: UpdateGranter<StateStore>,
    pub metrics: Arc<RegistrationMetrics>,
}

impl ApiState {
    pub fn new(store: StateStore, config: RolloutConfig) -> Self {
        Self {
            registrar: EventRegistrar::new(store.clone(), config),
            granter: UpdateGranter::new(store.clone()),
            metrics: Arc::new(RegistrationMetrics::new()),
            store,
        }
    }
}

/// Build the complete API router (REST + metrics).
pub fn build_router(store: StateStore, config: RolloutConfig) -> Router {
    let api_state = ApiState::new(store, config);

    let api_routes = Router::new()
        .route("/apps", get(handlers::list_apps).post(handlers::create_app))
        .route("/apps/{app_id}", get(handlers::get_app))
        .route(
            "/apps/{app_id}/groups",
            get(handlers::list_groups).post(handlers::create_group),
        )
        .route(
            "/apps/{app_id}/instances/{instance_id}/events",
            get(event_handlers::list_events),
        )
        .route(
            "/apps/{app_id}/instances/{instance_id}/error-code",
            get(event_handlers::latest_error_code),
        )
        .route(
            "/apps/{app_id}/instances/{instance_id}/history",
            get(event_handlers::status_history),
        )
        .route("/groups/{group_id}", get(handlers::get_group))
        .route("/groups/{group_id}/stats", get(handlers::group_stats))
        .route("/groups/{group_id}/instances", get(handlers::list_group_instances))
        .route("/instances", post(handlers::register_instance))
        .route("/instances/grant", post(event_handlers::grant_update))
        .route("/events", post(event_handlers::register_event))
        .route("/activity", get(handlers::list_activity))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}
