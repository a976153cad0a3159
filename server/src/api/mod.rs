//! API Router and Application State
//!
//! Intake of membership updates, health, and admin routes.

pub mod admin;
pub mod error;
pub mod events;

use std::sync::Arc;

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::{config::Config, engine::RoleChangeEvent, policy::PolicyStore};

pub use error::ApiError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Active authorization policy
    pub policies: Arc<PolicyStore>,
    /// Intake queue feeding the dispatcher
    pub events: mpsc::Sender<RoleChangeEvent>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        config: Config,
        policies: Arc<PolicyStore>,
        events: mpsc::Sender<RoleChangeEvent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            policies,
            events,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/policy/reload", post(admin::reload_policy))
        .layer(from_fn_with_state(state.clone(), admin::require_admin_token));

    Router::new()
        .route("/health", get(health_check))
        .route("/events/member-update", post(events::member_update))
        .nest("/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Version of the active policy document
    policy_version: u32,
    /// Free slots in the intake queue
    queue_capacity: usize,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        policy_version: state.policies.current().await.version(),
        queue_capacity: state.events.capacity(),
    })
}
