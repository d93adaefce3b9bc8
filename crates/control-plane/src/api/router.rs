use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    auth::{AuthConfig, require_bearer_token},
    handlers::{self, AppState},
};

pub fn build_router(state: Arc<AppState>, auth: Arc<AuthConfig>) -> Router {
    let authenticated = Router::new()
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{id}/steps", post(handlers::run_step))
        .route("/sessions/{id}/terminate", post(handlers::terminate_session))
        .route("/workflows", post(handlers::start_workflow))
        .route("/policies", post(handlers::upsert_policy))
        .route("/runs", post(handlers::create_run))
        .route("/audit/events", get(handlers::list_audit_events))
        .route_layer(middleware::from_fn_with_state(auth, require_bearer_token));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
