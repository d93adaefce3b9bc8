use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AgentState};

pub fn build_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/sessions", post(handlers::register))
        .route("/v1/sessions/{id}/terminate", post(handlers::terminate))
        .route("/v1/steps", post(handlers::step))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
