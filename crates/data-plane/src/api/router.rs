use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::handlers::{self, DataPlaneState};

pub fn build_router(state: Arc<DataPlaneState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/openapi.yaml", get(handlers::openapi_yaml))
        .route("/docs", get(handlers::docs))
        .route("/sessions", post(handlers::start_session))
        .route("/sessions/{id}/steps", post(handlers::run_step))
        .route("/sessions/{id}/terminate", post(handlers::terminate_session))
        .route("/runs", post(handlers::create_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
