use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use contracts::{
    ApiError,
    session_agent::{
        SessionRegisterRequest, SessionRegisterResponse, SessionTerminateResponse, StepRequest,
        StepResult,
    },
};
use tracing::warn;

use crate::runtime::{Runner, RunnerError};

use super::SESSION_TOKEN_HEADER;

#[derive(Clone)]
pub struct AgentState {
    pub runner: Runner,
    pub require_token: bool,
}

fn token_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn register(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<SessionRegisterRequest>,
) -> Result<Json<SessionRegisterResponse>, ApiError> {
    if req.session_id.is_empty() {
        return Err(ApiError::invalid_input("sessionId is required"));
    }

    let header_token = token_from_headers(&headers);
    if !header_token.is_empty() && header_token != req.token {
        return Err(ApiError::invalid_input("session token mismatch"));
    }
    if state.require_token && req.token.is_empty() {
        return Err(ApiError::unauthenticated("session token required"));
    }

    let session_id = req.session_id.clone();
    state.runner.register_session(req).await.map_err(|err| {
        warn!(error = %err, %session_id, "register_session failed");
        match err {
            RunnerError::RuntimeMismatch(id) => {
                ApiError::conflict(format!("session {id} already registered with a different runtime"))
            }
            RunnerError::MissingSessionId | RunnerError::MissingRuntime => {
                ApiError::invalid_input(err.to_string())
            }
            other => ApiError::internal(other.to_string()),
        }
    })?;

    Ok(Json(SessionRegisterResponse {
        session_id,
        status: "registered".to_string(),
    }))
}

pub async fn terminate(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionTerminateResponse>, ApiError> {
    if state.require_token {
        let token = token_from_headers(&headers);
        state
            .runner
            .authorize(&session_id, &token)
            .await
            .map_err(|_| ApiError::unauthenticated("session token required"))?;
    }

    state.runner.remove_session(&session_id).await;

    Ok(Json(SessionTerminateResponse {
        session_id,
        status: "terminated".to_string(),
    }))
}

pub async fn step(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(req): Json<StepRequest>,
) -> Result<Json<StepResult>, ApiError> {
    if state.require_token {
        let token = token_from_headers(&headers);
        state
            .runner
            .authorize(&req.session_id, &token)
            .await
            .map_err(|_| ApiError::unauthenticated("session token required"))?;
    }

    let result = state.runner.run_step(req).await.map_err(|err| match err {
        RunnerError::NotRegistered(id) => ApiError::not_found(format!("session {id} not registered")),
        RunnerError::MissingSessionId
        | RunnerError::MissingStepId
        | RunnerError::MissingCode
        | RunnerError::MissingRuntime => ApiError::invalid_input(err.to_string()),
        RunnerError::Unhealthy(_) => ApiError::runtime_unavailable(err.to_string()),
        other => ApiError::internal(other.to_string()),
    })?;

    Ok(Json(result))
}
