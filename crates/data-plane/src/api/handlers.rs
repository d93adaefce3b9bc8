use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use contracts::{
    ApiError,
    job::{DataPlaneRunRequest, DataPlaneRunResponse},
    session::{DataPlaneStepRequest, DataPlaneStepResponse, StartSessionRequest, StartSessionResponse},
};

use crate::runtime::SessionService;

pub struct DataPlaneState {
    pub sessions: SessionService,
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn start_session(
    State(state): State<Arc<DataPlaneState>>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionResponse>), ApiError> {
    if req.session_id.is_empty() {
        return Err(ApiError::invalid_input("sessionId is required"));
    }

    let route = state
        .sessions
        .start_session(
            &req.session_id,
            &req.policy_id,
            req.workspace_ref.as_deref(),
            req.runtime,
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSessionResponse {
            id: req.session_id,
            runtime_id: route.runtime_id,
            status: "running".to_string(),
        }),
    ))
}

pub async fn run_step(
    State(state): State<Arc<DataPlaneState>>,
    Path(session_id): Path<String>,
    Json(req): Json<DataPlaneStepRequest>,
) -> Result<(StatusCode, Json<DataPlaneStepResponse>), ApiError> {
    if req.command.is_empty() {
        return Err(ApiError::invalid_input("command is required"));
    }

    let (status, stdout, stderr) = state
        .sessions
        .run_step(&session_id, req.command, req.runtime)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataPlaneStepResponse {
            status,
            stdout,
            stderr,
        }),
    ))
}

pub async fn terminate_session(
    State(state): State<Arc<DataPlaneState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.terminate_session(&session_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// The one-shot degenerate case of the session path: provision, run exactly
/// one step, tear down. Reuses the same `SessionService` a real session
/// would, with a synthetic session ID scoped to the run.
pub async fn create_run(
    State(state): State<Arc<DataPlaneState>>,
    Json(req): Json<DataPlaneRunRequest>,
) -> Result<(StatusCode, Json<DataPlaneRunResponse>), ApiError> {
    if req.job_id.is_empty() {
        return Err(ApiError::invalid_input("jobId is required"));
    }
    let runtime = req
        .language
        .parse()
        .map_err(ApiError::invalid_input)?;
    let session_id = format!("run-{}", req.job_id);

    state
        .sessions
        .start_session(&session_id, &req.policy_id, req.workspace_ref.as_deref(), runtime)
        .await?;

    let step_result = state
        .sessions
        .run_step(&session_id, req.code, Some(runtime))
        .await;

    let _ = state.sessions.terminate_session(&session_id).await;
    step_result?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataPlaneRunResponse {
            run_id: session_id,
        }),
    ))
}

pub async fn openapi_yaml() -> &'static str {
    include_str!("../../openapi.yaml")
}

pub async fn docs() -> axum::response::Html<&'static str> {
    axum::response::Html(
        "<!doctype html><title>data-plane</title><p>See <a href=\"/openapi.yaml\">/openapi.yaml</a>.</p>",
    )
}
