use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use contracts::{
    ApiError,
    audit::AuditEvent,
    job::{CreateRunRequest, CreateRunResponse, Job, JobStatus},
    policy::{Policy, UpsertPolicyRequest},
    session::{CreateSessionRequest, CreateSessionResponse, RunStepRequest, RunStepResponse},
    workflow::{StartWorkflowRequest, StartWorkflowResponse, Workflow, WorkflowStatus, WorkflowStep},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditLogger,
    orchestration::{DegradationController, IdempotencyStore, WorkflowService, resolve_idempotency},
    sessions::SessionService,
    storage::{JobStore, PolicyStore},
};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub workflows: Arc<WorkflowService>,
    pub jobs: Arc<dyn JobStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub audit: Arc<AuditLogger>,
    pub degradation: Arc<DegradationController>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    state.degradation.require_write_allowed()?;
    let key = idempotency_key(&headers);

    let sessions = state.sessions.clone();
    let session_id = resolve_idempotency(&state.idempotency, key.as_deref(), move || async move {
        let session = sessions.create_session(req).await?;
        Ok(session.id)
    })
    .await
    .map_err(|err| ApiError::internal(err.to_string()))?;

    let session = state
        .sessions
        .store_ref()
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::internal("session vanished after creation"))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            id: session.id,
            status: session.status,
        }),
    ))
}

pub async fn run_step(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<RunStepRequest>,
) -> Result<(StatusCode, Json<RunStepResponse>), ApiError> {
    state.degradation.require_write_allowed()?;
    let step = state.sessions.run_step(&session_id, req.command).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RunStepResponse {
            id: step.id,
            status: step.status,
            stdout: step.stdout,
            stderr: step.stderr,
        }),
    ))
}

pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.degradation.require_write_allowed()?;
    state.sessions.terminate_session(&session_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn start_workflow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartWorkflowRequest>,
) -> Result<(StatusCode, Json<StartWorkflowResponse>), ApiError> {
    state.degradation.require_write_allowed()?;
    let id = req.id.filter(|id| !id.is_empty()).unwrap_or_else(|| Uuid::new_v4().to_string());
    let workflow = Workflow {
        id: id.clone(),
        tenant_id: req.tenant_id,
        status: WorkflowStatus::Queued,
        steps: req
            .steps
            .into_iter()
            .map(|s| WorkflowStep {
                id: String::new(),
                agent_id: s.agent_id,
                sequence: s.sequence.unwrap_or(0),
                status: None,
                job_id: None,
                started_at: None,
                finished_at: None,
            })
            .collect(),
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    };

    state.workflows.start(workflow).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartWorkflowResponse {
            id,
            status: WorkflowStatus::Finished,
        }),
    ))
}

pub async fn upsert_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertPolicyRequest>,
) -> Result<StatusCode, ApiError> {
    state.degradation.require_write_allowed()?;
    if req.tenant_id.is_empty() || req.name.is_empty() {
        return Err(ApiError::invalid_input("tenantId and name are required"));
    }
    let policy = Policy {
        id: req.policy_id(),
        version: req.version,
        ruleset: req.ruleset,
    };
    state.policies.upsert(policy).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub async fn list_audit_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let events = state
        .audit
        .query(query.tenant_id.as_deref(), query.since, query.until)
        .await?;
    Ok(Json(events))
}

/// Ambient one-shot path: create a job, run exactly one session step against
/// it, tear the session down, and report the job's terminal status.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<CreateRunResponse>), ApiError> {
    state.degradation.require_write_allowed()?;
    let key = idempotency_key(&headers);

    let jobs = state.jobs.clone();
    let sessions = state.sessions.clone();
    let job_id = resolve_idempotency(&state.idempotency, key.as_deref(), move || async move {
        let job_id = Uuid::new_v4().to_string();
        let runtime = req
            .language
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        jobs.create(Job {
            id: job_id.clone(),
            tenant_id: req.tenant_id.clone(),
            status: JobStatus::Running,
            language: req.language.clone(),
            exit_status: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let session = sessions
            .create_session(CreateSessionRequest {
                tenant_id: req.tenant_id.clone(),
                agent_id: format!("run-{job_id}"),
                policy_id: req.policy_id.clone(),
                ttl_seconds: 300,
                runtime,
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let step_result = sessions.run_step(&session.id, req.code.clone()).await;
        let _ = sessions.terminate_session(&session.id).await;

        let final_status = if step_result.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        jobs.update_status(&job_id, final_status)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        step_result.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(job_id)
    })
    .await
    .map_err(|err| ApiError::internal(err.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateRunResponse {
            id: job_id,
            status: JobStatus::Completed,
        }),
    ))
}
