use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub status: JobStatus,
    pub language: String,
    #[serde(rename = "exitStatus", skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "policyId")]
    pub policy_id: String,
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRunResponse {
    pub id: String,
    pub status: JobStatus,
}

/// The data-plane's one-shot equivalent of `StartSessionRequest` — a run
/// that provisions a runtime, executes exactly one step, and tears down.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPlaneRunRequest {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "policyId")]
    pub policy_id: String,
    pub language: String,
    pub code: String,
    #[serde(rename = "workspaceRef", default)]
    pub workspace_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPlaneRunResponse {
    pub run_id: String,
}
