use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStepStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub status: Option<WorkflowStepStatus>,
    #[serde(rename = "jobId", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartWorkflowRequest {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(default)]
    pub id: Option<String>,
    pub steps: Vec<WorkflowStepInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowStepInput {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(default)]
    pub sequence: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartWorkflowResponse {
    pub id: String,
    pub status: WorkflowStatus,
}
