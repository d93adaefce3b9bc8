use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session_agent::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Enforced,
    Bypass,
}

/// The tuple the data plane uses to reach the agent owning a given session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRoute {
    #[serde(rename = "runtimeId")]
    pub runtime_id: String,
    pub runtime: Runtime,
    pub endpoint: String,
    pub token: String,
    #[serde(rename = "authMode")]
    pub auth_mode: AuthMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "policyId")]
    pub policy_id: String,
    pub runtime: Runtime,
    #[serde(rename = "ttlSeconds")]
    pub ttl_seconds: i64,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(rename = "runtimeId", skip_serializing_if = "Option::is_none")]
    pub runtime_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
}

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStepStatus {
    Accepted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStep {
    pub id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub sequence: u64,
    pub command: String,
    pub status: SessionStepStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// --- control-plane HTTP bodies ---

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "policyId")]
    pub policy_id: String,
    #[serde(rename = "ttlSeconds", default)]
    pub ttl_seconds: i64,
    #[serde(default = "default_runtime")]
    pub runtime: Runtime,
}

fn default_runtime() -> Runtime {
    Runtime::Python
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStepRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStepResponse {
    pub id: String,
    pub status: SessionStepStatus,
    pub stdout: String,
    pub stderr: String,
}

// --- data-plane HTTP bodies ---

#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "policyId")]
    pub policy_id: String,
    #[serde(rename = "workspaceRef", default)]
    pub workspace_ref: Option<String>,
    pub runtime: Runtime,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartSessionResponse {
    pub id: String,
    #[serde(rename = "runtimeId")]
    pub runtime_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPlaneStepRequest {
    pub command: String,
    #[serde(default)]
    pub runtime: Option<Runtime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPlaneStepResponse {
    pub status: SessionStepStatus,
    pub stdout: String,
    pub stderr: String,
}
