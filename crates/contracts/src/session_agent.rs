use serde::{Deserialize, Serialize};

/// The interpreter kinds a session agent knows how to drive. Immutable for
/// the lifetime of a session once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Python,
    Node,
}

impl Runtime {
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::Python => "python",
            Runtime::Node => "node",
        }
    }
}

impl std::str::FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Runtime::Python),
            "node" => Ok(Runtime::Node),
            other => Err(format!("unknown runtime {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRegisterRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub runtime: Runtime,
    pub token: String,
    #[serde(rename = "workspaceDir")]
    pub workspace_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRegisterResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTerminateResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "stepId")]
    pub step_id: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(rename = "stepId")]
    pub step_id: String,
    pub status: StepStatus,
    #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// One line of the REPL wire protocol sent to an interpreter's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplRequest {
    pub code: String,
}

/// One line read back from an interpreter's stdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplResponse {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: String,
}
