use std::time::Duration;

use async_trait::async_trait;
use contracts::Runtime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to launch isolation unit: {0}")]
    Provision(String),
    #[error("isolation unit did not become ready within the timeout")]
    NotReady,
    #[error("failed to destroy isolation unit: {0}")]
    Destroy(String),
}

/// What a backend hands back once it has provisioned an isolation unit:
/// enough for the data plane to reach the session agent living inside it.
/// Nothing more crosses this boundary — RunStep always goes through the
/// agent's HTTP surface, never through the backend directly.
#[derive(Debug, Clone)]
pub struct ProvisionedUnit {
    pub runtime_id: String,
    pub endpoint: String,
}

#[async_trait]
pub trait IsolationBackend: Send + Sync {
    async fn provision(
        &self,
        session_id: &str,
        runtime: Runtime,
        workspace_dir: &str,
        auth_bypass: bool,
        auth_token: Option<&str>,
    ) -> Result<ProvisionedUnit, BackendError>;

    async fn destroy(&self, unit: &ProvisionedUnit) -> Result<(), BackendError>;

    async fn ready_timeout(&self) -> Duration;
}

pub mod k8s;
pub mod local;
