use std::{net::TcpListener, process::Stdio, time::Duration};

use async_trait::async_trait;
use contracts::Runtime;
use tokio::process::{Child, Command};
use tracing::warn;

use super::{BackendError, IsolationBackend, ProvisionedUnit};

/// Spawns a `session-agent` child process bound to an ephemeral loopback
/// port for each session. This is the "local" counterpart to the k8s
/// backend: both converge on the same agent-only RunStep path, so the rest
/// of the data plane never needs to know which one it's talking to.
pub struct LocalBackend {
    session_agent_bin: String,
    ready_timeout: Duration,
    children: tokio::sync::Mutex<std::collections::HashMap<String, Child>>,
}

impl LocalBackend {
    pub fn new(session_agent_bin: impl Into<String>, ready_timeout: Duration) -> Self {
        Self {
            session_agent_bin: session_agent_bin.into(),
            ready_timeout,
            children: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn pick_port() -> Result<u16, BackendError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|err| BackendError::Provision(err.to_string()))?;
        listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|err| BackendError::Provision(err.to_string()))
    }
}

#[async_trait]
impl IsolationBackend for LocalBackend {
    async fn provision(
        &self,
        session_id: &str,
        _runtime: Runtime,
        workspace_dir: &str,
        auth_bypass: bool,
        auth_token: Option<&str>,
    ) -> Result<ProvisionedUnit, BackendError> {
        let port = Self::pick_port()?;
        let addr = format!("127.0.0.1:{port}");

        let mut command = Command::new(&self.session_agent_bin);
        command
            .env("ENV", "local")
            .env("SESSION_AGENT_ADDR", &addr)
            .env("WORKSPACE_ROOT", workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if auth_bypass {
            command.env("SESSION_AGENT_AUTH_MODE", "bypass");
        } else if let Some(token) = auth_token {
            command.env("SESSION_AGENT_AUTH_TOKEN", token);
        }

        let child = command
            .spawn()
            .map_err(|err| BackendError::Provision(err.to_string()))?;

        self.children
            .lock()
            .await
            .insert(session_id.to_string(), child);

        Ok(ProvisionedUnit {
            runtime_id: format!("local-{session_id}"),
            endpoint: format!("http://{addr}"),
        })
    }

    async fn destroy(&self, unit: &ProvisionedUnit) -> Result<(), BackendError> {
        let session_id = unit.runtime_id.trim_start_matches("local-");
        let mut children = self.children.lock().await;
        if let Some(mut child) = children.remove(session_id) {
            if let Err(err) = child.kill().await {
                warn!(error = %err, session_id, "failed to kill local session-agent process");
            }
        }
        Ok(())
    }

    async fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }
}
