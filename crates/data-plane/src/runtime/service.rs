use std::sync::Arc;

use contracts::{
    ApiError, Runtime,
    session::{AuthMode, SessionRoute, SessionStepStatus},
    session_agent::{SessionRegisterRequest, StepRequest, StepStatus},
};
use rand::RngCore;
use tracing::{info, warn};

use super::{
    agent_client::AgentClient,
    backend::{BackendError, IsolationBackend, ProvisionedUnit},
    registry::{RegistryError, SharedRegistry},
};

fn mint_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        ApiError::upstream_unavailable(err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::internal(err.to_string())
    }
}

/// Orchestrates a single backend (local or k8s) behind the session registry
/// and the agent HTTP client. Both backends converge here: `run_step` always
/// goes through `AgentClient`, regardless of which backend provisioned the
/// route.
pub struct SessionService {
    backend: Arc<dyn IsolationBackend>,
    registry: SharedRegistry,
    agent_client: AgentClient,
    workspace_root: String,
    auth_bypass: bool,
}

impl SessionService {
    pub fn new(
        backend: Arc<dyn IsolationBackend>,
        registry: SharedRegistry,
        workspace_root: impl Into<String>,
        auth_bypass: bool,
    ) -> Self {
        Self {
            backend,
            registry,
            agent_client: AgentClient::new(),
            workspace_root: workspace_root.into(),
            auth_bypass,
        }
    }

    fn workspace_dir(&self, workspace_ref: Option<&str>, session_id: &str) -> std::path::PathBuf {
        let leaf = workspace_ref.unwrap_or(session_id);
        std::path::Path::new(&self.workspace_root).join(leaf)
    }

    pub async fn start_session(
        &self,
        session_id: &str,
        _policy_id: &str,
        workspace_ref: Option<&str>,
        runtime: Runtime,
    ) -> Result<SessionRoute, ApiError> {
        let workspace_dir = self.workspace_dir(workspace_ref, session_id);
        tokio::fs::create_dir_all(&workspace_dir)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tokio::fs::set_permissions(
                &workspace_dir,
                std::fs::Permissions::from_mode(0o750),
            )
            .await;
        }
        let workspace_dir_str = workspace_dir.to_string_lossy().to_string();

        let auth_mode = if self.auth_bypass {
            AuthMode::Bypass
        } else {
            AuthMode::Enforced
        };
        let token = if self.auth_bypass {
            String::new()
        } else {
            mint_token()
        };

        let provision_result = self
            .backend
            .provision(
                session_id,
                runtime,
                &workspace_dir_str,
                self.auth_bypass,
                (!token.is_empty()).then_some(token.as_str()),
            )
            .await;

        let unit = match provision_result {
            Ok(unit) => unit,
            Err(err) => return Err(err.into()),
        };

        if !self
            .agent_client
            .wait_for_health(
                &unit.endpoint,
                self.backend.ready_timeout().await,
                std::time::Duration::from_millis(500),
            )
            .await
        {
            self.cleanup_best_effort(&unit).await;
            return Err(ApiError::upstream_unavailable(
                "session agent did not become healthy in time",
            ));
        }

        if let Err(err) = self
            .agent_client
            .register_session(
                &SessionRoute {
                    runtime_id: unit.runtime_id.clone(),
                    runtime,
                    endpoint: unit.endpoint.clone(),
                    token: token.clone(),
                    auth_mode,
                },
                SessionRegisterRequest {
                    session_id: session_id.to_string(),
                    runtime,
                    token: token.clone(),
                    workspace_dir: workspace_dir_str,
                },
            )
            .await
        {
            self.cleanup_best_effort(&unit).await;
            return Err(ApiError::upstream_unavailable(err.to_string()));
        }

        let route = SessionRoute {
            runtime_id: unit.runtime_id,
            runtime,
            endpoint: unit.endpoint,
            token,
            auth_mode,
        };
        self.registry.put(session_id, route.clone()).await?;
        info!(session_id, "session started");
        Ok(route)
    }

    async fn cleanup_best_effort(&self, unit: &ProvisionedUnit) {
        if let Err(err) = self.backend.destroy(unit).await {
            warn!(error = %err, runtime_id = %unit.runtime_id, "cleanup after failed start_session failed");
        }
    }

    pub async fn run_step(
        &self,
        session_id: &str,
        command: String,
        runtime: Option<Runtime>,
    ) -> Result<(SessionStepStatus, String, String), ApiError> {
        let route = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| ApiError::not_found(format!("session {session_id} not found")))?;

        let request = StepRequest {
            session_id: session_id.to_string(),
            step_id: uuid::Uuid::new_v4().to_string(),
            code: command,
            runtime,
        };

        match self.agent_client.run_step(&route, request).await {
            Ok(result) => {
                let status = match result.status {
                    StepStatus::Completed => SessionStepStatus::Completed,
                    StepStatus::Failed => SessionStepStatus::Failed,
                };
                Ok((status, result.stdout, result.stderr))
            }
            Err(err) => Err(ApiError::runtime_unavailable(err.to_string())),
        }
    }

    /// Idempotent: terminating an unknown or already-terminated session
    /// still returns success.
    pub async fn terminate_session(&self, session_id: &str) -> Result<(), ApiError> {
        if let Some(route) = self.registry.get(session_id).await {
            let unit = ProvisionedUnit {
                runtime_id: route.runtime_id.clone(),
                endpoint: route.endpoint.clone(),
            };
            if let Err(err) = self.agent_client.terminate_session(&route, session_id).await {
                warn!(error = %err, session_id, "agent terminate failed, proceeding with backend destroy");
            }
            if let Err(err) = self.backend.destroy(&unit).await {
                warn!(error = %err, session_id, "backend destroy failed during terminate");
            }
        }
        self.registry.delete(session_id).await?;
        Ok(())
    }
}
