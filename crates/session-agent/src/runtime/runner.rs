use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use contracts::session_agent::{
    Runtime, SessionRegisterRequest, StepRequest, StepResult, StepStatus,
};
use thiserror::Error;
use tokio::sync::RwLock;

use super::process::SessionProcess;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("sessionId is required")]
    MissingSessionId,
    #[error("runtime is required")]
    MissingRuntime,
    #[error("stepId is required")]
    MissingStepId,
    #[error("code is required")]
    MissingCode,
    #[error("session {0} is already registered with a different runtime")]
    RuntimeMismatch(String),
    #[error("session {0} is not registered")]
    NotRegistered(String),
    #[error("session token missing or invalid")]
    Unauthorized,
    #[error("failed to start interpreter: {0}")]
    Process(#[from] super::process::ProcessError),
    #[error("session {0} is unhealthy after a prior step timeout")]
    Unhealthy(String),
}

struct Session {
    runtime: Runtime,
    token: String,
    #[allow(dead_code)]
    workspace_dir: String,
    process: Arc<SessionProcess>,
    healthy: Arc<AtomicBool>,
}

/// Owns every interpreter process the agent is responsible for. The map is
/// behind a read-write lock because registration/termination are rare next
/// to the steady stream of step lookups.
#[derive(Default, Clone)]
pub struct Runner {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_session(
        &self,
        req: SessionRegisterRequest,
    ) -> Result<(), RunnerError> {
        if req.session_id.is_empty() {
            return Err(RunnerError::MissingSessionId);
        }

        {
            let sessions = self.sessions.read().await;
            if let Some(existing) = sessions.get(&req.session_id) {
                if existing.runtime != req.runtime {
                    return Err(RunnerError::RuntimeMismatch(req.session_id.clone()));
                }
                return Ok(());
            }
        }

        let process = SessionProcess::spawn(req.runtime, &req.workspace_dir)?;
        let mut sessions = self.sessions.write().await;
        // re-check under the write lock in case of a concurrent register
        if let Some(existing) = sessions.get(&req.session_id) {
            if existing.runtime != req.runtime {
                return Err(RunnerError::RuntimeMismatch(req.session_id.clone()));
            }
            return Ok(());
        }
        sessions.insert(
            req.session_id.clone(),
            Session {
                runtime: req.runtime,
                token: req.token,
                workspace_dir: req.workspace_dir,
                process: Arc::new(process),
                healthy: Arc::new(AtomicBool::new(true)),
            },
        );
        Ok(())
    }

    pub async fn authorize(&self, session_id: &str, token: &str) -> Result<(), RunnerError> {
        if token.is_empty() {
            return Err(RunnerError::Unauthorized);
        }
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| RunnerError::NotRegistered(session_id.to_string()))?;
        if session.token.is_empty() || session.token != token {
            return Err(RunnerError::Unauthorized);
        }
        Ok(())
    }

    pub async fn run_step(&self, req: StepRequest) -> Result<StepResult, RunnerError> {
        if req.session_id.is_empty() {
            return Err(RunnerError::MissingSessionId);
        }
        if req.step_id.is_empty() {
            return Err(RunnerError::MissingStepId);
        }
        if req.code.is_empty() {
            return Err(RunnerError::MissingCode);
        }

        let (process, healthy) = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(&req.session_id)
                .ok_or_else(|| RunnerError::NotRegistered(req.session_id.clone()))?;
            (session.process.clone(), session.healthy.clone())
        };

        if !healthy.load(Ordering::SeqCst) {
            return Err(RunnerError::Unhealthy(req.session_id));
        }

        match process.run_step(&req.code).await {
            Ok(resp) => {
                let mut stderr = resp.stderr;
                let status = if resp.error.is_empty() {
                    StepStatus::Completed
                } else {
                    if !stderr.is_empty() {
                        stderr.push('\n');
                    }
                    stderr.push_str(&resp.error);
                    StepStatus::Failed
                };
                Ok(StepResult {
                    step_id: req.step_id,
                    status,
                    exit_code: None,
                    stdout: resp.stdout,
                    stderr,
                })
            }
            Err(err) => {
                if err.is_timeout() {
                    healthy.store(false, Ordering::SeqCst);
                }
                Ok(StepResult {
                    step_id: req.step_id,
                    status: StepStatus::Failed,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: err.to_string(),
                })
            }
        }
    }

    /// Idempotent: terminating a session that was never registered, or was
    /// already terminated, still succeeds.
    pub async fn remove_session(&self, session_id: &str) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(session_id)
        };
        if let Some(session) = removed {
            session.process.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_req(id: &str, runtime: Runtime, workspace: &str) -> SessionRegisterRequest {
        SessionRegisterRequest {
            session_id: id.to_string(),
            runtime,
            token: "tok".to_string(),
            workspace_dir: workspace.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_step_then_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        runner
            .register_session(register_req("s-1", Runtime::Python, dir.path().to_str().unwrap()))
            .await
            .unwrap();

        let result = runner
            .run_step(StepRequest {
                session_id: "s-1".to_string(),
                step_id: "step-1".to_string(),
                code: "print('hi')".to_string(),
                runtime: None,
            })
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.stdout, "hi\n");

        runner.remove_session("s-1").await;
        runner.remove_session("s-1").await; // idempotent
    }

    #[tokio::test]
    async fn re_register_with_different_runtime_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        runner
            .register_session(register_req("s-1", Runtime::Python, dir.path().to_str().unwrap()))
            .await
            .unwrap();
        let err = runner
            .register_session(register_req("s-1", Runtime::Node, dir.path().to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::RuntimeMismatch(_)));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        runner
            .register_session(register_req("a", Runtime::Python, dir.path().to_str().unwrap()))
            .await
            .unwrap();
        runner
            .register_session(register_req("b", Runtime::Python, dir.path().to_str().unwrap()))
            .await
            .unwrap();

        runner
            .run_step(StepRequest {
                session_id: "a".to_string(),
                step_id: "1".to_string(),
                code: "x = 1".to_string(),
                runtime: None,
            })
            .await
            .unwrap();
        runner
            .run_step(StepRequest {
                session_id: "b".to_string(),
                step_id: "1".to_string(),
                code: "x = 10".to_string(),
                runtime: None,
            })
            .await
            .unwrap();

        let a = runner
            .run_step(StepRequest {
                session_id: "a".to_string(),
                step_id: "2".to_string(),
                code: "print(x)".to_string(),
                runtime: None,
            })
            .await
            .unwrap();
        let b = runner
            .run_step(StepRequest {
                session_id: "b".to_string(),
                step_id: "2".to_string(),
                code: "print(x)".to_string(),
                runtime: None,
            })
            .await
            .unwrap();
        assert_eq!(a.stdout.trim(), "1");
        assert_eq!(b.stdout.trim(), "10");
    }
}
