use std::sync::Arc;

use async_trait::async_trait;
use contracts::{ApiError, workflow::WorkflowStep};

use crate::orchestration::{SharedMemory, WorkflowStepRunner};

use super::SessionService;

/// Binds a workflow step to the agent's already-running session: the
/// step's `agentId` doubles as the session ID it executes against. The
/// command comes from shared memory so later steps can consume earlier
/// steps' output; a step that writes nothing leaves the pipeline untouched
/// for the next one to read.
pub struct SessionWorkflowRunner {
    sessions: Arc<SessionService>,
}

impl SessionWorkflowRunner {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl WorkflowStepRunner for SessionWorkflowRunner {
    async fn run_step(
        &self,
        _workflow_id: &str,
        step: &WorkflowStep,
        memory: &SharedMemory,
    ) -> Result<String, ApiError> {
        let command = memory
            .get(&format!("step-{}-command", step.sequence))
            .await
            .unwrap_or_default();
        if command.is_empty() {
            return Err(ApiError::invalid_input(format!(
                "no command staged in shared memory for step {}",
                step.sequence
            )));
        }

        let result = self.sessions.run_step(&step.agent_id, command).await?;
        memory
            .set(format!("step-{}-output", step.sequence), result.stdout.clone())
            .await;
        Ok(result.id)
    }
}
