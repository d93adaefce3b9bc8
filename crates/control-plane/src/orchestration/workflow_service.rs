use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use contracts::{
    ApiError,
    workflow::{Workflow, WorkflowStatus, WorkflowStep, WorkflowStepStatus},
};
use tracing::info;

use crate::audit::AuditLogger;

use super::shared_memory::SharedMemory;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, workflow: Workflow) -> Result<(), ApiError>;
    async fn update(&self, workflow: Workflow) -> Result<(), ApiError>;
}

/// Capability interface, not a class hierarchy: the service only needs to
/// be able to run one step and get back the job ID it was bound to.
#[async_trait]
pub trait WorkflowStepRunner: Send + Sync {
    async fn run_step(
        &self,
        workflow_id: &str,
        step: &WorkflowStep,
        memory: &SharedMemory,
    ) -> Result<String, ApiError>;
}

pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    runner: Arc<dyn WorkflowStepRunner>,
    audit: Arc<AuditLogger>,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        runner: Arc<dyn WorkflowStepRunner>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            runner,
            audit,
        }
    }

    fn normalize_steps(steps: Vec<WorkflowStep>, workflow_id: &str) -> Result<Vec<WorkflowStep>, ApiError> {
        let mut seen_sequences = HashSet::new();
        let mut normalized: Vec<WorkflowStep> = steps
            .into_iter()
            .enumerate()
            .map(|(index, mut step)| {
                if step.sequence == 0 {
                    step.sequence = index as u32 + 1;
                }
                if step.id.is_empty() {
                    step.id = format!("{workflow_id}-step-{}", step.sequence);
                }
                step.status = Some(WorkflowStepStatus::Queued);
                step
            })
            .collect();

        for step in &normalized {
            if !seen_sequences.insert(step.sequence) {
                return Err(ApiError::invalid_input(format!(
                    "duplicate workflow step sequence {}",
                    step.sequence
                )));
            }
        }

        normalized.sort_by_key(|s| s.sequence);
        Ok(normalized)
    }

    pub async fn start(&self, mut workflow: Workflow) -> Result<(), ApiError> {
        if workflow.id.is_empty() {
            return Err(ApiError::invalid_input("workflow id is required"));
        }
        if workflow.tenant_id.is_empty() {
            return Err(ApiError::invalid_input("workflow tenantId is required"));
        }
        if workflow.steps.is_empty() {
            return Err(ApiError::invalid_input("workflow must have at least one step"));
        }
        for step in &workflow.steps {
            if step.agent_id.is_empty() {
                return Err(ApiError::invalid_input("every workflow step requires an agentId"));
            }
        }

        workflow.steps = Self::normalize_steps(std::mem::take(&mut workflow.steps), &workflow.id)?;
        workflow.status = WorkflowStatus::Running;
        workflow.started_at = Some(Utc::now());
        self.store.create(workflow.clone()).await?;
        self.audit
            .log(&workflow.tenant_id, "workflow_started", "ok", &workflow.id)
            .await;

        let memory = SharedMemory::new();

        for step in workflow.steps.iter_mut() {
            step.status = Some(WorkflowStepStatus::Running);
            step.started_at = Some(Utc::now());
            self.audit
                .log(&workflow.tenant_id, "workflow_step_started", "ok", &step.id)
                .await;

            match self.runner.run_step(&workflow.id, step, &memory).await {
                Ok(job_id) => {
                    step.job_id = Some(job_id);
                    step.status = Some(WorkflowStepStatus::Succeeded);
                    step.finished_at = Some(Utc::now());
                    self.audit
                        .log(&workflow.tenant_id, "workflow_step_finished", "succeeded", &step.id)
                        .await;
                }
                Err(err) => {
                    step.status = Some(WorkflowStepStatus::Failed);
                    step.finished_at = Some(Utc::now());
                    workflow.status = WorkflowStatus::Failed;
                    self.audit
                        .log(&workflow.tenant_id, "workflow_step_finished", "failed", &step.id)
                        .await;
                    self.store.update(workflow.clone()).await?;
                    info!(workflow_id = %workflow.id, step_id = %step.id, error = %err, "workflow failed");
                    return Err(err);
                }
            }
        }

        workflow.status = WorkflowStatus::Finished;
        workflow.completed_at = Some(Utc::now());
        self.store.update(workflow.clone()).await?;
        self.audit
            .log(&workflow.tenant_id, "workflow_finished", "ok", &workflow.id)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct MemoryWorkflowStore {
        workflows: Mutex<Vec<Workflow>>,
    }

    #[async_trait]
    impl WorkflowStore for MemoryWorkflowStore {
        async fn create(&self, workflow: Workflow) -> Result<(), ApiError> {
            self.workflows.lock().await.push(workflow);
            Ok(())
        }

        async fn update(&self, workflow: Workflow) -> Result<(), ApiError> {
            let mut workflows = self.workflows.lock().await;
            if let Some(existing) = workflows.iter_mut().find(|w| w.id == workflow.id) {
                *existing = workflow;
            }
            Ok(())
        }
    }

    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl WorkflowStepRunner for RecordingRunner {
        async fn run_step(
            &self,
            _workflow_id: &str,
            step: &WorkflowStep,
            memory: &SharedMemory,
        ) -> Result<String, ApiError> {
            self.calls.lock().await.push(step.agent_id.clone());
            if Some(&step.agent_id) == self.fail_on.as_ref() {
                return Err(ApiError::internal("boom"));
            }
            if step.sequence == 1 {
                memory.set("shared", "payload").await;
            } else {
                assert_eq!(memory.get("shared").await.as_deref(), Some("payload"));
            }
            Ok(format!("job-{}", step.agent_id))
        }
    }

    fn workflow(id: &str, agents: &[&str]) -> Workflow {
        Workflow {
            id: id.to_string(),
            tenant_id: "t-1".to_string(),
            status: WorkflowStatus::Queued,
            steps: agents
                .iter()
                .map(|agent| WorkflowStep {
                    id: String::new(),
                    agent_id: agent.to_string(),
                    sequence: 0,
                    status: None,
                    job_id: None,
                    started_at: None,
                    finished_at: None,
                })
                .collect(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn runs_steps_in_order_with_shared_memory() {
        let store = Arc::new(MemoryWorkflowStore {
            workflows: Mutex::new(vec![]),
        });
        let runner = Arc::new(RecordingRunner {
            calls: Mutex::new(vec![]),
            fail_on: None,
        });
        let audit = Arc::new(AuditLogger::new_in_memory());
        let service = WorkflowService::new(store.clone(), runner.clone(), audit);

        service.start(workflow("wf-1", &["a-1", "a-2"])).await.unwrap();

        assert_eq!(*runner.calls.lock().await, vec!["a-1", "a-2"]);
        let workflows = store.workflows.lock().await;
        assert_eq!(workflows[0].status, WorkflowStatus::Finished);
    }

    #[tokio::test]
    async fn stops_on_first_failure() {
        let store = Arc::new(MemoryWorkflowStore {
            workflows: Mutex::new(vec![]),
        });
        let runner = Arc::new(RecordingRunner {
            calls: Mutex::new(vec![]),
            fail_on: Some("a-1".to_string()),
        });
        let audit = Arc::new(AuditLogger::new_in_memory());
        let service = WorkflowService::new(store.clone(), runner.clone(), audit);

        let result = service.start(workflow("wf-2", &["a-1", "a-2"])).await;
        assert!(result.is_err());
        assert_eq!(*runner.calls.lock().await, vec!["a-1"]);
    }

    #[tokio::test]
    async fn rejects_duplicate_sequences() {
        let store = Arc::new(MemoryWorkflowStore {
            workflows: Mutex::new(vec![]),
        });
        let runner = Arc::new(RecordingRunner {
            calls: Mutex::new(vec![]),
            fail_on: None,
        });
        let audit = Arc::new(AuditLogger::new_in_memory());
        let service = WorkflowService::new(store, runner, audit);

        let mut wf = workflow("wf-3", &["a-1", "a-2"]);
        wf.steps[0].sequence = 1;
        wf.steps[1].sequence = 1;
        assert!(service.start(wf).await.is_err());
    }
}
