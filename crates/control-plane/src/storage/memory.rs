use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contracts::{
    ApiError,
    job::Job,
    policy::Policy,
    session::{Session, SessionStatus, SessionStep},
    workflow::Workflow,
};

use crate::orchestration::WorkflowStore;

use super::{JobStore, PolicyStore, SessionStepStore, SessionStore};

#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
    steps: Mutex<HashMap<String, Vec<SessionStep>>>,
    policies: Mutex<HashMap<String, Policy>>,
    jobs: Mutex<HashMap<String, Job>>,
    workflows: Mutex<HashMap<String, Workflow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: Session) -> Result<(), ApiError> {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, ApiError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), ApiError> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(id) {
            session.status = status;
        }
        Ok(())
    }

    async fn list_expired(&self, before: DateTime<Utc>) -> Result<Vec<Session>, ApiError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == SessionStatus::Active && s.expires_at <= before)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionStepStore for MemoryStore {
    async fn append(&self, step: SessionStep) -> Result<(), ApiError> {
        self.steps
            .lock()
            .unwrap()
            .entry(step.session_id.clone())
            .or_default()
            .push(step);
        Ok(())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<SessionStep>, ApiError> {
        Ok(self.steps.lock().unwrap().get(session_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn upsert(&self, policy: Policy) -> Result<(), ApiError> {
        let mut policies = self.policies.lock().unwrap();
        if let Some(existing) = policies.get(&policy.id) {
            if policy.version <= existing.version {
                return Err(ApiError::conflict(format!(
                    "policy {} version {} is not newer than stored version {}",
                    policy.id, policy.version, existing.version
                )));
            }
        }
        policies.insert(policy.id.clone(), policy);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Policy>, ApiError> {
        Ok(self.policies.lock().unwrap().get(id).cloned())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: Job) -> Result<(), ApiError> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
        Ok(())
    }

    async fn update_status(&self, id: &str, status: contracts::job::JobStatus) -> Result<(), ApiError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
            job.status = status;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn create(&self, workflow: Workflow) -> Result<(), ApiError> {
        self.workflows.lock().unwrap().insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn update(&self, workflow: Workflow) -> Result<(), ApiError> {
        self.workflows.lock().unwrap().insert(workflow.id.clone(), workflow);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use contracts::Runtime;

    fn session(id: &str, expires_in: Duration) -> Session {
        Session {
            id: id.to_string(),
            tenant_id: "t-1".to_string(),
            agent_id: "agent-1".to_string(),
            policy_id: "t-1:default".to_string(),
            runtime: Runtime::Python,
            ttl_seconds: 900,
            expires_at: Utc::now() + expires_in,
            status: SessionStatus::Active,
            runtime_id: None,
            created_at: Utc::now(),
            last_activity: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_policy_version_is_rejected() {
        let store = MemoryStore::new();
        store
            .upsert(Policy {
                id: "t-1:default".to_string(),
                version: 2,
                ruleset: "allow".to_string(),
            })
            .await
            .unwrap();

        let result = store
            .upsert(Policy {
                id: "t-1:default".to_string(),
                version: 2,
                ruleset: "allow".to_string(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_expired_only_returns_past_active_sessions() {
        let store = MemoryStore::new();
        store.create(session("s-expired", Duration::seconds(-10))).await.unwrap();
        store.create(session("s-alive", Duration::seconds(600))).await.unwrap();

        let expired = store.list_expired(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "s-expired");
    }
}
