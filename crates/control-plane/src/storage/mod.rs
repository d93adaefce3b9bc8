pub mod memory;
pub mod sql;

use async_trait::async_trait;
use contracts::{
    ApiError,
    job::Job,
    policy::Policy,
    session::{Session, SessionStep},
};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), ApiError>;
    async fn get(&self, id: &str) -> Result<Option<Session>, ApiError>;
    async fn update_status(&self, id: &str, status: contracts::session::SessionStatus) -> Result<(), ApiError>;
    async fn list_expired(&self, before: chrono::DateTime<chrono::Utc>) -> Result<Vec<Session>, ApiError>;
}

#[async_trait]
pub trait SessionStepStore: Send + Sync {
    async fn append(&self, step: SessionStep) -> Result<(), ApiError>;
    async fn list(&self, session_id: &str) -> Result<Vec<SessionStep>, ApiError>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Upserts a policy, rejecting versions that are not strictly greater
    /// than the stored one (equal versions are rejected too — preserved
    /// per the source's "monotonic" comment).
    async fn upsert(&self, policy: Policy) -> Result<(), ApiError>;
    async fn get(&self, id: &str) -> Result<Option<Policy>, ApiError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> Result<(), ApiError>;
    async fn update_status(&self, id: &str, status: contracts::job::JobStatus) -> Result<(), ApiError>;
}
