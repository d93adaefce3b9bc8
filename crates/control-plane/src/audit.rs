use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contracts::{ApiError, audit::AuditEvent};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), ApiError>;
    async fn query(
        &self,
        tenant_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, ApiError>;
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    events: RwLock<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: AuditEvent) -> Result<(), ApiError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, ApiError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| tenant_id.is_none_or(|t| event.tenant_id == t))
            .filter(|event| since.is_none_or(|s| event.time >= s))
            .filter(|event| until.is_none_or(|u| event.time <= u))
            .cloned()
            .collect())
    }
}

/// Appends audit events synchronously in the caller's request, since the
/// audit-filter property requires a written event to be immediately
/// queryable — no buffering, no background flush.
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn new_in_memory() -> Self {
        Self::new(Arc::new(InMemoryAuditStore::default()))
    }

    pub async fn log(&self, tenant_id: &str, action: &str, outcome: &str, detail: &str) {
        let event = AuditEvent {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            actor_id: "system".to_string(),
            action: action.to_string(),
            outcome: outcome.to_string(),
            detail: detail.to_string(),
            time: Utc::now(),
        };
        info!(tenant_id, action, outcome, "audit event");
        if let Err(err) = self.store.append(event).await {
            tracing::warn!(error = %err, "failed to persist audit event");
        }
    }

    pub async fn query(
        &self,
        tenant_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, ApiError> {
        self.store.query(tenant_id, since, until).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_by_tenant() {
        let logger = AuditLogger::new_in_memory();
        logger.log("t-1", "session_created", "ok", "s-1").await;
        logger.log("t-2", "session_created", "ok", "s-2").await;

        let events = logger.query(Some("t-1"), None, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_id, "t-1");
    }
}
