use std::{sync::Arc, time::Duration};

use chrono::Utc;
use contracts::session::SessionStatus;
use tracing::{info, warn};

use crate::{client::DataPlaneClient, storage::SessionStore};

/// Sweeps expired sessions on a fixed interval, terminates their data-plane
/// route, and flips their status to `expired`. Runs as a detached background
/// task for the lifetime of the process; errors are logged and the sweep
/// continues on the next tick.
pub struct TtlWorker {
    store: Arc<dyn SessionStore>,
    data_plane: DataPlaneClient,
    interval: Duration,
}

impl TtlWorker {
    pub fn new(store: Arc<dyn SessionStore>, data_plane: DataPlaneClient, interval: Duration) -> Self {
        Self {
            store,
            data_plane,
            interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                warn!(error = %err, "ttl sweep failed");
            }
        }
    }

    async fn sweep_once(&self) -> Result<(), contracts::ApiError> {
        let expired = self.store.list_expired(Utc::now()).await?;
        for session in expired {
            if let Err(err) = self.data_plane.terminate_session(&session.id).await {
                warn!(error = %err, session_id = %session.id, "data plane terminate failed during ttl sweep, expiring anyway");
            }
            self.store.update_status(&session.id, SessionStatus::Expired).await?;
            info!(session_id = %session.id, "session expired");
        }
        Ok(())
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use contracts::{Runtime, session::Session};

    fn session(id: &str, expires_in: ChronoDuration) -> Session {
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
    async fn sweep_expires_only_past_due_sessions() {
        let store = Arc::new(MemoryStore::new());
        store.create(session("expired", ChronoDuration::seconds(-5))).await.unwrap();
        store.create(session("alive", ChronoDuration::seconds(600))).await.unwrap();

        let worker = TtlWorker::new(
            store.clone(),
            DataPlaneClient::new("http://127.0.0.1:0"),
            Duration::from_secs(30),
        );
        worker.sweep_once().await.unwrap();

        assert_eq!(store.get("expired").await.unwrap().unwrap().status, SessionStatus::Expired);
        assert_eq!(store.get("alive").await.unwrap().unwrap().status, SessionStatus::Active);
    }
}
