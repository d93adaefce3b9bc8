use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use contracts::session::SessionRoute;
use thiserror::Error;
use tokio::{fs, sync::RwLock};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sessionId is required")]
    MissingSessionId,
    #[error("route.runtimeId is required")]
    MissingRuntimeId,
    #[error("route.runtime is required")]
    MissingRuntime,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn put(&self, session_id: &str, route: SessionRoute) -> Result<(), RegistryError>;
    async fn get(&self, session_id: &str) -> Option<SessionRoute>;
    async fn delete(&self, session_id: &str) -> Result<(), RegistryError>;
}

fn validate(session_id: &str, route: &SessionRoute) -> Result<(), RegistryError> {
    if session_id.is_empty() {
        return Err(RegistryError::MissingSessionId);
    }
    if route.runtime_id.is_empty() {
        return Err(RegistryError::MissingRuntimeId);
    }
    Ok(())
}

/// Read-write-locked in-memory registry. O(1) lookups, no durability across
/// restarts.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    items: RwLock<HashMap<String, SessionRoute>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn put(&self, session_id: &str, route: SessionRoute) -> Result<(), RegistryError> {
        validate(session_id, &route)?;
        self.items.write().await.insert(session_id.to_string(), route);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Option<SessionRoute> {
        self.items.read().await.get(session_id).cloned()
    }

    async fn delete(&self, session_id: &str) -> Result<(), RegistryError> {
        self.items.write().await.remove(session_id);
        Ok(())
    }
}

/// JSON-file-backed registry. Writes are atomic: serialize the whole map,
/// write to `path.tmp`, then rename over `path`, so a reader (or the next
/// process to start) never observes a half-written file.
pub struct FileSessionRegistry {
    path: PathBuf,
    items: RwLock<HashMap<String, SessionRoute>>,
}

impl FileSessionRegistry {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let items = match fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => HashMap::new(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    async fn persist_locked(&self, items: &HashMap<String, SessionRoute>) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(items)?;
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRegistry for FileSessionRegistry {
    async fn put(&self, session_id: &str, route: SessionRoute) -> Result<(), RegistryError> {
        validate(session_id, &route)?;
        let mut items = self.items.write().await;
        items.insert(session_id.to_string(), route);
        self.persist_locked(&items).await
    }

    async fn get(&self, session_id: &str) -> Option<SessionRoute> {
        self.items.read().await.get(session_id).cloned()
    }

    async fn delete(&self, session_id: &str) -> Result<(), RegistryError> {
        let mut items = self.items.write().await;
        items.remove(session_id);
        self.persist_locked(&items).await
    }
}

pub type SharedRegistry = Arc<dyn SessionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Runtime, session::AuthMode};

    fn route() -> SessionRoute {
        SessionRoute {
            runtime_id: "rt-1".to_string(),
            runtime: Runtime::Python,
            endpoint: "http://127.0.0.1:9000".to_string(),
            token: "secret".to_string(),
            auth_mode: AuthMode::Enforced,
        }
    }

    #[tokio::test]
    async fn memory_put_get_delete() {
        let registry = InMemorySessionRegistry::new();
        registry.put("s-1", route()).await.unwrap();
        assert!(registry.get("s-1").await.is_some());
        registry.delete("s-1").await.unwrap();
        assert!(registry.get("s-1").await.is_none());
    }

    #[tokio::test]
    async fn file_registry_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let registry = FileSessionRegistry::load(&path).await.unwrap();
        registry.put("s-1", route()).await.unwrap();
        drop(registry);

        let reloaded = FileSessionRegistry::load(&path).await.unwrap();
        let got = reloaded.get("s-1").await.unwrap();
        assert_eq!(got.runtime_id, "rt-1");
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let registry = InMemorySessionRegistry::new();
        registry.put("s-1", route()).await.unwrap();
        registry.delete("s-1").await.unwrap();
        registry.delete("s-1").await.unwrap();
        assert!(registry.get("s-1").await.is_none());
    }
}
