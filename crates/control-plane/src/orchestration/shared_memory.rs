use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

/// A workflow-scoped string→string map. Entries are visible only to steps
/// of the same workflow; a fresh map is created per workflow run.
#[derive(Clone, Default)]
pub struct SharedMemory {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().await.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let memory = SharedMemory::new();
        memory.set("shared", "payload").await;
        assert_eq!(memory.get("shared").await.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn distinct_instances_are_isolated() {
        let a = SharedMemory::new();
        let b = SharedMemory::new();
        a.set("k", "v").await;
        assert_eq!(b.get("k").await, None);
    }
}
