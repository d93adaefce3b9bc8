use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put_if_absent(&self, key: &str, value: &str) -> bool;
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.items.lock().await.get(key).cloned()
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> bool {
        let mut items = self.items.lock().await;
        if items.contains_key(key) {
            return false;
        }
        items.insert(key.to_string(), value.to_string());
        true
    }
}

pub struct SqlIdempotencyStore {
    pool: sqlx::AnyPool,
}

impl SqlIdempotencyStore {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for SqlIdempotencyStore {
    async fn get(&self, key: &str) -> Option<String> {
        sqlx::query_scalar::<_, String>("SELECT value FROM idempotency_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> bool {
        let result = sqlx::query(
            "INSERT INTO idempotency_keys (key, value) VALUES (?, ?) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await;
        matches!(result, Ok(outcome) if outcome.rows_affected() > 0)
    }
}

/// `ResolveIdempotency`: if the key already has a stored value, return it
/// without running `create`; otherwise run `create` once and store its
/// result. If `key` is empty, the caller didn't opt into deduplication and
/// `create` always runs.
pub async fn resolve_idempotency<F, Fut>(
    store: &Arc<dyn IdempotencyStore>,
    key: Option<&str>,
    create: F,
) -> Result<String, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<String, anyhow::Error>>,
{
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return create().await;
    };

    if let Some(existing) = store.get(key).await {
        return Ok(existing);
    }

    let value = create().await?;
    store.put_if_absent(key, &value).await;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn creator_runs_once_for_repeated_key() {
        let store: Arc<dyn IdempotencyStore> = Arc::new(InMemoryIdempotencyStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("value-1".to_string())
        };

        let first = resolve_idempotency(&store, Some("k-1"), || make(calls.clone()))
            .await
            .unwrap();
        let second = resolve_idempotency(&store, Some("k-1"), || make(calls.clone()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_key_always_creates() {
        let store: Arc<dyn IdempotencyStore> = Arc::new(InMemoryIdempotencyStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("value".to_string())
        };
        resolve_idempotency(&store, None, || make(calls.clone())).await.unwrap();
        resolve_idempotency(&store, None, || make(calls.clone())).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
