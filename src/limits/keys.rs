use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::store::KvStore;

/// Short mutual exclusion. A caller that loses simply skips its work.
#[derive(Clone)]
pub struct LockStore {
    store: Arc<dyn KvStore>,
}

impl LockStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.store.set_nx(&format!("lock:{key}"), ttl).await
    }
}

/// "Has this operation already started?" A caller that loses looks up the
/// recorded outcome instead of redoing the work.
#[derive(Clone)]
pub struct IdempotencyStore {
    store: Arc<dyn KvStore>,
}

impl IdempotencyStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.store.set_nx(&format!("idem:{key}"), ttl).await
    }

    /// Give the key back when the operation was refused before doing anything.
    pub async fn release(&self, key: &str) -> Result<()> {
        self.store.delete(&format!("idem:{key}")).await
    }
}

/// Rejects a retrigger of the same action within a window.
#[derive(Clone)]
pub struct CooldownStore {
    store: Arc<dyn KvStore>,
}

impl CooldownStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn ensure(&self, key: &str, window: Duration) -> Result<()> {
        let key = format!("cooldown:{key}");
        if self.store.set_nx(&key, window).await? {
            return Ok(());
        }
        let retry_after_secs = self
            .store
            .ttl(&key)
            .await?
            .map(|left| left.as_secs().max(1))
            .unwrap_or(1);
        Err(AppError::Cooldown { retry_after_secs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn lock_and_idempotency_keys_do_not_collide() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = LockStore::new(Arc::clone(&store));
        let idem = IdempotencyStore::new(store);
        assert!(locks.acquire("publish:1", Duration::from_secs(5)).await.unwrap());
        assert!(idem.acquire("publish:1", Duration::from_secs(5)).await.unwrap());
        assert!(!idem.acquire("publish:1", Duration::from_secs(5)).await.unwrap());
        assert!(!locks.acquire("publish:1", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn released_idempotency_key_can_be_reacquired() {
        let idem = IdempotencyStore::new(Arc::new(MemoryStore::new()));
        assert!(idem.acquire("publish:7", Duration::from_secs(60)).await.unwrap());
        idem.release("publish:7").await.unwrap();
        assert!(idem.acquire("publish:7", Duration::from_secs(60)).await.unwrap());
    }

    #[test]
    fn held_lock_is_exclusive_per_key() {
        tokio_test::block_on(async {
            let locks = LockStore::new(Arc::new(MemoryStore::new()));
            assert!(locks.acquire("generate:1", Duration::from_secs(5)).await.unwrap());
            assert!(!locks.acquire("generate:1", Duration::from_secs(5)).await.unwrap());
            assert!(locks.acquire("generate:2", Duration::from_secs(5)).await.unwrap());
        });
    }

    #[tokio::test]
    async fn cooldown_rejects_retrigger() {
        let cooldown = CooldownStore::new(Arc::new(MemoryStore::new()));
        cooldown.ensure("fetch:1", Duration::from_secs(60)).await.unwrap();
        let err = cooldown
            .ensure("fetch:1", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cooldown { retry_after_secs } if retry_after_secs <= 60));
        cooldown.ensure("fetch:2", Duration::from_secs(60)).await.unwrap();
    }
}
