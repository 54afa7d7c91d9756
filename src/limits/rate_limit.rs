use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::store::KvStore;

const WINDOW: Duration = Duration::from_secs(60 * 60);

/// Hourly publish limiter. The window opens with the first publish and the
/// remaining TTL is returned as the retry hint.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    per_hour: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, per_hour: u32) -> Self {
        Self { store, per_hour }
    }

    pub async fn ensure(&self, project_id: i64) -> Result<()> {
        let key = format!("rate:publish:{project_id}");
        let count = self.store.incr(&key, WINDOW).await?;
        if count > i64::from(self.per_hour) {
            let retry_after_secs = self
                .store
                .ttl(&key)
                .await?
                .map(|left| left.as_secs().max(1))
                .unwrap_or(WINDOW.as_secs());
            tracing::info!(project_id, retry_after_secs, "Publish rate limit hit");
            return Err(AppError::RateLimited { retry_after_secs });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn excess_publish_gets_retry_hint() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 2);
        limiter.ensure(1).await.unwrap();
        limiter.ensure(1).await.unwrap();
        match limiter.ensure(1).await {
            Err(AppError::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs > 3500 && retry_after_secs <= 3600);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        limiter.ensure(2).await.unwrap();
    }
}
