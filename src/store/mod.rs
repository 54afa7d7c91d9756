//! Key/TTL primitives shared by quotas, rate limits, locks, idempotency keys
//! and cooldowns.
//!
//! Every backend must make `incr` and `set_nx` indivisible: two concurrent
//! callers never both see a fresh counter or both win the same key.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_store;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};

pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Increment the counter at `key`, starting from zero. The expiry is set only
    /// when the increment creates the key.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Claim `key` for `ttl`. Returns false if it is already held.
    async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Time left before `key` expires, or `None` if it is not set.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Remove `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Select the backend from the configured store URL.
///
/// `None` keeps everything in process memory. `sqlite` shares the main database
/// file, `sqlite:<path>` uses a separate file, and `redis://...` needs the
/// `redis-backend` feature.
pub async fn build_store(store_url: Option<&str>, db_path: &str) -> Result<Arc<dyn KvStore>> {
    match store_url.map(str::trim).filter(|s| !s.is_empty()) {
        None | Some("memory") => {
            tracing::debug!("Using in-memory key store");
            Ok(Arc::new(MemoryStore::new()))
        }
        Some("sqlite") => {
            tracing::debug!(path = db_path, "Using SQLite key store");
            Ok(Arc::new(SqliteStore::open(db_path).await?))
        }
        Some(url) if url.starts_with("sqlite:") => {
            let path = &url["sqlite:".len()..];
            tracing::debug!(path, "Using SQLite key store");
            Ok(Arc::new(SqliteStore::open(path).await?))
        }
        #[cfg(feature = "redis-backend")]
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            tracing::debug!("Using Redis key store");
            Ok(Arc::new(RedisStore::connect(url).await?))
        }
        Some(url) => Err(AppError::Config(format!(
            "unsupported store_url '{url}' (expected sqlite, sqlite:<path> or redis:// with the redis-backend feature)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_url_builds_memory_store() {
        let store = build_store(None, ":memory:").await.unwrap();
        assert_eq!(store.incr("k", Duration::from_secs(5)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_scheme_is_a_config_error() {
        let err = build_store(Some("memcached://localhost"), ":memory:")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
