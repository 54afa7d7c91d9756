//! SQLite-backed key store for multi-process deployments.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;

use super::KvStore;
use crate::error::Result;

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_entries_expires ON kv_entries(expires_at_ms);
"#;

/// Each operation runs in a `BEGIN IMMEDIATE` transaction, so the write lock is
/// taken before the read and concurrent processes serialize on the file.
/// Expiry uses wall-clock milliseconds since processes do not share a monotonic clock.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            // Enable WAL mode for better concurrent access
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            // Set busy timeout for lock contention
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch(KV_SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

/// Drops every expired row, not only the one being written, so short-lived
/// keys such as idempotency claims do not pile up. Uses the expiry index.
fn sweep_expired(conn: &rusqlite::Connection, now_ms: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM kv_entries WHERE expires_at_ms <= ?1",
        params![now_ms],
    )
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let key = key.to_string();
        let ttl = ttl_ms(ttl);
        let value = self
            .conn
            .call(move |conn| {
                let now_ms = Utc::now().timestamp_millis();
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                sweep_expired(&tx, now_ms)?;
                tx.execute(
                    r#"INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?1, 1, ?2)
                       ON CONFLICT(key) DO UPDATE SET value = value + 1"#,
                    params![key, now_ms.saturating_add(ttl)],
                )?;
                let value: i64 = tx.query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool> {
        let key = key.to_string();
        let ttl = ttl_ms(ttl);
        let acquired = self
            .conn
            .call(move |conn| {
                let now_ms = Utc::now().timestamp_millis();
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                sweep_expired(&tx, now_ms)?;
                let changed = tx.execute(
                    r#"INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?1, 1, ?2)
                       ON CONFLICT(key) DO NOTHING"#,
                    params![key, now_ms.saturating_add(ttl)],
                )?;
                tx.commit()?;
                Ok(changed > 0)
            })
            .await?;
        Ok(acquired)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let key = key.to_string();
        let remaining = self
            .conn
            .call(move |conn| {
                let now_ms = Utc::now().timestamp_millis();
                let expires_at: Option<i64> = conn
                    .query_row(
                        "SELECT expires_at_ms FROM kv_entries WHERE key = ?1 AND expires_at_ms > ?2",
                        params![key, now_ms],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(expires_at.map(|at| at - now_ms))
            })
            .await?;
        Ok(remaining.map(|ms| Duration::from_millis(ms.max(0) as u64)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_handles_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let path = path.to_str().unwrap();

        let a = SqliteStore::open(path).await.unwrap();
        let b = SqliteStore::open(path).await.unwrap();

        assert!(a.set_nx("lock:x", Duration::from_secs(30)).await.unwrap());
        assert!(!b.set_nx("lock:x", Duration::from_secs(30)).await.unwrap());

        assert_eq!(a.incr("quota:x", Duration::from_secs(30)).await.unwrap(), 1);
        assert_eq!(b.incr("quota:x", Duration::from_secs(30)).await.unwrap(), 2);
        assert!(b.ttl("quota:x").await.unwrap().is_some());
        assert!(b.ttl("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_counter_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();

        assert_eq!(store.incr("c", Duration::from_millis(20)).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.incr("c", Duration::from_millis(20)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_rows_are_removed_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();

        for i in 0..50 {
            let key = format!("idem:publish:{i}");
            assert!(store.set_nx(&key, Duration::from_millis(5)).await.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.set_nx("lock:live", Duration::from_secs(60)).await.unwrap());

        let rows: i64 = store
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn deleted_key_can_be_claimed_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();

        assert!(store.set_nx("idem:x", Duration::from_secs(60)).await.unwrap());
        store.delete("idem:x").await.unwrap();
        assert!(store.set_nx("idem:x", Duration::from_secs(60)).await.unwrap());
    }
}
