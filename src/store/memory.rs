use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::KvStore;
use crate::error::Result;

/// Writes between full passes that drop expired entries.
const SWEEP_INTERVAL: usize = 128;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, Entry>,
    writes: usize,
}

impl Inner {
    /// Counts a write and drops every expired key once per `SWEEP_INTERVAL` writes.
    fn note_write(&mut self, now: Instant) {
        self.writes += 1;
        if self.writes >= SWEEP_INTERVAL {
            self.writes = 0;
            self.map.retain(|_, entry| entry.is_live(now));
        }
    }
}

/// Process-local store. One mutex guards the whole map so each operation is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner().map.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut inner = self.inner();
        inner.note_write(now);
        let entry = inner
            .map
            .entry(key.to_string())
            .and_modify(|e| {
                if e.is_live(now) {
                    e.value += 1;
                } else {
                    *e = Entry {
                        value: 1,
                        expires_at: now + ttl,
                    };
                }
            })
            .or_insert(Entry {
                value: 1,
                expires_at: now + ttl,
            });
        Ok(entry.value)
    }

    async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.inner();
        inner.note_write(now);
        match inner.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(false),
            _ => {
                inner.map.insert(
                    key.to_string(),
                    Entry {
                        value: 1,
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let mut inner = self.inner();
        match inner.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.expires_at - now)),
            Some(_) => {
                inner.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner().map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn incr_counts_and_keeps_first_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.incr("c", Duration::from_secs(1)).await.unwrap(), 2);
        let left = store.ttl("c").await.unwrap().unwrap();
        assert!(left > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn set_nx_expires() {
        let store = MemoryStore::new();
        assert!(store.set_nx("k", Duration::from_millis(30)).await.unwrap());
        assert!(!store.set_nx("k", Duration::from_millis(30)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.ttl("k").await.unwrap().is_none());
        assert!(store.set_nx("k", Duration::from_millis(30)).await.unwrap());
    }

    #[tokio::test]
    async fn deleted_key_can_be_claimed_again() {
        let store = MemoryStore::new();
        assert!(store.set_nx("k", Duration::from_secs(60)).await.unwrap());
        store.delete("k").await.unwrap();
        assert!(store.set_nx("k", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_keys_are_swept() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store
                .set_nx(&format!("idem:{i}"), Duration::from_millis(1))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..SWEEP_INTERVAL {
            store.incr("live", Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_set_nx_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.set_nx("once", Duration::from_secs(5)).await })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
