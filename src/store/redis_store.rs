use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use super::KvStore;
use crate::error::{AppError, Result};

/// INCR and the first PEXPIRE must happen together, otherwise a crash between
/// them leaves a counter that never resets.
const INCR_WITH_EXPIRY: &str = r#"
local value = redis.call('INCR', KEYS[1])
if value == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return value
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    incr_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_error)?;
        let conn = ConnectionManager::new(client).await.map_err(store_error)?;
        Ok(Self {
            conn,
            incr_script: Script::new(INCR_WITH_EXPIRY),
        })
    }
}

fn store_error(e: redis::RedisError) -> AppError {
    AppError::Store(e.to_string())
}

fn ttl_ms(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .incr_script
            .key(key)
            .arg(ttl_ms(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(value)
    }

    async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reply.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let ms: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok((ms > 0).then(|| Duration::from_millis(ms as u64)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
