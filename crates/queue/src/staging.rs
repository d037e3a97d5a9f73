//! Redis implementation of the staging store.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use scribe_core::pipeline::PipelineError;
use scribe_core::pipeline::ports::StagingStore;

use crate::staging_error;

/// Decrement a counter only if it still exists. `DECR` on a missing key would
/// create it at -1 without a TTL.
const DECREMENT_EXISTING: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('DECR', KEYS[1])
end
return false
";

/// Staged payloads and pending counters in Redis.
#[derive(Clone)]
pub struct RedisStagingStore {
    conn: ConnectionManager,
    decrement: Script,
}

impl RedisStagingStore {
    /// Create a store over a shared connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            decrement: Script::new(DECREMENT_EXISTING),
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl StagingStore for RedisStagingStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(staging_error)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, PipelineError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(staging_error)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(staging_error)
    }

    async fn decrement(&self, key: &str) -> Result<Option<i64>, PipelineError> {
        let mut conn = self.conn.clone();
        self.decrement
            .key(key)
            .invoke_async::<_, Option<i64>>(&mut conn)
            .await
            .map_err(staging_error)
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(staging_error)
    }

    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(staging_error)
    }
}
