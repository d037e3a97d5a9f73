//! In-process staging store backed by Moka.
//!
//! Used by single-process deployments and tests. Each entry carries its own
//! TTL; decrementing a counter mutates it in place so its expiry is kept.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

use super::error::PipelineError;
use super::ports::StagingStore;

/// Default maximum number of staged entries.
const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Debug)]
struct StagedValue {
    value: Mutex<String>,
    ttl: Duration,
}

impl StagedValue {
    fn new(value: &str, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value.to_string()),
            ttl,
        })
    }

    fn read(&self) -> Result<String, PipelineError> {
        self.value
            .lock()
            .map(|v| v.clone())
            .map_err(|_| PipelineError::staging("staged value lock poisoned"))
    }
}

struct PerEntryTtl;

impl Expiry<String, Arc<StagedValue>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<StagedValue>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<StagedValue>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Moka-backed [`StagingStore`].
#[derive(Clone)]
pub struct MemoryStagingStore {
    cache: Cache<String, Arc<StagedValue>>,
}

impl MemoryStagingStore {
    /// Create a store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store holding at most `max_capacity` entries.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryStagingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingStore for MemoryStagingStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PipelineError> {
        self.cache
            .insert(key.to_string(), StagedValue::new(value, ttl))
            .await;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, PipelineError> {
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert_with(async { StagedValue::new(value, ttl) })
            .await;
        Ok(entry.is_fresh())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError> {
        match self.cache.get(key).await {
            Some(staged) => staged.read().map(Some),
            None => Ok(None),
        }
    }

    async fn decrement(&self, key: &str) -> Result<Option<i64>, PipelineError> {
        let Some(staged) = self.cache.get(key).await else {
            return Ok(None);
        };

        let mut value = staged
            .value
            .lock()
            .map_err(|_| PipelineError::staging("staged value lock poisoned"))?;
        let current: i64 = value
            .parse()
            .map_err(|_| PipelineError::staging(format!("value at '{key}' is not an integer")))?;
        let next = current - 1;
        *value = next.to_string();
        Ok(Some(next))
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(self.cache.get(key).await.is_some())
    }
}
