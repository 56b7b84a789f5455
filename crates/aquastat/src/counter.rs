use crate::error::{Result, StatError};
use crate::snapshot::MetricsSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// Fast storage for live counters.
///
/// Mirrors the Redis commands the pipeline relies on: `SET NX`, `HINCRBY`,
/// `HGETALL` and `HSET`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically create `key` if absent.
    /// Returns true only for the caller that created it. With a `ttl` the
    /// mark expires and the key counts as absent again afterwards.
    async fn mark_seen_once(&self, key: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Atomically add one to `field` of the hash at `key`, starting from 0.
    async fn increment_field(&self, key: &str, field: &str) -> Result<()>;

    /// All fields of the hash at `key`. Empty when the hash does not exist.
    async fn read_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Overwrite `field` of the hash at `key`.
    async fn write_field(&self, key: &str, field: &str, value: u64) -> Result<()>;
}

/// Read the counters for `key` as a snapshot.
///
/// A hash that was never written yields [`StatError::NotFound`] so sweeps
/// skip keys nobody has hit yet.
pub async fn read_snapshot(store: &dyn CounterStore, key: &str) -> Result<MetricsSnapshot> {
    let fields = store.read_all(key).await?;
    if fields.is_empty() {
        return Err(StatError::NotFound(key.to_string()));
    }
    Ok(MetricsSnapshot::from_fields(&fields))
}
