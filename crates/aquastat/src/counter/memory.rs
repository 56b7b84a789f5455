use super::CounterStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// In-memory counter store (not persistent, for testing/dev)
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    hashes: Arc<DashMap<String, HashMap<String, u64>>>,
    // Dedup marks with optional expiry
    marks: Arc<DashMap<String, Option<Instant>>>,
    expiring_marks: Arc<AtomicU64>,
}

/// Expired marks are swept after this many expiring marks are set.
const PRUNE_EVERY: u64 = 1024;

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counter hashes currently stored.
    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }

    /// Number of dedup marks currently stored, expired ones included.
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    /// Drop expired dedup marks. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.marks.len();
        self.marks.retain(|_, expires_at| expires_at.map_or(true, |at| at > now));
        before.saturating_sub(self.marks.len())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn mark_seen_once(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);

        // The entry guard holds the shard lock, so check-and-set is atomic.
        let created = match self.marks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let expired = entry.get().is_some_and(|at| at <= now);
                if expired {
                    entry.insert(expires_at);
                }
                expired
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        };

        // Outside the entry guard: retain locks every shard
        if created && ttl.is_some() {
            let set = self.expiring_marks.fetch_add(1, Ordering::Relaxed) + 1;
            if set % PRUNE_EVERY == 0 {
                let pruned = self.prune_expired();
                tracing::debug!(pruned, "pruned expired dedup marks");
            }
        }

        Ok(created)
    }

    async fn increment_field(&self, key: &str, field: &str) -> Result<()> {
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        *hash.entry(field.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_field(&self, key: &str, field: &str, value: u64) -> Result<()> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }
}
