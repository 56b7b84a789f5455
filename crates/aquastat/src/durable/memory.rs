use super::{DurableRecord, DurableStore, RecordStatus};
use crate::error::{Result, StatError};
use crate::snapshot::MetricsSnapshot;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// In-memory durable store (not persistent, for testing/dev)
///
/// Keeps every row ever written, like the relational table does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDurableStore {
    rows: Arc<Mutex<Vec<DurableRecord>>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows for `key`, oldest first.
    pub fn history(&self, key: &str) -> Result<Vec<DurableRecord>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StatError::BackendError("Lock poisoned".to_string()))?;
        Ok(rows.iter().filter(|r| r.key == key).cloned().collect())
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get_active_record(&self, key: &str) -> Result<MetricsSnapshot> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StatError::BackendError("Lock poisoned".to_string()))?;

        rows.iter()
            .rev()
            .find(|r| r.key == key && r.status == RecordStatus::Active && r.deleted_at.is_none())
            .map(|r| r.snapshot)
            .ok_or_else(|| StatError::NotFound(key.to_string()))
    }

    async fn replace_active_record(&self, key: &str, snapshot: MetricsSnapshot) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StatError::BackendError("Lock poisoned".to_string()))?;
        let now = chrono::Utc::now();

        for row in rows
            .iter_mut()
            .filter(|r| r.key == key && r.status == RecordStatus::Active)
        {
            row.status = RecordStatus::Inactive;
            row.updated_at = now;
        }

        let id = rows.len() as i64 + 1;
        rows.push(DurableRecord {
            id,
            key: key.to_string(),
            snapshot,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });

        Ok(())
    }
}
