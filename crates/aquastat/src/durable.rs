use crate::error::Result;
use crate::snapshot::MetricsSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Status of a durable row.
///
/// Only the newest `Active` row of a key is authoritative; older rows are
/// kept as `Inactive` history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum RecordStatus {
    Deleted,
    Unknown,
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn value(self) -> i32 {
        match self {
            RecordStatus::Deleted => -1,
            RecordStatus::Unknown => 0,
            RecordStatus::Active => 1,
            RecordStatus::Inactive => 2,
        }
    }
}

impl From<RecordStatus> for i32 {
    fn from(status: RecordStatus) -> Self {
        status.value()
    }
}

impl TryFrom<i32> for RecordStatus {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(RecordStatus::Deleted),
            0 => Ok(RecordStatus::Unknown),
            1 => Ok(RecordStatus::Active),
            2 => Ok(RecordStatus::Inactive),
            other => Err(format!("unknown record status {}", other)),
        }
    }
}

/// One stored snapshot row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableRecord {
    pub id: i64,
    pub key: String,
    pub snapshot: MetricsSnapshot,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Relational storage for counter snapshots
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Latest active snapshot for `key`.
    /// Returns [`StatError::NotFound`](crate::StatError::NotFound) when the key
    /// was never backed up.
    async fn get_active_record(&self, key: &str) -> Result<MetricsSnapshot>;

    /// Deactivate the current active row for `key`, then insert `snapshot`
    /// as the new active row. The insert happens even when nothing was
    /// deactivated.
    async fn replace_active_record(&self, key: &str, snapshot: MetricsSnapshot) -> Result<()>;
}
