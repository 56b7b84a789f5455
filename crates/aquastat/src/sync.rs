//! Moving counters between the counter store and the durable store.
//!
//! Neither direction is transactional across the two stores. A backup that
//! races live ingestion may miss the newest increments, and a migrate that
//! races ingestion overwrites them. Both sweeps visit every registered
//! `(endpoint, method)` pair no matter how many individual pairs fail.

use crate::counter::{read_snapshot, CounterStore};
use crate::durable::DurableStore;
use crate::error::{Result, StatError};
use crate::registry::pairs;
use crate::snapshot::{metric_key, MetricsSnapshot};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Per-sweep tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pairs copied to the target store
    pub synced: usize,
    /// Pairs with nothing to copy yet
    pub skipped: usize,
    /// Pairs abandoned because a store call failed
    pub failed: usize,
}

enum PairResult {
    Synced,
    Skipped,
    Failed,
}

impl SyncReport {
    fn record(&mut self, result: PairResult) {
        match result {
            PairResult::Synced => self.synced += 1,
            PairResult::Skipped => self.skipped += 1,
            PairResult::Failed => self.failed += 1,
        }
    }
}

/// Backup (counters to durable) and migrate (durable to counters)
#[derive(Clone)]
pub struct StatSynchronizer {
    counters: Arc<dyn CounterStore>,
    durable: Arc<dyn DurableStore>,
}

impl StatSynchronizer {
    pub fn new(counters: Arc<dyn CounterStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self { counters, durable }
    }

    /// Copy every counter into the durable store, one pair at a time.
    pub async fn backup(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for (endpoint, method) in pairs() {
            let key = metric_key(endpoint, &method);

            let snapshot = match read_snapshot(self.counters.as_ref(), &key).await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_not_found() => {
                    report.record(PairResult::Skipped);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "backup: failed to read counters");
                    report.record(PairResult::Failed);
                    continue;
                }
            };

            match self.durable.replace_active_record(&key, snapshot).await {
                Ok(()) => report.record(PairResult::Synced),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "backup: failed to store snapshot");
                    report.record(PairResult::Failed);
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            skipped = report.skipped,
            failed = report.failed,
            "stat backup finished"
        );
        report
    }

    /// Restore every counter from its latest durable snapshot.
    ///
    /// Runs one task per pair and waits for all of them. Existing counter
    /// values for restored keys are overwritten.
    pub async fn migrate(&self) -> SyncReport {
        let units = pairs().map(|(endpoint, method)| {
            let key = metric_key(endpoint, &method);
            async move { self.migrate_key(&key).await }
        });

        let mut report = SyncReport::default();
        for result in join_all(units).await {
            report.record(result);
        }

        tracing::info!(
            synced = report.synced,
            skipped = report.skipped,
            failed = report.failed,
            "stat migrate finished"
        );
        report
    }

    async fn migrate_key(&self, key: &str) -> PairResult {
        let snapshot = match self.durable.get_active_record(key).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() => return PairResult::Skipped,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "migrate: failed to read snapshot");
                return PairResult::Failed;
            }
        };

        if self.write_snapshot(key, snapshot).await {
            PairResult::Synced
        } else {
            PairResult::Failed
        }
    }

    /// Write all four fields concurrently. False if any write failed.
    async fn write_snapshot(&self, key: &str, snapshot: MetricsSnapshot) -> bool {
        let writes = snapshot
            .fields()
            .map(|(field, value)| async move {
                let result = self.counters.write_field(key, field, value).await;
                if let Err(e) = &result {
                    tracing::warn!(key = %key, field, error = %e, "migrate: failed to write counter");
                }
                result
            });

        join_all(writes).await.iter().all(|r| r.is_ok())
    }
}

/// Periodic backup task
pub struct BackupScheduler {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl BackupScheduler {
    /// Run a backup every `period`, the first one a full period from now.
    ///
    /// Fails for a zero period or one too large to schedule.
    pub fn start(sync: StatSynchronizer, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(StatError::ConfigError(
                "backup period must be greater than 0".to_string(),
            ));
        }
        let first_tick = tokio::time::Instant::now()
            .checked_add(period)
            .ok_or_else(|| {
                StatError::ConfigError(format!("backup period {:?} is too large", period))
            })?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::info!("running scheduled stat backup");
                        sync.backup().await;
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    /// Stop the schedule. A backup already in progress finishes first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::error!(error = %e, "backup scheduler task failed");
        }
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::memory::InMemoryCounterStore;
    use crate::durable::memory::InMemoryDurableStore;
    use crate::snapshot::{FIELD_REQUEST, FIELD_SUCCESS};

    fn setup() -> (StatSynchronizer, InMemoryCounterStore, InMemoryDurableStore) {
        let counters = InMemoryCounterStore::new();
        let durable = InMemoryDurableStore::new();
        let sync = StatSynchronizer::new(Arc::new(counters.clone()), Arc::new(durable.clone()));
        (sync, counters, durable)
    }

    #[tokio::test]
    async fn test_backup_skips_untouched_pairs() {
        let (sync, counters, durable) = setup();
        counters.increment_field("P:1:GET", FIELD_REQUEST).await.unwrap();
        counters.increment_field("P:1:GET", FIELD_SUCCESS).await.unwrap();

        let report = sync.backup().await;
        assert_eq!(report, SyncReport { synced: 1, skipped: 9, failed: 0 });
        assert_eq!(
            durable.get_active_record("P:1:GET").await.unwrap(),
            MetricsSnapshot::new(1, 0, 1, 0)
        );
        assert!(durable.get_active_record("P:1:POST").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_migrate_overwrites_counters() {
        let (sync, counters, durable) = setup();
        durable
            .replace_active_record("P:3:GET", MetricsSnapshot::new(9, 4, 7, 2))
            .await
            .unwrap();
        counters.write_field("P:3:GET", FIELD_REQUEST, 100).await.unwrap();

        let report = sync.migrate().await;
        assert_eq!(report, SyncReport { synced: 1, skipped: 9, failed: 0 });
        assert_eq!(
            read_snapshot(&counters, "P:3:GET").await.unwrap(),
            MetricsSnapshot::new(9, 4, 7, 2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_backup_each_period() {
        let (sync, counters, durable) = setup();
        counters.increment_field("P:1:GET", FIELD_REQUEST).await.unwrap();
        counters.increment_field("P:1:GET", FIELD_SUCCESS).await.unwrap();

        let scheduler = BackupScheduler::start(sync, Duration::from_secs(300)).unwrap();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(durable.history("P:1:GET").unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(durable.history("P:1:GET").unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(durable.history("P:1:GET").unwrap().len(), 2);

        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(durable.history("P:1:GET").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scheduler_rejects_unusable_periods() {
        let (sync, _counters, _durable) = setup();
        assert!(matches!(
            BackupScheduler::start(sync.clone(), Duration::ZERO),
            Err(StatError::ConfigError(_))
        ));
        assert!(matches!(
            BackupScheduler::start(sync, Duration::MAX),
            Err(StatError::ConfigError(_))
        ));
    }

    /// Durable store whose reads all wait until every migrate unit has started
    struct RendezvousDurable {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl DurableStore for RendezvousDurable {
        async fn get_active_record(&self, key: &str) -> Result<MetricsSnapshot> {
            self.barrier.wait().await;
            Err(StatError::NotFound(key.to_string()))
        }

        async fn replace_active_record(
            &self,
            _key: &str,
            _snapshot: MetricsSnapshot,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_migrate_runs_every_pair_concurrently() {
        let durable = RendezvousDurable {
            barrier: tokio::sync::Barrier::new(pairs().count()),
        };
        let counters = InMemoryCounterStore::new();
        let sync = StatSynchronizer::new(Arc::new(counters), Arc::new(durable));

        // A sequential sweep would block forever on the first read
        let report = tokio::time::timeout(Duration::from_secs(5), sync.migrate())
            .await
            .expect("migrate units did not run concurrently");
        assert_eq!(report, SyncReport { synced: 0, skipped: 10, failed: 0 });
    }
}
