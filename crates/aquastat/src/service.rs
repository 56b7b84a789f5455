//! Pipeline lifecycle.
//!
//! Startup restores counters from the durable store before any tracking
//! event is applied. Shutdown flushes the counters back with a final backup.
//!
//! ```ignore
//! let service = StatService::new(counters, durable, config)?;
//! let (tracker, consumer) = service.tracking_channel();
//! let running = service.start(consumer).await?;
//!
//! tracker.publish(Observation::new("/farms", "GET", "curl/8.0", 200));
//!
//! drop(tracker);
//! running.shutdown().await;
//! ```

use crate::config::StatConfig;
use crate::counter::CounterStore;
use crate::durable::DurableStore;
use crate::error::Result;
use crate::ingest::StatIngestEngine;
use crate::report::{StatReport, StatReporter};
use crate::sync::{BackupScheduler, StatSynchronizer, SyncReport};
use crate::tracker::{Tracker, TrackingConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Stat pipeline wired to a pair of stores, not yet running
pub struct StatService {
    engine: StatIngestEngine,
    sync: StatSynchronizer,
    reporter: StatReporter,
    config: StatConfig,
}

impl StatService {
    /// Wire the pipeline. Fails when `config` does not validate.
    pub fn new(
        counters: Arc<dyn CounterStore>,
        durable: Arc<dyn DurableStore>,
        config: StatConfig,
    ) -> Result<Self> {
        config.validate()?;
        let engine = StatIngestEngine::new(counters.clone()).with_retention(config.retention()?);
        let sync = StatSynchronizer::new(counters.clone(), durable.clone());
        let reporter = StatReporter::new(counters, durable);
        Ok(Self {
            engine,
            sync,
            reporter,
            config,
        })
    }

    /// Tracking channel sized by the configured buffer.
    ///
    /// Events published before [`start`](Self::start) wait in the buffer.
    pub fn tracking_channel(&self) -> (Tracker, TrackingConsumer) {
        Tracker::channel(self.config.tracking_buffer)
    }

    pub fn config(&self) -> &StatConfig {
        &self.config
    }

    pub fn engine(&self) -> &StatIngestEngine {
        &self.engine
    }

    pub fn synchronizer(&self) -> &StatSynchronizer {
        &self.sync
    }

    pub fn reporter(&self) -> &StatReporter {
        &self.reporter
    }

    /// Migrate, then start backing up on schedule and consuming tracking events.
    pub async fn start(self, consumer: TrackingConsumer) -> Result<RunningService> {
        let migrated = self.sync.migrate().await;
        tracing::info!(
            synced = migrated.synced,
            skipped = migrated.skipped,
            failed = migrated.failed,
            "stat counters restored"
        );

        let scheduler = BackupScheduler::start(self.sync.clone(), self.config.backup_interval())?;

        let (consumer_stop, stop_rx) = oneshot::channel();
        let consumer_task = tokio::spawn(consumer.run_until(self.engine.clone(), stop_rx));

        Ok(RunningService {
            sync: self.sync,
            reporter: self.reporter,
            scheduler,
            consumer_task,
            consumer_stop,
            migrated,
            drain_timeout: self.config.drain_timeout(),
        })
    }
}

/// Handle to a started pipeline.
///
/// Dropping it without [`shutdown`](Self::shutdown) stops the tracking
/// consumer and the schedule, but skips the final backup.
pub struct RunningService {
    sync: StatSynchronizer,
    reporter: StatReporter,
    scheduler: BackupScheduler,
    consumer_task: JoinHandle<usize>,
    consumer_stop: oneshot::Sender<()>,
    migrated: SyncReport,
    drain_timeout: Duration,
}

impl RunningService {
    /// Outcome of the startup migrate
    pub fn migrate_report(&self) -> SyncReport {
        self.migrated
    }

    pub async fn report(&self) -> StatReport {
        self.reporter.generate_report().await
    }

    /// Stop the schedule, drain pending events and run a final backup.
    ///
    /// Drop every [`Tracker`] first. When the drain timeout expires the
    /// consumer finishes the event it is applying and the rest of the queue
    /// is dropped.
    pub async fn shutdown(self) -> SyncReport {
        let RunningService {
            sync,
            scheduler,
            mut consumer_task,
            consumer_stop,
            drain_timeout,
            ..
        } = self;

        scheduler.shutdown().await;

        let drained = match tokio::time::timeout(drain_timeout, &mut consumer_task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!("tracking consumer still busy, dropping queued events");
                let _ = consumer_stop.send(());
                consumer_task.await
            }
        };
        match drained {
            Ok(consumed) => tracing::debug!(consumed, "tracking consumer finished"),
            Err(e) => tracing::error!(error = %e, "tracking consumer task failed"),
        }

        let report = sync.backup().await;
        tracing::info!(
            synced = report.synced,
            skipped = report.skipped,
            failed = report.failed,
            "final stat backup complete"
        );
        report
    }
}
