//! API usage metrics for the farm and pond service
//!
//! Aquastat counts requests per registered endpoint and method, tracks unique
//! user agents and success/error outcomes, and keeps a fast counter store in
//! step with a durable relational store across restarts.
//!
//! - [`StatIngestEngine`] turns request observations into counter updates
//! - [`StatSynchronizer`] backs counters up to the durable store and restores them
//! - [`StatReporter`] builds a sparse usage report
//! - [`StatService`] wires them together with a tracking channel and a backup schedule
//!
//! Counter and durable backends are pluggable through [`CounterStore`] and
//! [`DurableStore`]. In-memory backends are always available; Redis and
//! PostgreSQL backends sit behind the `redis` and `postgres` features.

pub mod config;
pub mod counter;
pub mod durable;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod registry;
pub mod report;
pub mod service;
pub mod snapshot;
pub mod sync;
pub mod tracker;

pub use config::StatConfig;
pub use counter::memory::InMemoryCounterStore;
pub use counter::CounterStore;
pub use durable::memory::InMemoryDurableStore;
pub use durable::{DurableRecord, DurableStore, RecordStatus};
pub use error::{Result, StatError};
pub use ingest::{IgnoreReason, IngestOutcome, Observation, RetentionPolicy, StatIngestEngine};
pub use registry::EndpointId;
pub use report::{StatReport, StatReporter};
pub use service::{RunningService, StatService};
pub use snapshot::MetricsSnapshot;
pub use sync::{BackupScheduler, StatSynchronizer, SyncReport};
pub use tracker::{Tracker, TrackingConsumer, TrackingEvent};

#[cfg(feature = "redis")]
pub use counter::redis::RedisCounterStore;

#[cfg(feature = "postgres")]
pub use durable::postgres::PostgresDurableStore;
