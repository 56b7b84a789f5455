//! Turning raw request observations into counter updates.

use crate::counter::CounterStore;
use crate::error::{Result, StatError};
use crate::registry::{normalize_path, EndpointId};
use crate::snapshot::{
    agent_dedup_key, metric_key, FIELD_ERROR, FIELD_REQUEST, FIELD_SUCCESS, FIELD_UNIQUE_AGENT,
};
use http::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// One served request, as seen by the tracking middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: String,
    pub method: String,
    pub user_agent: String,
    pub status_code: u16,
}

impl Observation {
    pub fn new(
        path: impl Into<String>,
        method: impl Into<String>,
        user_agent: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            user_agent: user_agent.into(),
            status_code,
        }
    }

    fn is_complete(&self) -> bool {
        !self.path.is_empty() && !self.method.is_empty() && !self.user_agent.is_empty()
    }
}

/// How long an agent stays "already counted".
///
/// With no `dedup_ttl` an agent is unique once for all time. With a ttl the
/// dedup mark expires and the agent is counted unique again once per window.
/// Counters themselves are never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    dedup_ttl: Option<Duration>,
}

/// Shortest dedup window. Redis key expiry has whole-second granularity.
pub const MIN_DEDUP_TTL: Duration = Duration::from_secs(1);

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Expire dedup marks after `ttl`. Windows under one second are rejected.
    pub fn windowed(ttl: Duration) -> Result<Self> {
        if ttl < MIN_DEDUP_TTL {
            return Err(StatError::ConfigError(format!(
                "dedup ttl {:?} is shorter than {:?}",
                ttl, MIN_DEDUP_TTL
            )));
        }
        Ok(Self {
            dedup_ttl: Some(ttl),
        })
    }

    pub fn dedup_ttl(&self) -> Option<Duration> {
        self.dedup_ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Path, method or user agent missing
    Incomplete,
    /// Path does not resolve to a registered endpoint
    UnknownEndpoint,
    /// Method is not tracked for the endpoint
    UnsupportedMethod,
}

/// Result of one ingestion. Callers may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Recorded { unique: bool },
    Ignored(IgnoreReason),
    /// A counter store call failed; the observation is partially or fully lost.
    Failed,
}

/// Applies observations to the counter store
#[derive(Clone)]
pub struct StatIngestEngine {
    counters: Arc<dyn CounterStore>,
    retention: RetentionPolicy,
}

impl StatIngestEngine {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self {
            counters,
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Record one observation.
    ///
    /// Never fails: store errors are logged and the observation is dropped.
    /// All store calls have completed when this returns.
    pub async fn ingest(&self, observation: &Observation) -> IngestOutcome {
        if !observation.is_complete() {
            tracing::debug!(?observation, "dropping incomplete observation");
            return IngestOutcome::Ignored(IgnoreReason::Incomplete);
        }

        let path = normalize_path(&observation.path);
        let endpoint = EndpointId::resolve(&path);
        if endpoint == EndpointId::UNKNOWN {
            tracing::debug!(path = %observation.path, "untracked path");
            return IngestOutcome::Ignored(IgnoreReason::UnknownEndpoint);
        }

        let method = match Method::from_bytes(observation.method.as_bytes()) {
            Ok(method) if endpoint.supports(&method) => method,
            _ => {
                tracing::debug!(
                    path = %path,
                    method = %observation.method,
                    "untracked method"
                );
                return IngestOutcome::Ignored(IgnoreReason::UnsupportedMethod);
            }
        };

        let key = metric_key(endpoint, &method);
        let dedup_key = agent_dedup_key(endpoint, &method, &observation.user_agent);

        let unique = match self
            .counters
            .mark_seen_once(&dedup_key, self.retention.dedup_ttl())
            .await
        {
            Ok(unique) => unique,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to mark user agent");
                return IngestOutcome::Failed;
            }
        };

        // Success means exactly 200, not the whole 2xx class
        let outcome_field = if observation.status_code == StatusCode::OK.as_u16() {
            FIELD_SUCCESS
        } else {
            FIELD_ERROR
        };

        let counters = &self.counters;
        let (requested, outcome, agent) = tokio::join!(
            counters.increment_field(&key, FIELD_REQUEST),
            counters.increment_field(&key, outcome_field),
            async {
                if unique {
                    counters.increment_field(&key, FIELD_UNIQUE_AGENT).await
                } else {
                    Ok(())
                }
            },
        );

        let mut failed = false;
        for (field, result) in [
            (FIELD_REQUEST, requested),
            (outcome_field, outcome),
            (FIELD_UNIQUE_AGENT, agent),
        ] {
            if let Err(e) = result {
                tracing::warn!(key = %key, field, error = %e, "failed to increment counter");
                failed = true;
            }
        }

        if failed {
            IngestOutcome::Failed
        } else {
            IngestOutcome::Recorded { unique }
        }
    }
}
