//! Asynchronous hand-off between request handling and ingestion.
//!
//! Request handlers publish observations without waiting for the counter
//! store. A single consumer task applies them in the background.
//!
//! Delivery is best-effort and at-most-once: an event is dropped when the
//! buffer is full, when the consumer has stopped, or when the process exits
//! before the consumer reaches it. Metrics must never slow down or fail a
//! business request.

use crate::error::{Result, StatError};
use crate::ingest::{Observation, StatIngestEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Wire format of a tracking event message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub path: String,
    pub code: u16,
    pub method: String,
    pub ua: String,
}

impl TrackingEvent {
    /// Decode a JSON message, rejecting events with missing fields.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let event: TrackingEvent = serde_json::from_slice(bytes)?;
        if event.path.is_empty() || event.method.is_empty() || event.ua.is_empty() {
            return Err(StatError::InvalidObservation(
                "path, method and ua are required".to_string(),
            ));
        }
        Ok(event)
    }
}

impl From<TrackingEvent> for Observation {
    fn from(event: TrackingEvent) -> Self {
        Observation::new(event.path, event.method, event.ua, event.code)
    }
}

impl From<Observation> for TrackingEvent {
    fn from(observation: Observation) -> Self {
        Self {
            path: observation.path,
            code: observation.status_code,
            method: observation.method,
            ua: observation.user_agent,
        }
    }
}

/// Publishing side of the tracking channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Tracker {
    tx: mpsc::Sender<Observation>,
}

/// Receiving side of the tracking channel
#[derive(Debug)]
pub struct TrackingConsumer {
    rx: mpsc::Receiver<Observation>,
}

impl Tracker {
    /// Create a channel buffering at most `capacity` pending events.
    pub fn channel(capacity: usize) -> (Tracker, TrackingConsumer) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Tracker { tx }, TrackingConsumer { rx })
    }

    /// Queue an observation without waiting.
    ///
    /// Returns false when the event was dropped.
    pub fn publish(&self, observation: Observation) -> bool {
        match self.tx.try_send(observation) {
            Ok(()) => true,
            Err(TrySendError::Full(observation)) => {
                tracing::warn!(path = %observation.path, "tracking buffer full, dropping event");
                false
            }
            Err(TrySendError::Closed(observation)) => {
                tracing::warn!(path = %observation.path, "tracking consumer stopped, dropping event");
                false
            }
        }
    }

    /// Decode and queue a raw JSON tracking message.
    ///
    /// Malformed messages are logged and dropped.
    pub fn publish_raw(&self, bytes: &[u8]) -> bool {
        match TrackingEvent::decode(bytes) {
            Ok(event) => self.publish(event.into()),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed tracking event");
                false
            }
        }
    }
}

impl TrackingConsumer {
    /// Ingest events until every [`Tracker`] is dropped and the buffer is drained.
    ///
    /// Returns the number of events handed to the engine.
    pub async fn run(mut self, engine: StatIngestEngine) -> usize {
        let mut consumed = 0;
        while let Some(observation) = self.rx.recv().await {
            engine.ingest(&observation).await;
            consumed += 1;
        }
        tracing::debug!(consumed, "tracking consumer stopped");
        consumed
    }

    /// Like [`run`](Self::run), but also stops once `stop` fires or its
    /// sender is dropped.
    ///
    /// The stop signal is only checked between events: an ingest in progress
    /// always completes, events still queued are dropped.
    pub async fn run_until(
        mut self,
        engine: StatIngestEngine,
        mut stop: oneshot::Receiver<()>,
    ) -> usize {
        let mut consumed = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    tracing::debug!(consumed, "tracking consumer stopped, dropping queued events");
                    break;
                }
                observation = self.rx.recv() => match observation {
                    Some(observation) => {
                        engine.ingest(&observation).await;
                        consumed += 1;
                    }
                    None => {
                        tracing::debug!(consumed, "tracking consumer stopped");
                        break;
                    }
                },
            }
        }
        consumed
    }
}
