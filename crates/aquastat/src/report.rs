use crate::counter::{read_snapshot, CounterStore};
use crate::durable::DurableStore;
use crate::registry::pairs;
use crate::snapshot::{metric_key, MetricsSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Report entries keyed by `"<METHOD> <canonical path>"`, e.g. `"GET /farms"`.
pub type StatReport = BTreeMap<String, MetricsSnapshot>;

/// Builds usage reports from the live counters
#[derive(Clone)]
pub struct StatReporter {
    counters: Arc<dyn CounterStore>,
    durable: Arc<dyn DurableStore>,
}

impl StatReporter {
    pub fn new(counters: Arc<dyn CounterStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self { counters, durable }
    }

    /// Current counters for every registered pair that has seen traffic.
    ///
    /// Pairs missing from the counter store fall back to their durable
    /// snapshot. Pairs readable from neither store, and pairs with no
    /// requests and no agents, are left out. Never fails.
    pub async fn generate_report(&self) -> StatReport {
        let mut report = StatReport::new();

        for (endpoint, method) in pairs() {
            let Some(path) = endpoint.path() else {
                continue;
            };
            let key = metric_key(endpoint, &method);

            let snapshot = match read_snapshot(self.counters.as_ref(), &key).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    if !e.is_not_found() {
                        tracing::debug!(key = %key, error = %e, "report: counters unavailable, using durable store");
                    }
                    match self.durable.get_active_record(&key).await {
                        Ok(snapshot) => snapshot,
                        Err(_) => continue,
                    }
                }
            };

            if !snapshot.is_empty() {
                report.insert(format!("{} {}", method, path), snapshot);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::memory::InMemoryCounterStore;
    use crate::durable::memory::InMemoryDurableStore;
    use crate::snapshot::{FIELD_ERROR, FIELD_REQUEST};

    #[tokio::test]
    async fn test_empty_stores_give_empty_report() {
        let reporter = StatReporter::new(
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(InMemoryDurableStore::new()),
        );
        assert!(reporter.generate_report().await.is_empty());
    }

    #[tokio::test]
    async fn test_report_labels_and_fallback() {
        let counters = InMemoryCounterStore::new();
        let durable = InMemoryDurableStore::new();

        counters.increment_field("P:1:DELETE", FIELD_REQUEST).await.unwrap();
        counters.increment_field("P:1:DELETE", FIELD_ERROR).await.unwrap();
        durable
            .replace_active_record("P:4:GET", MetricsSnapshot::new(6, 2, 6, 0))
            .await
            .unwrap();

        let reporter = StatReporter::new(Arc::new(counters), Arc::new(durable));
        let report = reporter.generate_report().await;

        assert_eq!(report.len(), 2);
        assert_eq!(report["DELETE /farms"], MetricsSnapshot::new(1, 0, 0, 1));
        assert_eq!(report["GET /ponds/{id}"], MetricsSnapshot::new(6, 2, 6, 0));
    }

    #[tokio::test]
    async fn test_zero_entries_are_omitted() {
        let counters = InMemoryCounterStore::new();
        counters.write_field("P:3:PUT", FIELD_REQUEST, 0).await.unwrap();

        let reporter = StatReporter::new(Arc::new(counters), Arc::new(InMemoryDurableStore::new()));
        assert!(reporter.generate_report().await.is_empty());
    }
}
