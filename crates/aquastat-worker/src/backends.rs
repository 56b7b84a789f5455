use anyhow::Context;
use aquastat::{
    CounterStore, DurableStore, InMemoryCounterStore, InMemoryDurableStore, PostgresDurableStore,
    RedisCounterStore, StatConfig,
};
use std::sync::Arc;

/// Counter and durable stores selected from configuration
pub struct Backends {
    pub counters: Arc<dyn CounterStore>,
    pub durable: Arc<dyn DurableStore>,
}

impl Backends {
    pub fn in_memory() -> Self {
        tracing::warn!("using in-memory stores, counters are lost on exit");
        Self {
            counters: Arc::new(InMemoryCounterStore::new()),
            durable: Arc::new(InMemoryDurableStore::new()),
        }
    }

    /// Redis when `redis_url` is set, Postgres when `postgres_url` is set,
    /// in-memory otherwise.
    pub async fn connect(config: &StatConfig) -> anyhow::Result<Self> {
        let counters: Arc<dyn CounterStore> = match &config.redis_url {
            Some(url) => {
                let store = RedisCounterStore::new(url)
                    .context("invalid AQUASTAT_REDIS_URL")?
                    .with_key_prefix(config.redis_key_prefix.clone());
                tracing::info!("counter store: redis");
                Arc::new(store)
            }
            None => {
                tracing::warn!("AQUASTAT_REDIS_URL not set, counters kept in memory");
                Arc::new(InMemoryCounterStore::new())
            }
        };

        let durable: Arc<dyn DurableStore> = match &config.postgres_url {
            Some(url) => {
                let store = connect_postgres(url, &config.postgres_table).await?;
                tracing::info!(table = %config.postgres_table, "durable store: postgres");
                Arc::new(store)
            }
            None => {
                tracing::warn!("AQUASTAT_POSTGRES_URL not set, backups kept in memory");
                Arc::new(InMemoryDurableStore::new())
            }
        };

        Ok(Self { counters, durable })
    }
}

pub async fn connect_postgres(url: &str, table: &str) -> anyhow::Result<PostgresDurableStore> {
    let store = PostgresDurableStore::connect(url, table)
        .await
        .context("failed to connect to postgres")?;
    store
        .ensure_schema()
        .await
        .context("failed to prepare stat table")?;
    Ok(store)
}
