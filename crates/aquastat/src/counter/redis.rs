use super::CounterStore;
use crate::error::{Result, StatError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;

/// Redis-backed counter store
#[derive(Debug, Clone)]
pub struct RedisCounterStore {
    client: Client,
    key_prefix: String,
}

impl RedisCounterStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| StatError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            key_prefix: String::new(),
        })
    }

    /// Namespace every key, e.g. `"aquastat:"`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn mark_seen_once(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.connection().await?;

        // SET key 1 NX [EX ttl] replies OK when set, nil when the key exists
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(1).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }

        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        Ok(reply.is_some())
    }

    async fn increment_field(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.hincr::<_, _, _, i64>(self.key(key), field, 1)
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection().await?;

        conn.hgetall(self.key(key))
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))
    }

    async fn write_field(&self, key: &str, field: &str, value: u64) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.hset::<_, _, _, ()>(self.key(key), field, value)
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        Ok(())
    }
}
