use async_trait::async_trait;
use redis::AsyncCommands;

use crate::errors::AppError;

/// String key/value cache with per-entry TTL.
#[async_trait]
pub trait SignalCache: Send + Sync {
    async fn get_cached(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn put_cached(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct RedisSignalCache {
    client: redis::Client,
}

impl RedisSignalCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SignalCache for RedisSignalCache {
    async fn get_cached(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put_cached(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }
}
