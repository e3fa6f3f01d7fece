use fred::prelude::*;
use reelflow_core::ReelflowError;
use reelflow_core::Result;

use super::KvStore;

/// Redis/Valkey-backed implementation, used in deployment so that a process
/// restart recovers the queue and worker list from durable storage (§4.5).
#[derive(Clone)]
pub struct RedisKv {
    client: Client,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self> {
        let config = Config::from_url(url).map_err(|e| ReelflowError::internal(format!("invalid redis url: {e}")))?;
        let client = Builder::from_config(config)
            .build()
            .map_err(|e| ReelflowError::internal(format!("failed to build redis client: {e}")))?;
        client.init().await.map_err(|e| ReelflowError::service_unavailable(format!("redis connect failed: {e}")))?;
        Ok(Self { client })
    }
}

fn map_err(e: fred::error::Error) -> ReelflowError {
    ReelflowError::internal(format!("redis error: {e}"))
}

#[async_trait::async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.client.get(key).await.map_err(map_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.client.set(key, value, None, None, false).await.map_err(map_err)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _: i64 = self.client.del(key).await.map_err(map_err)?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.client.incr(key).await.map_err(map_err)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()> {
        let _: i64 = self.client.sadd(set_key, member).await.map_err(map_err)?;
        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()> {
        let _: i64 = self.client.srem(set_key, member).await.map_err(map_err)?;
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        self.client.smembers(set_key).await.map_err(map_err)
    }
}
