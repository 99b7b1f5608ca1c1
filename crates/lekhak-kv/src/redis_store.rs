//! Redis-backed implementation of [`KvStore`].
//!
//! Commands go through a multiplexed [`ConnectionManager`]; `reconnect`
//! swaps in a freshly built manager, which is how the worker loop defeats
//! proxies that silently drop long-idle connections.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{KvError, KvResult};
use crate::store::KvStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Production [`KvStore`] backed by Redis.
pub struct RedisKvStore {
    client: Client,
    manager: Mutex<ConnectionManager>,
}

impl RedisKvStore {
    /// Open a connection manager against `url` (`redis://` or `rediss://`).
    ///
    /// # Errors
    ///
    /// Returns a [`KvError`] when the URL is invalid or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str) -> KvResult<Self> {
        let client = Client::open(url).map_err(KvError::from)?;
        let manager = Self::build_manager(&client).await?;
        Ok(Self {
            client,
            manager: Mutex::new(manager),
        })
    }

    async fn build_manager(client: &Client) -> KvResult<ConnectionManager> {
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(RESPONSE_TIMEOUT);
        ConnectionManager::new_with_config(client.clone(), config)
            .await
            .map_err(KvError::from)
    }

    async fn connection(&self) -> ConnectionManager {
        self.manager.lock().await.clone()
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn blocking_pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> KvResult<Option<(String, String)>> {
        let mut conn = self.connection().await;
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queues)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(KvError::from)?;
        Ok(reply)
    }

    async fn push_back(&self, queue: &str, payload: &str) -> KvResult<()> {
        let mut conn = self.connection().await;
        let _: i64 = conn.rpush(queue, payload).await.map_err(KvError::from)?;
        Ok(())
    }

    async fn push_front(&self, queue: &str, payload: &str) -> KvResult<()> {
        let mut conn = self.connection().await;
        let _: i64 = conn.lpush(queue, payload).await.map_err(KvError::from)?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> KvResult<HashMap<String, String>> {
        let mut conn = self.connection().await;
        conn.hgetall(key).await.map_err(KvError::from)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> KvResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await;
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(KvError::from)?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> KvResult<i64> {
        let mut conn = self.connection().await;
        conn.incr(key, 1i64).await.map_err(KvError::from)
    }

    async fn set_add(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut conn = self.connection().await;
        let added: i64 = conn.sadd(key, member).await.map_err(KvError::from)?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut conn = self.connection().await;
        let removed: i64 = conn.srem(key, member).await.map_err(KvError::from)?;
        Ok(removed > 0)
    }

    async fn set_len(&self, key: &str) -> KvResult<u64> {
        let mut conn = self.connection().await;
        conn.scard(key).await.map_err(KvError::from)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.connection().await;
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let _: bool = conn.expire(key, secs).await.map_err(KvError::from)?;
        Ok(())
    }

    async fn ping(&self) -> KvResult<()> {
        let mut conn = self.connection().await;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(KvError::from)?;
        Ok(())
    }

    async fn reconnect(&self) -> KvResult<()> {
        let fresh = Self::build_manager(&self.client).await?;
        *self.manager.lock().await = fresh;
        info!("kv_reconnected");
        Ok(())
    }
}
