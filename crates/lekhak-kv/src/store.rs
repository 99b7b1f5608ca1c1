//! The `KvStore` trait: the queue/KV protocol surface the worker depends on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::KvResult;

/// Minimal KV/queue interface shared by the worker loop and the pipelines.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// from a single cooperative task; the worker never issues concurrent calls
/// on one job's behalf.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Pop the first available payload from `queues` in priority order,
    /// blocking up to `timeout`. Returns `(queue, payload)` or `None` when
    /// the timeout elapses.
    async fn blocking_pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> KvResult<Option<(String, String)>>;

    /// Append a payload to the tail of a list (requeue order).
    async fn push_back(&self, queue: &str, payload: &str) -> KvResult<()>;

    /// Prepend a payload to the head of a list (dead-letter order).
    async fn push_front(&self, queue: &str, payload: &str) -> KvResult<()>;

    /// Read all fields of a hash; an absent key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> KvResult<HashMap<String, String>>;

    /// Write fields into a hash, creating it when absent.
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> KvResult<()>;

    /// Atomically increment an integer key and return the new value.
    async fn increment(&self, key: &str) -> KvResult<i64>;

    /// Add a member to a set; returns `true` when it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> KvResult<bool>;

    /// Remove a member from a set; returns `true` when it was present.
    async fn set_remove(&self, key: &str, member: &str) -> KvResult<bool>;

    /// Cardinality of a set; an absent key yields 0.
    async fn set_len(&self, key: &str) -> KvResult<u64>;

    /// Apply a time-to-live to a key.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()>;

    /// Liveness probe.
    async fn ping(&self) -> KvResult<()>;

    /// Tear down and re-establish the underlying connection. Used by the
    /// worker loop to defeat stale proxies after long idle periods.
    async fn reconnect(&self) -> KvResult<()>;
}
