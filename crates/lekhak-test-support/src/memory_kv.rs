//! In-memory [`KvStore`] implementation for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lekhak_kv::{KvError, KvResult, KvStore};

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    counters: HashMap<String, i64>,
}

/// In-memory store mirroring the KV surface the worker uses.
///
/// `blocking_pop` polls in small steps rather than truly blocking so tests
/// run quickly with short timeouts. Pop failures can be injected to drive
/// the worker's reconnect path.
#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<Inner>,
    fail_pops: AtomicU32,
    reconnects: AtomicU32,
}

impl MemoryKvStore {
    /// Fresh empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make the next `n` `blocking_pop` calls fail with a connection error.
    pub fn fail_next_pops(&self, n: u32) {
        self.fail_pops.store(n, Ordering::SeqCst);
    }

    /// Number of `reconnect` calls observed.
    #[must_use]
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Snapshot of a queue's payloads, head first.
    #[must_use]
    pub fn queue_snapshot(&self, queue: &str) -> Vec<String> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a hash.
    #[must_use]
    pub fn hash_snapshot(&self, key: &str) -> HashMap<String, String> {
        self.lock().hashes.get(key).cloned().unwrap_or_default()
    }

    /// Snapshot of a set.
    #[must_use]
    pub fn set_snapshot(&self, key: &str) -> HashSet<String> {
        self.lock().sets.get(key).cloned().unwrap_or_default()
    }

    /// Seed a queue with a payload (tail position, like the producer).
    pub fn seed_queue(&self, queue: &str, payload: &str) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
    }

    /// Seed a status-record field directly, bypassing the guard.
    pub fn seed_hash_field(&self, key: &str, field: &str, value: &str) {
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn blocking_pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> KvResult<Option<(String, String)>> {
        if self
            .fail_pops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(KvError::Connection {
                message: "injected pop failure".to_string(),
            });
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.lock();
                for queue in queues {
                    if let Some(list) = inner.queues.get_mut(queue)
                        && let Some(payload) = list.pop_front()
                    {
                        return Ok(Some((queue.clone(), payload)));
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn push_back(&self, queue: &str, payload: &str) -> KvResult<()> {
        self.seed_queue(queue, payload);
        Ok(())
    }

    async fn push_front(&self, queue: &str, payload: &str) -> KvResult<()> {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(payload.to_string());
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> KvResult<HashMap<String, String>> {
        Ok(self.hash_snapshot(key))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> KvResult<()> {
        let mut inner = self.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (name, value) in fields {
            hash.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> KvResult<i64> {
        let mut inner = self.lock();
        let counter = inner.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn set_add(&self, key: &str, member: &str) -> KvResult<bool> {
        Ok(self
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> KvResult<bool> {
        Ok(self
            .lock()
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    async fn set_len(&self, key: &str) -> KvResult<u64> {
        Ok(self.lock().sets.get(key).map_or(0, |set| set.len() as u64))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> KvResult<()> {
        // TTLs are irrelevant within a test's lifetime.
        Ok(())
    }

    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }

    async fn reconnect(&self) -> KvResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_in_priority_order() {
        let store = MemoryKvStore::new();
        store.seed_queue("low", "l1");
        store.seed_queue("high", "h1");
        let queues = vec!["high".to_string(), "low".to_string()];

        let first = store
            .blocking_pop(&queues, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(first, Some(("high".to_string(), "h1".to_string())));

        let second = store
            .blocking_pop(&queues, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(second, Some(("low".to_string(), "l1".to_string())));

        let third = store
            .blocking_pop(&queues, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(third, None);
    }

    #[tokio::test]
    async fn counters_and_sets_behave_atomically() {
        let store = MemoryKvStore::new();
        assert_eq!(store.increment("jobs:count").await.unwrap(), 1);
        assert_eq!(store.increment("jobs:count").await.unwrap(), 2);

        assert!(store.set_add("inflight", "a").await.unwrap());
        assert!(!store.set_add("inflight", "a").await.unwrap());
        assert_eq!(store.set_len("inflight").await.unwrap(), 1);
        assert!(store.set_remove("inflight", "a").await.unwrap());
        assert!(!store.set_remove("inflight", "a").await.unwrap());
        assert_eq!(store.set_len("inflight").await.unwrap(), 0);

        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_surface_once_each() {
        let store = MemoryKvStore::new();
        store.fail_next_pops(2);
        let queues = vec!["q".to_string()];
        for _ in 0..2 {
            assert!(
                store
                    .blocking_pop(&queues, Duration::from_millis(5))
                    .await
                    .is_err()
            );
        }
        assert!(
            store
                .blocking_pop(&queues, Duration::from_millis(5))
                .await
                .is_ok()
        );
    }
}
