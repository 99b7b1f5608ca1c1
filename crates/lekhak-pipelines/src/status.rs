//! Guarded status store.
//!
//! The sole sanctioned mutator of job-status records. Every write stamps
//! `updated_at`, stamps `contract_version` alongside any `status` mutation,
//! consults the transition table before writing, and refreshes the record's
//! 24 h TTL. Blocked transitions are logged and reported, never written.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use lekhak_core::contract::{CONTRACT_VERSION, JOB_STATUS_TTL_SECS, job_status_key};
use lekhak_core::machine::{is_allowed_transition, normalize};
use lekhak_kv::{KvError, KvResult, KvStore, RetryPolicy, run_with_retry};
use tracing::warn;

/// Result of one guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedWrite {
    /// Whether the write happened.
    pub ok: bool,
    /// Status before the write, when the mapping carried a `status`.
    pub from: Option<String>,
    /// Normalized target status, when the mapping carried one.
    pub to: Option<String>,
}

/// Shared handle for reading and mutating job-status records.
#[derive(Clone)]
pub struct StatusStore {
    kv: Arc<dyn KvStore>,
    retry: RetryPolicy,
}

impl StatusStore {
    /// Wrap a KV store with the configured KV retry policy.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, retry: RetryPolicy) -> Self {
        Self { kv, retry }
    }

    /// Read the full status record of a job; absent records yield an empty
    /// map.
    ///
    /// # Errors
    ///
    /// Returns the KV failure once the retry policy is exhausted.
    pub async fn read(&self, job_id: &str) -> KvResult<HashMap<String, String>> {
        let key = job_status_key(job_id);
        run_with_retry(
            "hash_get_all",
            &key,
            self.retry,
            KvError::is_retryable,
            || self.kv.hash_get_all(&key),
        )
        .await
    }

    /// Guarded status write.
    ///
    /// Mappings without a `status` field are written unconditionally. When
    /// a status is present, the current record is read first and the
    /// transition checked; disallowed transitions log
    /// `status_transition_blocked` and return without writing. The
    /// check-then-write sequence is best-effort under concurrency; terminal
    /// stickiness bounds racing writers.
    ///
    /// # Errors
    ///
    /// Returns the KV failure once the retry policy is exhausted.
    pub async fn update(
        &self,
        job_id: &str,
        context: &str,
        request_id: &str,
        fields: &[(&str, String)],
    ) -> KvResult<GuardedWrite> {
        let key = job_status_key(job_id);
        let target = fields
            .iter()
            .find(|(name, _)| *name == "status")
            .and_then(|(_, value)| normalize(Some(value.as_str())));

        let mut mapping: Vec<(String, String)> = fields
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect();
        mapping.push((
            "updated_at".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        ));

        let Some(target) = target else {
            self.write(&key, &mapping).await?;
            return Ok(GuardedWrite {
                ok: true,
                from: None,
                to: None,
            });
        };

        mapping.push(("contract_version".to_string(), CONTRACT_VERSION.to_string()));

        let current_record = self.read(job_id).await?;
        let current = normalize(current_record.get("status").map(String::as_str));

        if !is_allowed_transition(current.as_deref(), Some(&target)) {
            warn!(
                context,
                key,
                current = current.as_deref().unwrap_or(""),
                target = target.as_str(),
                request_id,
                "status_transition_blocked"
            );
            return Ok(GuardedWrite {
                ok: false,
                from: current,
                to: Some(target),
            });
        }

        self.write(&key, &mapping).await?;
        Ok(GuardedWrite {
            ok: true,
            from: current,
            to: Some(target),
        })
    }

    async fn write(&self, key: &str, mapping: &[(String, String)]) -> KvResult<()> {
        run_with_retry("hash_set", key, self.retry, KvError::is_retryable, || {
            self.kv.hash_set(key, mapping)
        })
        .await?;
        // TTL refresh is best-effort; a record that outlives it only costs
        // storage.
        if let Err(err) = self
            .kv
            .expire(key, Duration::from_secs(JOB_STATUS_TTL_SECS))
            .await
        {
            warn!(key, error = %err, "status_ttl_refresh_failed");
        }
        Ok(())
    }
}
