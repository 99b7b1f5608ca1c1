//! Cooperative cancellation.
//!
//! Cancellation is polled, never preemptive: pipelines call
//! [`ensure_not_cancelled`] before each page, each chunk, and each
//! long-running infrastructure call. A transient KV failure during the
//! check must not cancel the job, so the read fails open to `false`.

use lekhak_core::contract::job_status_key;
use lekhak_kv::{KvStore, RetryPolicy, run_with_retry};
use tracing::warn;

use crate::error::{JobError, JobResult};

/// Whether the job's status record requests cancellation.
///
/// True iff `cancel_requested == "1"` or the status is already CANCELLED.
/// KV failures (after the KV retry policy) yield `false`.
pub async fn is_cancelled(kv: &dyn KvStore, job_id: &str, policy: RetryPolicy) -> bool {
    let key = job_status_key(job_id);
    let read = run_with_retry(
        "hash_get_all",
        &key,
        policy,
        lekhak_kv::KvError::is_retryable,
        || kv.hash_get_all(&key),
    )
    .await;

    match read {
        Ok(record) => {
            if record.is_empty() {
                return false;
            }
            let requested = record.get("cancel_requested").is_some_and(|v| v == "1");
            let cancelled = record
                .get("status")
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("CANCELLED"));
            requested || cancelled
        }
        Err(err) => {
            // Fail open: an unreachable KV store must not cancel work.
            warn!(job_id, error = %err, "cancel_check_failed");
            false
        }
    }
}

/// Raise the distinguished cancelled failure when a cancellation request is
/// observed.
///
/// # Errors
///
/// Returns [`JobError::Cancelled`] when the status record requests
/// cancellation.
pub async fn ensure_not_cancelled(
    kv: &dyn KvStore,
    job_id: &str,
    policy: RetryPolicy,
) -> JobResult<()> {
    if is_cancelled(kv, job_id, policy).await {
        return Err(JobError::Cancelled {
            job_id: job_id.to_string(),
        });
    }
    Ok(())
}
