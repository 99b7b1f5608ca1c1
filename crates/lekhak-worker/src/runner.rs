//! The worker loop: blocking multi-queue pop, admission control, dispatch,
//! retry/requeue, dead-letter push, and per-job counters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use lekhak_core::dead_letter::{DeadLetterInput, build_dead_letter_entry};
use lekhak_core::job::JobDescriptor;
use lekhak_core::recovery::{RetryBudgets, decide, requeue_backoff};
use lekhak_core::router::{JobKind, route};
use lekhak_core::taxonomy::{ErrorCode, classify};
use lekhak_kv::{KvStore, RetryPolicy};
use lekhak_pipelines::error::JobError;
use lekhak_pipelines::ocr::OcrPipeline;
use lekhak_pipelines::status::StatusStore;
use lekhak_pipelines::transcribe::TranscriptionPipeline;
use lekhak_pipelines::is_cancelled;
use lekhak_telemetry::WorkerMetrics;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::queues::{QueueBinding, QueuePlan};

const CONTEXT: &str = "WORKER_LOOP";
const INFLIGHT_KEY_PREFIX: &str = "worker:inflight:";
const INFLIGHT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Loop tuning independent of queue topology.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Retry budgets consulted on failure.
    pub budgets: RetryBudgets,
    /// Blocking-pop timeout.
    pub brpop_timeout: Duration,
    /// Idle span after which the KV connection is rebuilt.
    pub max_idle_before_reconnect: Duration,
    /// Retry policy for short KV reads.
    pub kv_retry: RetryPolicy,
    /// Global in-flight cap for OCR jobs.
    pub max_inflight_ocr: u32,
    /// Global in-flight cap for transcription jobs.
    pub max_inflight_transcription: u32,
    /// Identity recorded in dead-letter entries.
    pub worker_id: String,
    /// Pause after an admission rejection before the next pop.
    pub admission_backoff: Duration,
    /// Pause after a pop failure before the next attempt.
    pub pop_error_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            budgets: RetryBudgets::default(),
            brpop_timeout: Duration::from_secs(10),
            max_idle_before_reconnect: Duration::from_secs(60),
            kv_retry: RetryPolicy::kv(),
            max_inflight_ocr: 1,
            max_inflight_transcription: 1,
            worker_id: "worker".to_string(),
            admission_backoff: Duration::from_millis(250),
            pop_error_backoff: Duration::from_secs(1),
        }
    }
}

/// What one loop iteration did; returned for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The pop timed out with no work.
    Empty,
    /// The pop failed; the connection was rebuilt.
    PopError,
    /// The payload could not be decoded and went to the dead-letter queue.
    Rejected,
    /// Admission was over the in-flight cap; the job was requeued.
    ThrottledRequeue,
    /// The job observed a cancellation request.
    Cancelled,
    /// The job completed.
    Completed,
    /// The job failed and was requeued with backoff.
    Retried,
    /// The job failed terminally and was dead-lettered.
    DeadLettered,
}

/// A single-threaded cooperative worker over a shared queue/KV store.
pub struct Worker {
    kv: Arc<dyn KvStore>,
    status: StatusStore,
    ocr: OcrPipeline,
    transcription: TranscriptionPipeline,
    metrics: WorkerMetrics,
    plan: QueuePlan,
    options: WorkerOptions,
    last_activity: Instant,
}

impl Worker {
    /// Assemble a worker from its collaborators.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KvStore>,
        status: StatusStore,
        ocr: OcrPipeline,
        transcription: TranscriptionPipeline,
        metrics: WorkerMetrics,
        plan: QueuePlan,
        options: WorkerOptions,
    ) -> Self {
        Self {
            kv,
            status,
            ocr,
            transcription,
            metrics,
            plan,
            options,
            last_activity: Instant::now(),
        }
    }

    /// Run the loop until the task is aborted.
    pub async fn run(&mut self) {
        info!(
            worker_id = self.options.worker_id.as_str(),
            queues = ?self.plan.pop_order(),
            "worker_started"
        );
        loop {
            let outcome = self.step().await;
            debug!(?outcome, "worker_step");
        }
    }

    /// Execute one iteration of the main loop.
    pub async fn step(&mut self) -> StepOutcome {
        if self.last_activity.elapsed() >= self.options.max_idle_before_reconnect {
            if let Err(err) = self.kv.reconnect().await {
                warn!(error = %err, "idle_reconnect_failed");
            }
            self.last_activity = Instant::now();
        }

        let popped = self
            .kv
            .blocking_pop(self.plan.pop_order(), self.options.brpop_timeout)
            .await;

        match popped {
            Err(err) => {
                warn!(error = %err, "queue_pop_failed");
                if let Err(err) = self.kv.reconnect().await {
                    warn!(error = %err, "pop_reconnect_failed");
                }
                sleep(self.options.pop_error_backoff).await;
                StepOutcome::PopError
            }
            Ok(None) => {
                debug!("queue_idle_heartbeat");
                sleep(Duration::from_millis(50)).await;
                StepOutcome::Empty
            }
            Ok(Some((queue, payload))) => {
                self.last_activity = Instant::now();
                self.handle_payload(&queue, &payload).await
            }
        }
    }

    async fn handle_payload(&self, queue: &str, payload: &str) -> StepOutcome {
        let binding = self.plan.binding_for(queue).clone();

        let job = match JobDescriptor::from_json(payload) {
            Ok(job) if !job.job_id.trim().is_empty() => job,
            Ok(_) => {
                return self
                    .reject_payload(queue, &binding, payload, "queue payload has no job_id")
                    .await;
            }
            Err(err) => {
                return self
                    .reject_payload(queue, &binding, payload, &err.to_string())
                    .await;
            }
        };

        let kind = route(&job);
        self.metrics.inc_received(queue, binding.source, kind.type_label());
        info!(
            job_id = job.job_id.as_str(),
            request_id = job.request_id_or_empty(),
            queue,
            source = binding.source,
            job_type = kind.type_label(),
            attempts = job.attempts,
            "job_received"
        );

        let inflight_key = format!("{INFLIGHT_KEY_PREFIX}{}", kind.type_label());
        if !self.try_admit(kind, &inflight_key, &job.job_id).await {
            if let Err(err) = self.kv.push_back(queue, payload).await {
                error!(job_id = job.job_id.as_str(), error = %err, "throttle_requeue_failed");
            }
            sleep(self.options.admission_backoff).await;
            return StepOutcome::ThrottledRequeue;
        }

        let outcome = self.execute(queue, &binding, &job, kind).await;
        self.release(&inflight_key, &job.job_id).await;
        outcome
    }

    /// Global admission against the per-type in-flight set.
    async fn try_admit(&self, kind: JobKind, inflight_key: &str, job_id: &str) -> bool {
        let limit = match kind {
            JobKind::Ocr => self.options.max_inflight_ocr,
            JobKind::Transcription => self.options.max_inflight_transcription,
        };
        if limit == 0 {
            debug!(job_id, job_type = kind.type_label(), "admission_disabled");
            return false;
        }

        match self.kv.set_len(inflight_key).await {
            Ok(inflight) if inflight >= u64::from(limit) => {
                debug!(
                    job_id,
                    inflight,
                    limit,
                    job_type = kind.type_label(),
                    "admission_over_limit"
                );
                false
            }
            Ok(_) => {
                if let Err(err) = self.kv.set_add(inflight_key, job_id).await {
                    warn!(job_id, error = %err, "admission_add_failed");
                    return false;
                }
                if let Err(err) = self.kv.expire(inflight_key, INFLIGHT_TTL).await {
                    warn!(job_id, error = %err, "admission_expire_failed");
                }
                true
            }
            Err(err) => {
                warn!(job_id, error = %err, "admission_check_failed");
                false
            }
        }
    }

    async fn release(&self, inflight_key: &str, job_id: &str) {
        if let Err(err) = self.kv.set_remove(inflight_key, job_id).await {
            warn!(job_id, error = %err, "inflight_release_failed");
        }
    }

    async fn execute(
        &self,
        queue: &str,
        binding: &QueueBinding,
        job: &JobDescriptor,
        kind: JobKind,
    ) -> StepOutcome {
        let job_id = job.job_id.as_str();
        let request_id = job.request_id_or_empty();

        // Jobs cancelled while queued never reach a pipeline.
        let record = self.status.read(job_id).await.unwrap_or_default();
        let cancel_requested = record.get("cancel_requested").is_some_and(|v| v == "1");
        let already_cancelled = record
            .get("status")
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("CANCELLED"));
        if cancel_requested || already_cancelled {
            return self.finish_cancelled(queue, binding, job, kind).await;
        }

        let processing = self
            .status
            .update(
                job_id,
                CONTEXT,
                request_id,
                &[
                    ("status", "PROCESSING".to_string()),
                    ("stage", "Starting".to_string()),
                    ("progress", "1".to_string()),
                ],
            )
            .await;
        match processing {
            Ok(write) if !write.ok => {
                let err = JobError::Other(anyhow!(
                    "status transition to PROCESSING blocked from {:?}",
                    write.from
                ));
                return self.handle_failure(queue, binding, job, kind, &err).await;
            }
            Err(err) => {
                let err = JobError::Kv(err);
                return self.handle_failure(queue, binding, job, kind, &err).await;
            }
            Ok(_) => {}
        }

        let started = Instant::now();
        let result = match kind {
            JobKind::Ocr => self.ocr.run(job_id, job).await.map(|_| ()),
            JobKind::Transcription => self.transcription.run(job_id, job, true).await.map(|_| ()),
        };
        self.metrics.observe_dispatch_latency(
            queue,
            binding.source,
            kind.type_label(),
            started.elapsed(),
        );

        match result {
            Ok(()) => {
                self.finish_completed(queue, binding, job, kind, started.elapsed())
                    .await;
                StepOutcome::Completed
            }
            Err(JobError::Cancelled { .. }) => {
                self.finish_cancelled(queue, binding, job, kind).await
            }
            Err(err) => self.handle_failure(queue, binding, job, kind, &err).await,
        }
    }

    async fn finish_completed(
        &self,
        queue: &str,
        binding: &QueueBinding,
        job: &JobDescriptor,
        kind: JobKind,
        duration: Duration,
    ) {
        let job_id = job.job_id.as_str();
        // The approval plane may have parked or cancelled the job while the
        // pipeline was finishing; those statuses win.
        let record = self.status.read(job_id).await.unwrap_or_default();
        let parked = record.get("status").is_some_and(|s| {
            let s = s.trim().to_uppercase();
            s == "WAITING_APPROVAL" || s == "APPROVED" || s == "CANCELLED"
        });
        if !parked {
            let write = self
                .status
                .update(
                    job_id,
                    CONTEXT,
                    job.request_id_or_empty(),
                    &[
                        ("status", "COMPLETED".to_string()),
                        ("stage", "Completed".to_string()),
                        ("progress", "100".to_string()),
                        ("duration_sec", duration.as_secs().to_string()),
                        ("error_code", String::new()),
                        ("error_message", String::new()),
                        ("error_detail", String::new()),
                        ("error", String::new()),
                    ],
                )
                .await;
            if let Err(err) = write {
                warn!(job_id, error = %err, "completed_write_failed");
            }
        }
        self.metrics
            .inc_completed(queue, binding.source, kind.type_label());
        info!(
            job_id,
            duration_sec = duration.as_secs(),
            job_type = kind.type_label(),
            "job_completed"
        );
    }

    async fn finish_cancelled(
        &self,
        queue: &str,
        binding: &QueueBinding,
        job: &JobDescriptor,
        kind: JobKind,
    ) -> StepOutcome {
        let job_id = job.job_id.as_str();
        let write = self
            .status
            .update(
                job_id,
                CONTEXT,
                job.request_id_or_empty(),
                &[
                    ("status", "CANCELLED".to_string()),
                    ("stage", "Cancelled by user".to_string()),
                ],
            )
            .await;
        if let Err(err) = write {
            warn!(job_id, error = %err, "cancelled_write_failed");
        }
        self.metrics
            .inc_cancelled(queue, binding.source, kind.type_label());
        info!(job_id, job_type = kind.type_label(), "job_cancelled");
        StepOutcome::Cancelled
    }

    async fn handle_failure(
        &self,
        queue: &str,
        binding: &QueueBinding,
        job: &JobDescriptor,
        kind: JobKind,
        err: &JobError,
    ) -> StepOutcome {
        let job_id = job.job_id.as_str();

        // A failure observed after a cancellation request is reported as a
        // cancellation, not an error.
        if is_cancelled(self.kv.as_ref(), job_id, self.options.kv_retry).await {
            return self.finish_cancelled(queue, binding, job, kind).await;
        }

        let (code, message) = classify(err.failure_kind(), &err.to_string());
        let detail = err.detail();
        let decision = decide(code, job.attempts, self.options.budgets);
        warn!(
            job_id,
            error_code = code.as_str(),
            reason = decision.reason.as_str(),
            action = decision.action.as_str(),
            attempts = job.attempts,
            max_attempts = decision.max_attempts,
            error = %err,
            "job_failed"
        );

        if decision.retry_allowed {
            self.requeue_with_backoff(queue, job, code, message, &decision)
                .await;
            StepOutcome::Retried
        } else {
            self.dead_letter(queue, binding, job, kind, code, message, &detail)
                .await;
            StepOutcome::DeadLettered
        }
    }

    async fn requeue_with_backoff(
        &self,
        queue: &str,
        job: &JobDescriptor,
        code: ErrorCode,
        message: &str,
        decision: &lekhak_core::recovery::RecoveryDecision,
    ) {
        let job_id = job.job_id.as_str();
        let write = self
            .status
            .update(
                job_id,
                CONTEXT,
                job.request_id_or_empty(),
                &[
                    ("status", "QUEUED".to_string()),
                    (
                        "stage",
                        format!(
                            "Retry scheduled ({}/{})",
                            decision.next_attempt, decision.max_attempts
                        ),
                    ),
                    ("progress", "0".to_string()),
                    ("error_code", code.as_str().to_string()),
                    ("error_message", message.to_string()),
                ],
            )
            .await;
        if let Err(err) = write {
            warn!(job_id, error = %err, "retry_status_write_failed");
        }

        let mut retry_job = job.clone();
        retry_job.attempts = decision.next_attempt;
        retry_job.max_attempts = Some(decision.max_attempts);

        sleep(requeue_backoff(decision.next_attempt)).await;

        match retry_job.to_json() {
            Ok(payload) => {
                if let Err(err) = self.kv.push_back(queue, &payload).await {
                    error!(job_id, error = %err, "retry_requeue_failed");
                }
            }
            Err(err) => error!(job_id, error = %err, "retry_serialize_failed"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dead_letter(
        &self,
        queue: &str,
        binding: &QueueBinding,
        job: &JobDescriptor,
        kind: JobKind,
        code: ErrorCode,
        message: &str,
        detail: &str,
    ) {
        let job_id = job.job_id.as_str();
        let prior = self.status.read(job_id).await.unwrap_or_default();
        let failed_stage = prior.get("stage").cloned().unwrap_or_default();

        let write = self
            .status
            .update(
                job_id,
                CONTEXT,
                job.request_id_or_empty(),
                &[
                    ("status", "FAILED".to_string()),
                    ("stage", "Failed".to_string()),
                    ("error_code", code.as_str().to_string()),
                    ("error_message", message.to_string()),
                    ("error_detail", detail.to_string()),
                    ("error", message.to_string()),
                ],
            )
            .await;
        if let Err(err) = write {
            warn!(job_id, error = %err, "failed_status_write_failed");
        }

        let entry = build_dead_letter_entry(DeadLetterInput {
            job,
            queue_name: queue,
            dlq_name: &binding.dlq,
            queue_source: binding.source,
            failed_stage: &failed_stage,
            error_code: code.as_str(),
            error_message: message,
            error_detail: detail,
            worker_id: &self.options.worker_id,
            default_max_attempts: decision_default_max(code, self.options.budgets),
        });
        match serde_json::to_string(&entry) {
            Ok(payload) => {
                if let Err(err) = self.kv.push_front(&binding.dlq, &payload).await {
                    error!(job_id, error = %err, "dead_letter_push_failed");
                }
            }
            Err(err) => error!(job_id, error = %err, "dead_letter_serialize_failed"),
        }

        self.metrics
            .inc_failed(queue, binding.source, kind.type_label());
    }

    /// Undecodable payloads go straight to the dead-letter queue.
    async fn reject_payload(
        &self,
        queue: &str,
        binding: &QueueBinding,
        payload: &str,
        reason: &str,
    ) -> StepOutcome {
        warn!(queue, reason, "queue_payload_rejected");
        self.metrics.inc_received(queue, binding.source, "UNKNOWN");

        let mut stub = JobDescriptor::new("");
        stub.extra.insert(
            "raw_payload".to_string(),
            serde_json::Value::String(payload.to_string()),
        );

        let code = ErrorCode::ProcessingFailed;
        let entry = build_dead_letter_entry(DeadLetterInput {
            job: &stub,
            queue_name: queue,
            dlq_name: &binding.dlq,
            queue_source: binding.source,
            failed_stage: "Queue payload decode",
            error_code: code.as_str(),
            error_message: code.user_message(),
            error_detail: &format!("Decode: {reason}"),
            worker_id: &self.options.worker_id,
            default_max_attempts: 1,
        });
        match serde_json::to_string(&entry) {
            Ok(body) => {
                if let Err(err) = self.kv.push_front(&binding.dlq, &body).await {
                    error!(queue, error = %err, "dead_letter_push_failed");
                }
            }
            Err(err) => error!(queue, error = %err, "dead_letter_serialize_failed"),
        }
        self.metrics.inc_failed(queue, binding.source, "UNKNOWN");
        StepOutcome::Rejected
    }
}

const fn decision_default_max(code: ErrorCode, budgets: RetryBudgets) -> u32 {
    let budget = match lekhak_core::recovery::classify_reason(code) {
        lekhak_core::recovery::RecoveryReason::TransientInfra => budgets.transient,
        lekhak_core::recovery::RecoveryReason::InputMedia => budgets.media,
        lekhak_core::recovery::RecoveryReason::UnknownOrFatal => budgets.default,
    };
    if budget == 0 { 1 } else { budget }
}
