//! Worker-loop tests against the in-memory KV store and scripted
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use lekhak_core::recovery::RetryBudgets;
use lekhak_kv::{KvStore, RetryPolicy};
use lekhak_pipelines::deps::PipelineDeps;
use lekhak_pipelines::ocr::{OcrConfig, OcrPipeline};
use lekhak_pipelines::status::StatusStore;
use lekhak_pipelines::transcribe::{TranscriptionConfig, TranscriptionPipeline};
use lekhak_telemetry::WorkerMetrics;
use lekhak_test_support::{
    MemoryBlobStore, MemoryKvStore, ScriptedOcrModel, ScriptedTranscriptionModel, SyntheticDecoder,
    ocr_job, transcription_job,
};
use lekhak_worker::config::QueueMode;
use lekhak_worker::queues::QueuePlan;
use lekhak_worker::runner::{StepOutcome, Worker, WorkerOptions};

const QUEUE: &str = "jobs";
const DLQ: &str = "jobs:dlq";

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        name: "test",
        max_retries: 0,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter_ratio: 0.0,
    }
}

struct Harness {
    kv: Arc<MemoryKvStore>,
    blob: Arc<MemoryBlobStore>,
    ocr_model: Arc<ScriptedOcrModel>,
    metrics: WorkerMetrics,
    worker: Worker,
}

fn harness(budgets: RetryBudgets) -> Harness {
    harness_with_options(budgets, 1, 1)
}

fn harness_with_options(budgets: RetryBudgets, inflight_ocr: u32, inflight_tr: u32) -> Harness {
    let kv = Arc::new(MemoryKvStore::new());
    let blob = Arc::new(MemoryBlobStore::new());
    let ocr_model = Arc::new(ScriptedOcrModel::with_default("Recognized page text 123."));
    let tr_model = Arc::new(ScriptedTranscriptionModel::with_default(
        "कार्यशाला की पूरी चर्चा यहां है और उसमें कई अलग शब्द हैं।",
    ));

    let kv_dyn: Arc<dyn KvStore> = kv.clone();
    let status = StatusStore::new(kv_dyn.clone(), fast_retry());
    let deps = PipelineDeps {
        kv: kv_dyn.clone(),
        status: status.clone(),
        blob: blob.clone(),
        decoder: Arc::new(SyntheticDecoder::new(2, 2)),
        kv_retry: fast_retry(),
        blob_retry: fast_retry(),
    };

    let ocr = OcrPipeline::new(deps.clone(), ocr_model.clone(), OcrConfig::default());
    let transcription =
        TranscriptionPipeline::new(deps, tr_model, TranscriptionConfig::default());

    let metrics = WorkerMetrics::new().unwrap();
    let plan = QueuePlan::from_mode(&QueueMode::Single {
        queue: QUEUE.to_string(),
        dlq: DLQ.to_string(),
    });
    let options = WorkerOptions {
        budgets,
        brpop_timeout: Duration::from_millis(40),
        max_idle_before_reconnect: Duration::from_secs(3600),
        kv_retry: fast_retry(),
        max_inflight_ocr: inflight_ocr,
        max_inflight_transcription: inflight_tr,
        worker_id: "test-worker".to_string(),
        admission_backoff: Duration::from_millis(1),
        pop_error_backoff: Duration::from_millis(1),
    };
    let worker = Worker::new(
        kv_dyn,
        status,
        ocr,
        transcription,
        metrics.clone(),
        plan,
        options,
    );

    Harness {
        kv,
        blob,
        ocr_model,
        metrics,
        worker,
    }
}

#[tokio::test]
async fn completes_an_ocr_job_end_to_end() {
    let mut h = harness(RetryBudgets::default());
    h.blob.seed("gs://in/scan.pdf", "pdf-bytes");
    h.kv.seed_queue(QUEUE, &ocr_job("j1", "gs://in/scan.pdf").build());

    assert_eq!(h.worker.step().await, StepOutcome::Completed);

    let record = h.kv.hash_snapshot("job_status:j1");
    assert_eq!(record.get("status").map(String::as_str), Some("COMPLETED"));
    assert_eq!(record.get("progress").map(String::as_str), Some("100"));
    assert!(record.contains_key("duration_sec"));
    assert_eq!(record.get("error_code").map(String::as_str), Some(""));

    // In-flight admission released.
    assert!(h.kv.set_snapshot("worker:inflight:OCR").is_empty());
    // Output uploaded under the job scope.
    assert!(h.blob.object("jobs/j1/scan.txt").is_some());

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.jobs_received_total, 1);
    assert_eq!(snapshot.jobs_completed_total, 1);
    assert_eq!(snapshot.jobs_failed_total, 0);
}

#[tokio::test]
async fn completes_a_transcription_job_end_to_end() {
    let mut h = harness(RetryBudgets::default());
    h.blob.seed("gs://in/talk.mp3", "audio-bytes");
    h.kv.seed_queue(QUEUE, &transcription_job("t1", "gs://in/talk.mp3").build());

    assert_eq!(h.worker.step().await, StepOutcome::Completed);

    let record = h.kv.hash_snapshot("job_status:t1");
    assert_eq!(record.get("status").map(String::as_str), Some("COMPLETED"));
    assert!(h.kv.set_snapshot("worker:inflight:TRANSCRIPTION").is_empty());
}

#[tokio::test]
async fn empty_queue_times_out_idle() {
    let mut h = harness(RetryBudgets::default());
    assert_eq!(h.worker.step().await, StepOutcome::Empty);
}

#[tokio::test]
async fn pop_failures_trigger_reconnect() {
    let mut h = harness(RetryBudgets::default());
    h.kv.fail_next_pops(1);
    assert_eq!(h.worker.step().await, StepOutcome::PopError);
    assert!(h.kv.reconnect_count() >= 1);
}

#[tokio::test]
async fn admission_over_limit_requeues_the_job() {
    let mut h = harness(RetryBudgets::default());
    h.blob.seed("gs://in/scan.pdf", "pdf-bytes");
    // Another worker owns the only OCR slot.
    let kv_dyn: Arc<dyn KvStore> = h.kv.clone();
    kv_dyn.set_add("worker:inflight:OCR", "other-job").await.unwrap();

    let payload = ocr_job("j2", "gs://in/scan.pdf").build();
    h.kv.seed_queue(QUEUE, &payload);

    assert_eq!(h.worker.step().await, StepOutcome::ThrottledRequeue);
    assert_eq!(h.kv.queue_snapshot(QUEUE), vec![payload]);
    // The throttled job was never admitted.
    assert!(!h.kv.set_snapshot("worker:inflight:OCR").contains("j2"));
}

#[tokio::test]
async fn zero_limit_always_requeues() {
    let mut h = harness_with_options(RetryBudgets::default(), 0, 1);
    h.kv.seed_queue(QUEUE, &ocr_job("j3", "gs://in/scan.pdf").build());
    assert_eq!(h.worker.step().await, StepOutcome::ThrottledRequeue);
    assert_eq!(h.kv.queue_snapshot(QUEUE).len(), 1);
}

#[tokio::test]
async fn cancelled_before_dispatch_never_runs_the_pipeline() {
    let mut h = harness(RetryBudgets::default());
    h.kv.seed_hash_field("job_status:j4", "cancel_requested", "1");
    h.kv.seed_queue(QUEUE, &ocr_job("j4", "gs://in/scan.pdf").build());

    assert_eq!(h.worker.step().await, StepOutcome::Cancelled);

    let record = h.kv.hash_snapshot("job_status:j4");
    assert_eq!(record.get("status").map(String::as_str), Some("CANCELLED"));
    // The model was never invoked.
    assert!(h.ocr_model.prompts().is_empty());
    assert_eq!(h.metrics.snapshot().jobs_cancelled_total, 1);
}

#[tokio::test]
async fn transient_failure_requeues_with_attempt_bookkeeping() {
    let mut h = harness(RetryBudgets {
        transient: 2,
        media: 0,
        default: 0,
    });
    h.blob.seed("gs://in/scan.pdf", "pdf-bytes");
    h.ocr_model
        .push_response(Err(anyhow!("429 Resource exhausted: quota")));
    h.kv.seed_queue(QUEUE, &ocr_job("j5", "gs://in/scan.pdf").build());

    assert_eq!(h.worker.step().await, StepOutcome::Retried);

    let record = h.kv.hash_snapshot("job_status:j5");
    assert_eq!(record.get("status").map(String::as_str), Some("QUEUED"));
    assert_eq!(
        record.get("stage").map(String::as_str),
        Some("Retry scheduled (1/2)")
    );
    assert_eq!(
        record.get("error_code").map(String::as_str),
        Some("RATE_LIMIT_EXCEEDED")
    );

    let requeued = h.kv.queue_snapshot(QUEUE);
    assert_eq!(requeued.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&requeued[0]).unwrap();
    assert_eq!(payload.get("attempts").and_then(serde_json::Value::as_u64), Some(1));
    assert_eq!(
        payload.get("max_attempts").and_then(serde_json::Value::as_u64),
        Some(2)
    );
    assert!(h.kv.queue_snapshot(DLQ).is_empty());
    assert_eq!(h.metrics.snapshot().jobs_failed_total, 0);
}

#[tokio::test]
async fn exhausted_budget_dead_letters_the_job() {
    let mut h = harness(RetryBudgets {
        transient: 2,
        media: 0,
        default: 0,
    });
    h.blob.seed("gs://in/scan.pdf", "pdf-bytes");
    h.ocr_model.push_response(Err(anyhow!("some unknown failure")));
    h.kv.seed_queue(
        QUEUE,
        &ocr_job("j6", "gs://in/scan.pdf").field("request_id", "r6").build(),
    );

    assert_eq!(h.worker.step().await, StepOutcome::DeadLettered);

    let record = h.kv.hash_snapshot("job_status:j6");
    assert_eq!(record.get("status").map(String::as_str), Some("FAILED"));
    assert_eq!(
        record.get("error_code").map(String::as_str),
        Some("PROCESSING_FAILED")
    );
    assert_eq!(
        record.get("error").map(String::as_str),
        Some("Processing failed due to an internal error.")
    );
    assert!(
        record
            .get("error_detail")
            .is_some_and(|d| d.contains("some unknown failure"))
    );

    let dlq = h.kv.queue_snapshot(DLQ);
    assert_eq!(dlq.len(), 1);
    let entry: serde_json::Value = serde_json::from_str(&dlq[0]).unwrap();
    assert_eq!(entry.get("schema_version").and_then(serde_json::Value::as_str), Some("v1"));
    assert_eq!(entry.get("job_id").and_then(serde_json::Value::as_str), Some("j6"));
    assert_eq!(entry.get("request_id").and_then(serde_json::Value::as_str), Some("r6"));
    assert_eq!(entry.get("input_type").and_then(serde_json::Value::as_str), Some("PDF"));
    assert_eq!(entry.get("error_type").and_then(serde_json::Value::as_str), Some("SYSTEM"));
    assert_eq!(entry.get("queue_source").and_then(serde_json::Value::as_str), Some("default"));
    assert_eq!(entry.get("worker_id").and_then(serde_json::Value::as_str), Some("test-worker"));
    assert_eq!(entry.get("attempts").and_then(serde_json::Value::as_u64), Some(1));
    assert_eq!(
        entry
            .pointer("/payload/job_id")
            .and_then(serde_json::Value::as_str),
        Some("j6")
    );

    assert_eq!(h.metrics.snapshot().jobs_failed_total, 1);
    assert!(h.kv.set_snapshot("worker:inflight:OCR").is_empty());
}

#[tokio::test]
async fn second_failure_of_a_retried_job_exhausts_a_budget_of_one() {
    let mut h = harness(RetryBudgets {
        transient: 1,
        media: 0,
        default: 0,
    });
    h.blob.seed("gs://in/scan.pdf", "pdf-bytes");
    h.ocr_model
        .push_response(Err(anyhow!("redis timeout while reading")));
    h.kv.seed_queue(QUEUE, &ocr_job("j7", "gs://in/scan.pdf").build());

    // First delivery: attempts 0 < budget 1, so the job is requeued.
    assert_eq!(h.worker.step().await, StepOutcome::Retried);

    // Second delivery carries attempts=1 and the budget is spent.
    h.ocr_model
        .push_response(Err(anyhow!("redis timeout while reading")));
    assert_eq!(h.worker.step().await, StepOutcome::DeadLettered);

    let dlq = h.kv.queue_snapshot(DLQ);
    assert_eq!(dlq.len(), 1);
    let entry: serde_json::Value = serde_json::from_str(&dlq[0]).unwrap();
    assert_eq!(entry.get("error_code").and_then(serde_json::Value::as_str), Some("INFRA_REDIS"));
    assert_eq!(entry.get("attempts").and_then(serde_json::Value::as_u64), Some(1));
    assert_eq!(entry.get("max_attempts").and_then(serde_json::Value::as_u64), Some(1));
}

#[tokio::test]
async fn undecodable_payload_is_rejected_to_the_dlq() {
    let mut h = harness(RetryBudgets::default());
    h.kv.seed_queue(QUEUE, "{not json");

    assert_eq!(h.worker.step().await, StepOutcome::Rejected);

    let dlq = h.kv.queue_snapshot(DLQ);
    assert_eq!(dlq.len(), 1);
    let entry: serde_json::Value = serde_json::from_str(&dlq[0]).unwrap();
    assert_eq!(
        entry.get("error_code").and_then(serde_json::Value::as_str),
        Some("PROCESSING_FAILED")
    );
    assert_eq!(
        entry
            .pointer("/payload/raw_payload")
            .and_then(serde_json::Value::as_str),
        Some("{not json")
    );
}

#[tokio::test]
async fn payload_without_job_id_is_rejected() {
    let mut h = harness(RetryBudgets::default());
    h.kv.seed_queue(QUEUE, r#"{"job_id":"  ","filename":"x.pdf"}"#);
    assert_eq!(h.worker.step().await, StepOutcome::Rejected);
    assert_eq!(h.kv.queue_snapshot(DLQ).len(), 1);
}

#[tokio::test]
async fn completed_jobs_stay_completed_when_redelivered() {
    let mut h = harness(RetryBudgets::default());
    h.blob.seed("gs://in/scan.pdf", "pdf-bytes");
    let payload = ocr_job("j8", "gs://in/scan.pdf").build();
    h.kv.seed_queue(QUEUE, &payload);
    assert_eq!(h.worker.step().await, StepOutcome::Completed);

    // An at-least-once duplicate delivery cannot resurrect the job: the
    // PROCESSING transition is blocked by terminal stickiness.
    h.kv.seed_queue(QUEUE, &payload);
    assert_eq!(h.worker.step().await, StepOutcome::DeadLettered);
    let record = h.kv.hash_snapshot("job_status:j8");
    assert_eq!(record.get("status").map(String::as_str), Some("COMPLETED"));
}
