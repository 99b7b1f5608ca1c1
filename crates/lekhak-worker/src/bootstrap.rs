//! Process wiring: configuration, logging, prompt resolution, KV
//! connection, pipeline assembly, and the shutdown-aware main loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use lekhak_kv::{KvStore, RedisKvStore};
use lekhak_pipelines::deps::PipelineDeps;
use lekhak_pipelines::ocr::{OcrConfig, OcrPipeline};
use lekhak_pipelines::prompts::PromptLibrary;
use lekhak_pipelines::status::StatusStore;
use lekhak_pipelines::transcribe::{TranscriptionConfig, TranscriptionPipeline};
use lekhak_telemetry::{LogFormat, LoggingConfig, WorkerMetrics, init_logging};
use tracing::info;
use uuid::Uuid;

use crate::adapters::stub::{FsBlobStore, StubMediaDecoder, StubOcrModel, StubTranscriptionModel};
use crate::config::WorkerConfig;
use crate::queues::QueuePlan;
use crate::runner::{Worker, WorkerOptions};

const SERVICE_NAME: &str = "lekhak-worker";

/// Default transcription prompt section name.
const TRANSCRIPTION_PROMPT_NAME: &str = "TRANSCRIPTION";

/// Resolve configuration, wire the services, and run the worker until a
/// shutdown signal arrives.
///
/// # Errors
///
/// Returns an error when configuration, prompt loading, or the initial KV
/// connection fails.
pub async fn run_app() -> Result<()> {
    let config = WorkerConfig::from_env()?;
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: LogFormat::infer(),
        service: SERVICE_NAME,
    })?;

    let worker_id = format!(
        "{}-{}",
        std::env::var("HOSTNAME").unwrap_or_else(|_| SERVICE_NAME.to_string()),
        Uuid::new_v4().simple()
    );
    info!(
        worker_id = worker_id.as_str(),
        project = config.gcp_project_id.as_str(),
        bucket = config.gcs_bucket.as_str(),
        "startup_env_validated"
    );

    let prompts = PromptLibrary::load(&config.prompt_file)?;
    // One prompt serves every OCR content subtype until a second is defined.
    let ocr_prompt = prompts
        .resolve(&config.prompt_name)
        .with_context(|| format!("prompt '{}' not found in prompts file", config.prompt_name))?
        .to_string();
    let transcription_prompt = prompts
        .resolve(TRANSCRIPTION_PROMPT_NAME)
        .unwrap_or("Transcribe the audio verbatim.")
        .to_string();

    let kv: Arc<dyn KvStore> = Arc::new(
        RedisKvStore::connect(&config.redis_url)
            .await
            .context("failed to connect to the KV store")?,
    );
    kv.ping().await.context("KV store did not answer PING")?;

    let blob_root = std::path::PathBuf::from("./data/blobs").join(&config.gcs_bucket);
    let deps = PipelineDeps {
        kv: kv.clone(),
        status: StatusStore::new(kv.clone(), config.kv_retry),
        blob: Arc::new(FsBlobStore::new(blob_root)),
        decoder: Arc::new(StubMediaDecoder),
        kv_retry: config.kv_retry,
        blob_retry: config.blob_retry,
    };

    let ocr = OcrPipeline::new(
        deps.clone(),
        Arc::new(StubOcrModel),
        OcrConfig {
            dpi: config.ocr_dpi,
            page_batch_size: config.ocr_page_batch_size,
            page_retries: config.ocr_page_retries,
            allow_empty_page_fallback: config.ocr_allow_empty_page_fallback,
            prompt: ocr_prompt,
            weights: config.quality_weights,
            guards: config.quality_guards.clone(),
        },
    );
    let transcription = TranscriptionPipeline::new(
        deps.clone(),
        Arc::new(StubTranscriptionModel),
        TranscriptionConfig {
            chunk_duration: config.chunk_duration,
            prompt: transcription_prompt,
            low_threshold: 0.60,
        },
    );

    let metrics = WorkerMetrics::new()?;
    let plan = QueuePlan::from_mode(&config.queue_mode);
    let options = WorkerOptions {
        budgets: config.budgets,
        brpop_timeout: config.brpop_timeout,
        max_idle_before_reconnect: config.max_idle_before_reconnect,
        kv_retry: config.kv_retry,
        max_inflight_ocr: config.max_inflight_ocr,
        max_inflight_transcription: config.max_inflight_transcription,
        worker_id,
        ..WorkerOptions::default()
    };

    let mut worker = Worker::new(kv, deps.status.clone(), ocr, transcription, metrics, plan, options);

    tokio::select! {
        () = worker.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("shutdown_signal_received");
        }
    }
    Ok(())
}
