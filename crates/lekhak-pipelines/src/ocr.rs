//! The OCR pipeline: batched rasterization, per-page inference with empty
//! output retries, per-page quality scoring, and output assembly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use lekhak_core::job::JobDescriptor;
use lekhak_kv::run_with_retry;
use lekhak_quality::ocr::{GuardThresholds, OcrWeights, score_page};
use lekhak_quality::{PageImage, dedupe_hints, summarize_document_quality};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cancel::ensure_not_cancelled;
use crate::deps::{OcrModel, PipelineDeps};
use crate::error::{JobError, JobResult};
use crate::output::{join_parts, output_destination, output_text_filename, with_bom};
use crate::prompts::substitute_page_number;

const CONTEXT: &str = "OCR_PIPELINE";
const MAX_QUALITY_HINTS: usize = 10;

/// Tuning knobs for the OCR pipeline.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Rasterization resolution.
    pub dpi: u32,
    /// Pages rasterized per batch; 0 loads the whole document at once.
    pub page_batch_size: usize,
    /// Retries for empty per-page model output.
    pub page_retries: u32,
    /// Substitute an empty string when a page stays empty after retries.
    pub allow_empty_page_fallback: bool,
    /// Resolved OCR prompt with the page placeholder still in place.
    pub prompt: String,
    /// Quality score weights.
    pub weights: OcrWeights,
    /// Quality guard thresholds.
    pub guards: GuardThresholds,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            page_batch_size: 4,
            page_retries: 2,
            allow_empty_page_fallback: true,
            prompt: "Transcribe page {page}.".to_string(),
            weights: OcrWeights::default(),
            guards: GuardThresholds::default(),
        }
    }
}

/// Result of a completed OCR run.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    /// Blob URI of the uploaded transcript.
    pub output_path: String,
    /// Sanitized output filename.
    pub output_filename: String,
    /// Document-level quality score.
    pub quality_score: f64,
    /// 1-based indices of low-confidence pages.
    pub low_confidence_pages: Vec<usize>,
    /// Deduplicated quality hints, capped for the status record.
    pub hints: Vec<String>,
    /// Number of pages processed.
    pub pages: usize,
}

/// Executes OCR jobs end to end.
pub struct OcrPipeline {
    deps: PipelineDeps,
    model: Arc<dyn OcrModel>,
    config: OcrConfig,
}

impl OcrPipeline {
    /// Assemble the pipeline from its collaborators.
    #[must_use]
    pub fn new(deps: PipelineDeps, model: Arc<dyn OcrModel>, config: OcrConfig) -> Self {
        Self {
            deps,
            model,
            config,
        }
    }

    /// Run one OCR job to completion.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Cancelled`] when a cancellation request is
    /// observed at a poll point, and the underlying failure otherwise.
    pub async fn run(&self, job_id: &str, job: &JobDescriptor) -> JobResult<OcrOutcome> {
        self.check_cancel(job_id).await?;
        let request_id = job.request_id_or_empty().to_string();

        // Scratch space lives for the whole run so downloaded inputs stay
        // resolvable while batches stream through.
        let workdir = tempfile::tempdir()
            .map_err(|err| JobError::Other(anyhow!("failed to create scratch dir: {err}")))?;
        let input = self.resolve_input(job, workdir.path().to_path_buf()).await?;

        self.update_status(
            job_id,
            &request_id,
            &[
                ("status", "PROCESSING".to_string()),
                ("stage", "Loading PDF".to_string()),
                ("progress", "5".to_string()),
                ("eta_sec", "120".to_string()),
            ],
        )
        .await?;

        let total = self
            .deps
            .decoder
            .page_count(&input)
            .await
            .map_err(JobError::Other)?;
        if total == 0 {
            return Err(JobError::Other(anyhow!(
                "could not decode document: no pages found"
            )));
        }

        let batch_size = if self.config.page_batch_size == 0 {
            total
        } else {
            self.config.page_batch_size
        };

        let started = Instant::now();
        let mut page_texts: Vec<String> = Vec::with_capacity(total);
        let mut page_scores: Vec<f64> = Vec::with_capacity(total);
        let mut hints: Vec<String> = Vec::new();

        let mut start = 0usize;
        while start < total {
            let count = batch_size.min(total - start);
            let images = self
                .deps
                .decoder
                .rasterize_pages(&input, start, count, self.config.dpi)
                .await
                .map_err(JobError::Other)?;

            for (offset, image) in images.iter().enumerate() {
                let idx = start + offset + 1;
                self.process_page(
                    job_id,
                    &request_id,
                    idx,
                    total,
                    image,
                    started,
                    &mut page_texts,
                    &mut page_scores,
                    &mut hints,
                )
                .await?;
            }
            start += count;
        }

        self.check_cancel(job_id).await?;
        self.update_status(
            job_id,
            &request_id,
            &[
                ("stage", "Finalizing OCR".to_string()),
                ("progress", "95".to_string()),
            ],
        )
        .await?;

        let output_filename = output_text_filename(
            job.output_filename.as_deref(),
            job.filename.as_deref(),
        );
        let destination = output_destination(job_id, &output_filename);
        let body = with_bom(&join_parts(&page_texts));
        let output_path = run_with_retry(
            "upload_text",
            &destination,
            self.deps.blob_retry,
            |_| true,
            || self.deps.blob.upload_text(&destination, &body),
        )
        .await
        .map_err(JobError::Other)?;

        let (quality_score, low_confidence_pages) =
            summarize_document_quality(&page_scores, self.config.guards.low_threshold);
        let mut final_hints = dedupe_hints(hints);
        final_hints.truncate(MAX_QUALITY_HINTS);

        self.update_status(
            job_id,
            &request_id,
            &[
                ("status", "COMPLETED".to_string()),
                ("stage", "Completed".to_string()),
                ("progress", "100".to_string()),
                ("output_path", output_path.clone()),
                ("output_filename", output_filename.clone()),
                ("ocr_quality_score", quality_score.to_string()),
                (
                    "low_confidence_pages",
                    serde_json::json!(low_confidence_pages).to_string(),
                ),
                ("quality_hints", serde_json::json!(final_hints).to_string()),
                ("error_code", String::new()),
                ("error_message", String::new()),
                ("error_detail", String::new()),
                ("error", String::new()),
            ],
        )
        .await?;

        info!(
            job_id,
            pages = total,
            quality_score,
            output = output_path.as_str(),
            "ocr_completed"
        );

        Ok(OcrOutcome {
            output_path,
            output_filename,
            quality_score,
            low_confidence_pages,
            hints: final_hints,
            pages: total,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_page(
        &self,
        job_id: &str,
        request_id: &str,
        idx: usize,
        total: usize,
        image: &PageImage,
        started: Instant,
        page_texts: &mut Vec<String>,
        page_scores: &mut Vec<f64>,
        hints: &mut Vec<String>,
    ) -> JobResult<()> {
        self.check_cancel(job_id).await?;
        self.update_status(
            job_id,
            request_id,
            &[
                ("stage", format!("OCR page {idx}/{total}")),
                ("progress", (10 + 80 * idx / total).to_string()),
            ],
        )
        .await?;

        let prompt = substitute_page_number(&self.config.prompt, idx);
        let text = self.ocr_page_with_retries(job_id, idx, image, &prompt, hints).await?;

        let (score, metrics, page_hints) =
            score_page(&text, image, &self.config.weights, &self.config.guards);
        for hint in page_hints {
            hints.push(format!("Page {idx}: {hint}"));
        }

        let elapsed = started.elapsed().as_secs_f64();
        let eta = (elapsed / idx as f64 * (total - idx) as f64).round();
        self.update_status(
            job_id,
            request_id,
            &[
                ("current_page", idx.to_string()),
                ("total_pages", total.to_string()),
                ("eta_sec", format!("{eta:.0}")),
                ("ocr_page_score", score.to_string()),
                (
                    "ocr_page_metrics",
                    serde_json::to_value(metrics)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                ),
            ],
        )
        .await?;

        page_texts.push(text);
        page_scores.push(score);
        Ok(())
    }

    /// Invoke the model for one page, recovering locally from empty output.
    ///
    /// This is the only failure class a pipeline recovers from by itself;
    /// everything else propagates to the worker loop.
    async fn ocr_page_with_retries(
        &self,
        job_id: &str,
        idx: usize,
        image: &PageImage,
        prompt: &str,
        hints: &mut Vec<String>,
    ) -> JobResult<String> {
        let mut attempt = 0u32;
        loop {
            let text = self
                .model
                .ocr_page(image, prompt)
                .await
                .map_err(JobError::Other)?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
            if attempt >= self.config.page_retries {
                break;
            }
            attempt += 1;
            let delay = Duration::from_secs_f64((0.4 * f64::from(attempt)).min(1.5));
            warn!(
                job_id,
                page = idx,
                attempt,
                max_retries = self.config.page_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "ocr_empty_page_retry"
            );
            sleep(delay).await;
        }

        if self.config.allow_empty_page_fallback {
            warn!(job_id, page = idx, "ocr_empty_page_fallback");
            hints.push(format!("Page {idx}: OCR response was empty after retries"));
            return Ok(String::new());
        }
        Err(JobError::Other(anyhow!("Empty OCR output page {idx}")))
    }

    async fn resolve_input(&self, job: &JobDescriptor, workdir: PathBuf) -> JobResult<PathBuf> {
        if let Some(path) = job.input_path.as_deref().filter(|p| !p.trim().is_empty()) {
            let local = PathBuf::from(path);
            if !local.exists() {
                return Err(JobError::InputNotFound {
                    path: path.to_string(),
                });
            }
            return Ok(local);
        }

        if let Some(uri) = job
            .input_gcs_uri
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        {
            return run_with_retry(
                "download",
                uri,
                self.deps.blob_retry,
                |_| true,
                || self.deps.blob.download(uri, &workdir),
            )
            .await
            .map_err(JobError::Other);
        }

        Err(JobError::InputNotFound {
            path: "input_path/input_gcs_uri".to_string(),
        })
    }

    async fn check_cancel(&self, job_id: &str) -> JobResult<()> {
        ensure_not_cancelled(self.deps.kv.as_ref(), job_id, self.deps.kv_retry).await
    }

    async fn update_status(
        &self,
        job_id: &str,
        request_id: &str,
        fields: &[(&str, String)],
    ) -> JobResult<()> {
        self.deps
            .status
            .update(job_id, CONTEXT, request_id, fields)
            .await?;
        Ok(())
    }
}
