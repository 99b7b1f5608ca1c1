//! The transcription pipeline: fixed-duration audio chunks, per-chunk
//! inference, segment scoring, and output assembly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use lekhak_core::job::JobDescriptor;
use lekhak_kv::run_with_retry;
use lekhak_quality::transcription::{SegmentRow, score_segment, summarize_segments};
use tracing::info;

use crate::cancel::ensure_not_cancelled;
use crate::deps::{PipelineDeps, TranscriptionModel};
use crate::error::{JobError, JobResult};
use crate::output::{join_parts, output_destination, output_text_filename, with_bom};

const CONTEXT: &str = "TRANSCRIBE_PIPELINE";

/// Floor for the configurable chunk duration.
pub const MIN_CHUNK_DURATION: Duration = Duration::from_secs(30);

/// Tuning knobs for the transcription pipeline.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Duration of each re-encoded audio chunk.
    pub chunk_duration: Duration,
    /// Resolved transcription prompt.
    pub prompt: String,
    /// Segments scoring below this are listed as low confidence.
    pub low_threshold: f64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(300),
            prompt: "Transcribe the audio verbatim.".to_string(),
            low_threshold: 0.60,
        }
    }
}

impl TranscriptionConfig {
    /// Clamp the chunk duration to the supported floor.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        if self.chunk_duration < MIN_CHUNK_DURATION {
            self.chunk_duration = MIN_CHUNK_DURATION;
        }
        self
    }
}

/// Result of a transcription run.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionOutcome {
    /// Blob URI of the uploaded transcript.
    pub output_path: String,
    /// Sanitized output filename.
    pub output_filename: String,
    /// Assembled transcript text (without the BOM).
    pub transcript: String,
    /// Transcript-level quality score.
    pub quality_score: f64,
    /// 1-based indices of low-confidence segments.
    pub low_segments: Vec<usize>,
    /// Up to ten per-segment hints.
    pub hints: Vec<String>,
    /// Number of chunks transcribed.
    pub chunks: usize,
}

/// Executes transcription jobs end to end.
pub struct TranscriptionPipeline {
    deps: PipelineDeps,
    model: Arc<dyn TranscriptionModel>,
    config: TranscriptionConfig,
}

impl TranscriptionPipeline {
    /// Assemble the pipeline from its collaborators.
    #[must_use]
    pub fn new(
        deps: PipelineDeps,
        model: Arc<dyn TranscriptionModel>,
        config: TranscriptionConfig,
    ) -> Self {
        Self {
            deps,
            model,
            config: config.clamped(),
        }
    }

    /// Run one transcription job.
    ///
    /// With `finalize` false the terminal COMPLETED write is skipped so an
    /// aggregating caller can combine several runs under one job id and
    /// emit a single terminal status itself.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Cancelled`] when a cancellation request is
    /// observed at a poll point, and the underlying failure otherwise.
    pub async fn run(
        &self,
        job_id: &str,
        job: &JobDescriptor,
        finalize: bool,
    ) -> JobResult<TranscriptionOutcome> {
        self.check_cancel(job_id).await?;
        let request_id = job.request_id_or_empty().to_string();

        let uri = job
            .input_gcs_uri
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| JobError::Other(anyhow!("transcription job has no input_gcs_uri")))?;

        let workdir = tempfile::tempdir()
            .map_err(|err| JobError::Other(anyhow!("failed to create scratch dir: {err}")))?;
        let input = run_with_retry(
            "download",
            uri,
            self.deps.blob_retry,
            |_| true,
            || self.deps.blob.download(uri, workdir.path()),
        )
        .await
        .map_err(JobError::Other)?;

        self.update_status(
            job_id,
            &request_id,
            &[
                ("status", "PROCESSING".to_string()),
                ("stage", "Preparing audio".to_string()),
                ("progress", "5".to_string()),
            ],
        )
        .await?;

        let chunks = self
            .deps
            .decoder
            .split_audio(&input, self.config.chunk_duration, workdir.path())
            .await
            .map_err(JobError::Other)?;
        if chunks.is_empty() {
            return Err(JobError::Other(anyhow!(
                "could not decode audio: no chunks produced"
            )));
        }

        let total = chunks.len();
        let mut parts: Vec<String> = Vec::with_capacity(total);
        let mut rows: Vec<SegmentRow> = Vec::with_capacity(total);

        for (offset, chunk) in chunks.iter().enumerate() {
            let idx = offset + 1;
            self.check_cancel(job_id).await?;
            self.update_status(
                job_id,
                &request_id,
                &[
                    ("stage", format!("Transcribing chunk {idx}/{total}")),
                    ("progress", (10 + 80 * idx / total).to_string()),
                ],
            )
            .await?;

            let text = self
                .model
                .transcribe_chunk(chunk, &self.config.prompt)
                .await
                .map_err(JobError::Other)?;
            if text.trim().is_empty() {
                return Err(JobError::Other(anyhow!("Empty transcription output")));
            }

            let (score, _metrics, hints) = score_segment(&text);
            rows.push(SegmentRow {
                segment_index: idx,
                score,
                hint: hints.join("; "),
            });
            parts.push(text);
        }

        self.check_cancel(job_id).await?;

        let transcript = join_parts(&parts);
        let output_filename = output_text_filename(
            job.output_filename.as_deref(),
            job.filename.as_deref(),
        );
        let destination = output_destination(job_id, &output_filename);
        let body = with_bom(&transcript);
        let output_path = run_with_retry(
            "upload_text",
            &destination,
            self.deps.blob_retry,
            |_| true,
            || self.deps.blob.upload_text(&destination, &body),
        )
        .await
        .map_err(JobError::Other)?;

        let (quality_score, low_segments, hints) =
            summarize_segments(&rows, self.config.low_threshold);

        if finalize {
            self.update_status(
                job_id,
                &request_id,
                &[
                    ("status", "COMPLETED".to_string()),
                    ("stage", "Completed".to_string()),
                    ("progress", "100".to_string()),
                    ("output_path", output_path.clone()),
                    ("output_filename", output_filename.clone()),
                    ("quality_hints", serde_json::json!(hints).to_string()),
                    ("error_code", String::new()),
                    ("error_message", String::new()),
                    ("error_detail", String::new()),
                    ("error", String::new()),
                ],
            )
            .await?;
        }

        info!(
            job_id,
            chunks = total,
            quality_score,
            finalize,
            output = output_path.as_str(),
            "transcription_completed"
        );

        Ok(TranscriptionOutcome {
            output_path,
            output_filename,
            transcript,
            quality_score,
            low_segments,
            hints,
            chunks: total,
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
