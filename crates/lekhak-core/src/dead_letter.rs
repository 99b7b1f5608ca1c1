//! Dead-letter record construction.
//!
//! The record schema is versioned and append-only: operators replay or
//! inspect entries long after the worker that produced them is gone, so
//! every field is derived defensively from whatever the payload carried.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::JobDescriptor;

/// Schema version stamped on every entry.
pub const DEAD_LETTER_SCHEMA_VERSION: &str = "v1";

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".m4a", ".aac", ".flac", ".ogg", ".wma"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".webm", ".m4v"];
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".tif", ".tiff"];

/// Coarse input classification recorded for triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputType {
    /// A PDF document.
    Pdf,
    /// A single raster image.
    Image,
    /// An audio file.
    Audio,
    /// A video file.
    Video,
    /// Could not be derived from the payload.
    Unknown,
}

/// Coarse folding of the error code for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// Bad or missing input.
    Validation,
    /// Model or media failure.
    Model,
    /// Infrastructure or internal failure.
    System,
    /// Local I/O failure.
    Io,
}

/// Schema-stable failure record pushed onto the dead-letter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Always [`DEAD_LETTER_SCHEMA_VERSION`].
    pub schema_version: String,
    /// ISO-8601 UTC timestamp of the failure.
    pub failed_at: String,
    /// Always "FAILED".
    pub status: String,
    /// Job correlation id.
    pub job_id: String,
    /// Upstream correlation id, empty when absent.
    pub request_id: String,
    /// Declared job type, empty when absent.
    pub job_type: String,
    /// Coarse input classification.
    pub input_type: InputType,
    /// Queue the job was popped from.
    pub queue_name: String,
    /// Dead-letter list the entry was pushed onto.
    pub dlq_name: String,
    /// Source label of the queue (e.g. `local`, `cloud`).
    pub queue_source: String,
    /// Human description of the stage that failed.
    pub failed_stage: String,
    /// Stable taxonomy code.
    pub error_code: String,
    /// Coarse folding of the code.
    pub error_type: ErrorType,
    /// User-facing message.
    pub error: String,
    /// Variant name plus message for diagnostics.
    pub error_detail: String,
    /// Executions so far, floored at 1.
    pub attempts: u32,
    /// Retry ceiling, floored at 1.
    pub max_attempts: u32,
    /// Identity of the worker that gave up.
    pub worker_id: String,
    /// Echo of the job payload.
    pub payload: Value,
}

/// Inputs to [`build_dead_letter_entry`].
#[derive(Debug, Clone, Copy)]
pub struct DeadLetterInput<'a> {
    /// The failed job.
    pub job: &'a JobDescriptor,
    /// Queue the job was popped from.
    pub queue_name: &'a str,
    /// Dead-letter list for this source.
    pub dlq_name: &'a str,
    /// Source label of the queue.
    pub queue_source: &'a str,
    /// Human description of the failing stage; empty uses a default.
    pub failed_stage: &'a str,
    /// Stable taxonomy code.
    pub error_code: &'a str,
    /// User-facing message.
    pub error_message: &'a str,
    /// Variant name plus message for diagnostics.
    pub error_detail: &'a str,
    /// Identity of the reporting worker.
    pub worker_id: &'a str,
    /// Fallback retry ceiling when the payload carries none.
    pub default_max_attempts: u32,
}

fn ends_with_any(name: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| name.ends_with(ext))
}

/// Derive the input type from the filename, falling back to the source hint.
#[must_use]
pub fn input_type_for(job: &JobDescriptor) -> InputType {
    let filename = job.filename.as_deref().unwrap_or("").trim().to_lowercase();
    if filename.ends_with(".pdf") {
        return InputType::Pdf;
    }
    if ends_with_any(&filename, IMAGE_EXTENSIONS) {
        return InputType::Image;
    }
    if ends_with_any(&filename, AUDIO_EXTENSIONS) {
        return InputType::Audio;
    }
    if ends_with_any(&filename, VIDEO_EXTENSIONS) {
        return InputType::Video;
    }

    match job.source.as_deref().unwrap_or("").trim().to_lowercase().as_str() {
        "ocr" => InputType::Pdf,
        "transcription" | "av" | "audio" | "video" => InputType::Audio,
        _ => InputType::Unknown,
    }
}

/// Fold an error code into its coarse type by prefix.
#[must_use]
pub fn error_type_for(error_code: &str) -> ErrorType {
    let code = error_code.trim().to_uppercase();
    if code.starts_with("INPUT_") || code.starts_with("VALIDATION_") {
        ErrorType::Validation
    } else if code.starts_with("MEDIA_") || code.starts_with("MODEL_") {
        ErrorType::Model
    } else if code.starts_with("IO_") {
        ErrorType::Io
    } else {
        // INFRA_, PROCESSING_, RATE_, and anything unrecognized.
        ErrorType::System
    }
}

/// Produce the schema-stable failure record for one exhausted job.
#[must_use]
pub fn build_dead_letter_entry(input: DeadLetterInput<'_>) -> DeadLetterEntry {
    let job = input.job;
    let failed_stage = if input.failed_stage.trim().is_empty() {
        "Processing failed"
    } else {
        input.failed_stage
    };

    DeadLetterEntry {
        schema_version: DEAD_LETTER_SCHEMA_VERSION.to_string(),
        failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        status: "FAILED".to_string(),
        job_id: job.job_id.clone(),
        request_id: job.request_id.clone().unwrap_or_default(),
        job_type: job.declared_type().unwrap_or_default().to_string(),
        input_type: input_type_for(job),
        queue_name: input.queue_name.to_string(),
        dlq_name: input.dlq_name.to_string(),
        queue_source: input.queue_source.to_string(),
        failed_stage: failed_stage.to_string(),
        error_code: input.error_code.to_string(),
        error_type: error_type_for(input.error_code),
        error: input.error_message.to_string(),
        error_detail: input.error_detail.to_string(),
        attempts: job.attempts.max(1),
        max_attempts: job.max_attempts.unwrap_or(input.default_max_attempts).max(1),
        worker_id: input.worker_id.to_string(),
        payload: job.payload_echo(),
    }
}
