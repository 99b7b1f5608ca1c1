//! Queue payload builders for tests.

use serde_json::{Map, Value, json};

/// Fluent builder over a raw queue payload.
#[derive(Debug, Clone)]
pub struct JobPayloadBuilder {
    fields: Map<String, Value>,
}

impl JobPayloadBuilder {
    /// Start a payload with the given job id.
    #[must_use]
    pub fn new(job_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("job_id".to_string(), json!(job_id));
        Self { fields }
    }

    /// Set an arbitrary field.
    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Render the JSON payload string.
    #[must_use]
    pub fn build(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// Payload for an OCR job over a blob-stored PDF.
#[must_use]
pub fn ocr_job(job_id: &str, uri: &str) -> JobPayloadBuilder {
    JobPayloadBuilder::new(job_id)
        .field("source", "ocr")
        .field("job_type", "OCR")
        .field("filename", "scan.pdf")
        .field("input_gcs_uri", uri)
}

/// Payload for a transcription job over a blob-stored recording.
#[must_use]
pub fn transcription_job(job_id: &str, uri: &str) -> JobPayloadBuilder {
    JobPayloadBuilder::new(job_id)
        .field("source", "transcription")
        .field("job_type", "TRANSCRIPTION")
        .field("filename", "talk.mp3")
        .field("input_gcs_uri", uri)
}
