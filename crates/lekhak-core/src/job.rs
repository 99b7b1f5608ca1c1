//! Queue-boundary schema for job descriptors.
//!
//! Payloads arrive as JSON produced by the submission service. `job_id` is
//! the only required field; everything else is optional with explicit
//! defaults, and unrecognized fields are preserved so the dead-letter record
//! can echo the payload verbatim. Numeric fields tolerate string-encoded
//! values since upstream producers are not consistent about types.

use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work as delivered on the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    /// Correlation id for all logs, metrics, and status records.
    pub job_id: String,
    /// Upstream correlation id, when the submission service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Origin hint (`ocr`, `transcription`, ...), used by the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Declared job type; `type` is accepted as a legacy alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    /// Legacy alias for [`Self::job_type`].
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_alias: Option<String>,
    /// Original upload filename, used for routing and output naming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Content hint used to select the model prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_subtype: Option<String>,
    /// Local filesystem path of the input, when already materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    /// Blob-store URI of the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_gcs_uri: Option<String>,
    /// Desired output name; derived from `filename` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    /// Count of prior failed executions; 0 on first delivery.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub attempts: u32,
    /// Retry ceiling recorded by a previous requeue, when present.
    #[serde(
        default,
        deserialize_with = "lenient_opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_attempts: Option<u32>,
    /// Fields this worker does not interpret, preserved for the payload echo.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobDescriptor {
    /// Minimal descriptor used by tests and requeue paths.
    #[must_use]
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            request_id: None,
            source: None,
            job_type: None,
            type_alias: None,
            filename: None,
            content_subtype: None,
            input_path: None,
            input_gcs_uri: None,
            output_filename: None,
            attempts: 0,
            max_attempts: None,
            extra: Map::new(),
        }
    }

    /// Parse a raw queue payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error for undecodable payloads; callers
    /// route those to the dead-letter queue.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Declared job type, honoring the legacy `type` alias.
    #[must_use]
    pub fn declared_type(&self) -> Option<&str> {
        self.job_type.as_deref().or(self.type_alias.as_deref())
    }

    /// Request id or an empty string for log fields.
    #[must_use]
    pub fn request_id_or_empty(&self) -> &str {
        self.request_id.as_deref().unwrap_or("")
    }

    /// Serialize the descriptor back to a queue payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, which only happens when the
    /// preserved extra fields contain non-serializable values.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Payload echo for the dead-letter record.
    #[must_use]
    pub fn payload_echo(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn coerce_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(0);
    }
    coerce_u32(&value).ok_or_else(|| DeError::custom(format!("invalid integer value {value}")))
}

fn lenient_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    coerce_u32(&value)
        .map(Some)
        .ok_or_else(|| DeError::custom(format!("invalid integer value {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_payload() {
        let job = JobDescriptor::from_json(r#"{"job_id":"j1"}"#).unwrap();
        assert_eq!(job.job_id, "j1");
        assert_eq!(job.attempts, 0);
        assert!(job.filename.is_none());
    }

    #[test]
    fn rejects_payload_without_job_id() {
        assert!(JobDescriptor::from_json(r#"{"filename":"a.pdf"}"#).is_err());
        assert!(JobDescriptor::from_json("not json").is_err());
    }

    #[test]
    fn honors_type_alias() {
        let job = JobDescriptor::from_json(r#"{"job_id":"j1","type":"OCR"}"#).unwrap();
        assert_eq!(job.declared_type(), Some("OCR"));

        let job =
            JobDescriptor::from_json(r#"{"job_id":"j1","job_type":"TRANSCRIPTION"}"#).unwrap();
        assert_eq!(job.declared_type(), Some("TRANSCRIPTION"));
    }

    #[test]
    fn attempts_accepts_string_encoding() {
        let job = JobDescriptor::from_json(r#"{"job_id":"j1","attempts":"3"}"#).unwrap();
        assert_eq!(job.attempts, 3);

        let job =
            JobDescriptor::from_json(r#"{"job_id":"j1","attempts":2,"max_attempts":"5"}"#).unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.max_attempts, Some(5));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = r#"{"job_id":"j1","video_url":"https://example.com/v"}"#;
        let job = JobDescriptor::from_json(raw).unwrap();
        assert_eq!(
            job.extra.get("video_url").and_then(Value::as_str),
            Some("https://example.com/v")
        );
        let echoed = job.payload_echo();
        assert_eq!(
            echoed.get("video_url").and_then(Value::as_str),
            Some("https://example.com/v")
        );
    }
}
