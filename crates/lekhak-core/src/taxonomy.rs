//! Failure classification.
//!
//! Maps a raised failure onto a closed set of stable error codes plus a
//! user-facing sentence. Matching works on the failure's display text and
//! its variant tag; the match order is fixed and the fallback makes the
//! classification total.

/// Stable error codes surfaced in status records and dead-letter entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Blob-store transport issue.
    InfraGcs,
    /// KV-store transport issue.
    InfraRedis,
    /// Model or service throttling.
    RateLimitExceeded,
    /// Input media unreadable.
    MediaDecodeFailed,
    /// Input file absent.
    InputNotFound,
    /// Unknown or internal failure.
    ProcessingFailed,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InfraGcs => "INFRA_GCS",
            Self::InfraRedis => "INFRA_REDIS",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::MediaDecodeFailed => "MEDIA_DECODE_FAILED",
            Self::InputNotFound => "INPUT_NOT_FOUND",
            Self::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    /// One stable human sentence shown to users for this code.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::InfraGcs => "Storage service connection issue while processing. Please retry.",
            Self::InfraRedis => "Queue/storage connection issue while processing.",
            Self::RateLimitExceeded => "Service is busy right now. Please retry shortly.",
            Self::MediaDecodeFailed => {
                "Input media could not be decoded. Please upload a supported file."
            }
            Self::InputNotFound => "Input file was not found for processing.",
            Self::ProcessingFailed => "Processing failed due to an internal error.",
        }
    }
}

/// Variant tag accompanying the failure text.
///
/// Rust failures carry their provenance in the type; the classifier only
/// needs to know about the two variants whose identity outranks the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The failure originated in the KV-store connection layer.
    KvConnection,
    /// The failure reported a missing input file.
    MissingInput,
    /// Anything else; classified purely from the text.
    Other,
}

const CONNECTION_MARKERS: &[&str] = &[
    "remote end closed",
    "connection aborted",
    "connection reset",
    "httpsconnectionpool",
    "sslerror",
];

const STORAGE_MARKERS: &[&str] = &[
    "storage.googleapis.com",
    "gcs",
    "blob",
    "signed_url",
    "upload",
    "download",
];

const RATE_MARKERS: &[&str] = &["resource exhausted", "429", "quota"];

const MEDIA_MARKERS: &[&str] = &["ffmpeg", "decoding failed", "could not decode"];

const KV_MARKERS: &[&str] = &["redis", "connection closed", "closed by server", "timeout"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a failure into `(code, user_message)`.
///
/// Match order is fixed: blob-store transport, throttling, media decode,
/// missing input, KV transport, then the fallback. The first match wins.
#[must_use]
pub fn classify(kind: FailureKind, text: &str) -> (ErrorCode, &'static str) {
    let low = text.trim().to_lowercase();

    let code = if contains_any(&low, CONNECTION_MARKERS) && contains_any(&low, STORAGE_MARKERS) {
        ErrorCode::InfraGcs
    } else if contains_any(&low, RATE_MARKERS) {
        ErrorCode::RateLimitExceeded
    } else if contains_any(&low, MEDIA_MARKERS) {
        ErrorCode::MediaDecodeFailed
    } else if kind == FailureKind::MissingInput || low.contains("no such file") {
        ErrorCode::InputNotFound
    } else if kind == FailureKind::KvConnection || contains_any(&low, KV_MARKERS) {
        ErrorCode::InfraRedis
    } else {
        ErrorCode::ProcessingFailed
    };

    (code, code.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcs_connection_error_maps_to_infra_gcs() {
        let (code, message) = classify(
            FailureKind::Other,
            "HTTPSConnectionPool host=storage.googleapis.com: Connection aborted",
        );
        assert_eq!(code, ErrorCode::InfraGcs);
        assert!(message.contains("Storage service"));
    }

    #[test]
    fn kv_variant_maps_to_infra_redis() {
        let (code, message) = classify(FailureKind::KvConnection, "Connection closed by server");
        assert_eq!(code, ErrorCode::InfraRedis);
        assert!(message.contains("Queue/storage"));
    }

    #[test]
    fn missing_file_maps_to_input_not_found() {
        let (code, _) = classify(FailureKind::MissingInput, "input.pdf does not exist");
        assert_eq!(code, ErrorCode::InputNotFound);

        let (code, _) = classify(FailureKind::Other, "No such file or directory");
        assert_eq!(code, ErrorCode::InputNotFound);
    }

    #[test]
    fn throttling_and_media_markers_match() {
        let (code, _) = classify(FailureKind::Other, "429 Resource exhausted: quota");
        assert_eq!(code, ErrorCode::RateLimitExceeded);

        let (code, _) = classify(FailureKind::Other, "ffmpeg exited with status 1");
        assert_eq!(code, ErrorCode::MediaDecodeFailed);
    }

    #[test]
    fn fallback_maps_to_processing_failed() {
        let (code, message) = classify(FailureKind::Other, "some unknown failure");
        assert_eq!(code, ErrorCode::ProcessingFailed);
        assert_eq!(message, "Processing failed due to an internal error.");
    }

    #[test]
    fn storage_match_requires_both_marker_groups() {
        // A bare connection reset without storage context is a KV issue, not
        // a blob-store one.
        let (code, _) = classify(FailureKind::Other, "connection reset by peer on redis socket");
        assert_eq!(code, ErrorCode::InfraRedis);
    }

    #[test]
    fn classification_is_stable_across_invocations() {
        let first = classify(FailureKind::Other, "quota exceeded");
        let second = classify(FailureKind::Other, "quota exceeded");
        assert_eq!(first, second);
    }
}
