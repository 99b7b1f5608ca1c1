//! Pipeline failure type.
//!
//! A closed set of variants so the worker loop can tell cancellation apart
//! from real failures at the top level, and so the taxonomy can see the
//! variant tags that outrank text matching.

use lekhak_core::taxonomy::FailureKind;
use lekhak_kv::KvError;
use thiserror::Error;

/// Failure raised by a pipeline run.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job observed a cancellation request at a poll point.
    #[error("job {job_id} cancelled by user")]
    Cancelled {
        /// The cancelled job.
        job_id: String,
    },
    /// A KV-store operation failed after its retries.
    #[error(transparent)]
    Kv(#[from] KvError),
    /// The input file is absent.
    #[error("no such file: {path}")]
    InputNotFound {
        /// Path or URI that could not be resolved.
        path: String,
    },
    /// Anything else, classified from its text.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Variant tag consumed by the error taxonomy.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Kv(err) if err.is_retryable() => FailureKind::KvConnection,
            Self::InputNotFound { .. } => FailureKind::MissingInput,
            _ => FailureKind::Other,
        }
    }

    /// Variant name plus message, recorded as `error_detail`.
    #[must_use]
    pub fn detail(&self) -> String {
        let variant = match self {
            Self::Cancelled { .. } => "Cancelled",
            Self::Kv(_) => "Kv",
            Self::InputNotFound { .. } => "InputNotFound",
            Self::Other(_) => "Internal",
        };
        format!("{variant}: {self}")
    }
}

/// Convenience alias for pipeline results.
pub type JobResult<T> = Result<T, JobError>;
