//! Status contract shared with the submission service and the control plane.
//!
//! The string values are wire-stable: they appear verbatim in the status
//! record, the dead-letter payload, and operator tooling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version string stamped on every status write that also writes `status`.
pub const CONTRACT_VERSION: &str = "v1";

/// Key prefix for per-job status hashes in the KV store.
pub const JOB_STATUS_KEY_PREFIX: &str = "job_status:";

/// Time-to-live applied to a status record after each write.
pub const JOB_STATUS_TTL_SECS: u64 = 24 * 3600;

/// Lifecycle states a job can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted by the submission service, waiting for a worker.
    Queued,
    /// Owned by a worker and actively executing.
    Processing,
    /// Finished successfully; output persisted.
    Completed,
    /// Exhausted its retry budget; a dead-letter entry exists.
    Failed,
    /// Stopped at an operator's request.
    Cancelled,
    /// Parked by the approval plane pending human review.
    WaitingApproval,
    /// Released by the approval plane.
    Approved,
}

impl JobStatus {
    /// Wire representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::WaitingApproval => "WAITING_APPROVAL",
            Self::Approved => "APPROVED",
        }
    }

    /// Whether the status permits no further transitions besides itself.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is not part of the contract.
#[derive(Debug, Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "QUEUED" => Ok(Self::Queued),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            "WAITING_APPROVAL" => Ok(Self::WaitingApproval),
            "APPROVED" => Ok(Self::Approved),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Build the status-record key for a job.
#[must_use]
pub fn job_status_key(job_id: &str) -> String {
    format!("{JOB_STATUS_KEY_PREFIX}{job_id}")
}
