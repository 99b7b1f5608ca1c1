//! Retry/fail-fast decisions for failed jobs.
//!
//! The policy is deterministic: the error code selects a budget, and the
//! count of prior failures decides between a backoff requeue and the
//! dead-letter queue. The worker loop is the only consumer.

use std::time::Duration;

use crate::taxonomy::ErrorCode;

/// Coarse grouping of error codes for budget selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    /// Infrastructure hiccup expected to clear on its own.
    TransientInfra,
    /// The input itself is broken or missing.
    InputMedia,
    /// Unknown or fatal; retrying is unlikely to help.
    UnknownOrFatal,
}

impl RecoveryReason {
    /// Wire representation of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientInfra => "TRANSIENT_INFRA",
            Self::InputMedia => "INPUT_MEDIA",
            Self::UnknownOrFatal => "UNKNOWN_OR_FATAL",
        }
    }
}

/// What the worker loop should do with the failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Requeue onto the source queue after a bounded backoff.
    RetryWithBackoff,
    /// Mark FAILED and push a dead-letter entry.
    FailFastDlq,
}

impl RecoveryAction {
    /// Wire representation of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryWithBackoff => "retry_with_backoff",
            Self::FailFastDlq => "fail_fast_dlq",
        }
    }
}

/// Configured retry budgets per recovery reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudgets {
    /// Budget for [`RecoveryReason::TransientInfra`].
    pub transient: u32,
    /// Budget for [`RecoveryReason::InputMedia`].
    pub media: u32,
    /// Budget for [`RecoveryReason::UnknownOrFatal`].
    pub default: u32,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            transient: 2,
            media: 0,
            default: 0,
        }
    }
}

/// Outcome of consulting the policy for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryDecision {
    /// Retry or dead-letter.
    pub action: RecoveryAction,
    /// Budget group the error code fell into.
    pub reason: RecoveryReason,
    /// Attempt counter to stamp on the requeued job (unchanged when failing
    /// fast).
    pub next_attempt: u32,
    /// The budget that applied.
    pub max_attempts: u32,
    /// Whether the budget still had room.
    pub retry_allowed: bool,
}

/// Group an error code into its recovery reason.
#[must_use]
pub const fn classify_reason(code: ErrorCode) -> RecoveryReason {
    match code {
        ErrorCode::InfraRedis | ErrorCode::InfraGcs | ErrorCode::RateLimitExceeded => {
            RecoveryReason::TransientInfra
        }
        ErrorCode::MediaDecodeFailed | ErrorCode::InputNotFound => RecoveryReason::InputMedia,
        ErrorCode::ProcessingFailed => RecoveryReason::UnknownOrFatal,
    }
}

/// Decide between retry-with-backoff and fail-fast given the count of prior
/// failures.
#[must_use]
pub const fn decide(code: ErrorCode, attempts: u32, budgets: RetryBudgets) -> RecoveryDecision {
    let reason = classify_reason(code);
    let budget = match reason {
        RecoveryReason::TransientInfra => budgets.transient,
        RecoveryReason::InputMedia => budgets.media,
        RecoveryReason::UnknownOrFatal => budgets.default,
    };

    let retry_allowed = attempts < budget;
    let next_attempt = if retry_allowed { attempts + 1 } else { attempts };
    let action = if retry_allowed {
        RecoveryAction::RetryWithBackoff
    } else {
        RecoveryAction::FailFastDlq
    };

    RecoveryDecision {
        action,
        reason,
        next_attempt,
        max_attempts: budget,
        retry_allowed,
    }
}

/// Backoff before a requeued attempt: `min(5.0, 0.5 * 2^(next - 1))` seconds.
#[must_use]
pub fn requeue_backoff(next_attempt: u32) -> Duration {
    let exponent = next_attempt.saturating_sub(1).min(16);
    let delay = 0.5 * f64::from(1u32 << exponent);
    Duration::from_secs_f64(delay.min(5.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_error_retries() {
        let decision = decide(
            ErrorCode::InfraRedis,
            0,
            RetryBudgets {
                transient: 2,
                media: 0,
                default: 0,
            },
        );
        assert_eq!(decision.action, RecoveryAction::RetryWithBackoff);
        assert_eq!(decision.reason, RecoveryReason::TransientInfra);
        assert_eq!(decision.next_attempt, 1);
        assert_eq!(decision.max_attempts, 2);
        assert!(decision.retry_allowed);
    }

    #[test]
    fn default_error_fails_fast() {
        let decision = decide(
            ErrorCode::ProcessingFailed,
            0,
            RetryBudgets {
                transient: 1,
                media: 0,
                default: 0,
            },
        );
        assert_eq!(decision.action, RecoveryAction::FailFastDlq);
        assert_eq!(decision.reason, RecoveryReason::UnknownOrFatal);
        assert_eq!(decision.next_attempt, 0);
        assert!(!decision.retry_allowed);
    }

    #[test]
    fn media_reason_mapping() {
        assert_eq!(
            classify_reason(ErrorCode::MediaDecodeFailed),
            RecoveryReason::InputMedia
        );
        assert_eq!(
            classify_reason(ErrorCode::InputNotFound),
            RecoveryReason::InputMedia
        );
    }

    #[test]
    fn denial_is_monotone_in_attempts() {
        let budgets = RetryBudgets {
            transient: 3,
            media: 1,
            default: 0,
        };
        for code in [
            ErrorCode::InfraGcs,
            ErrorCode::MediaDecodeFailed,
            ErrorCode::ProcessingFailed,
        ] {
            let mut denied = false;
            for attempts in 0..8 {
                let decision = decide(code, attempts, budgets);
                if denied {
                    assert!(!decision.retry_allowed, "{code:?} attempts={attempts}");
                }
                denied = denied || !decision.retry_allowed;
            }
            assert!(denied);
        }
    }

    #[test]
    fn backoff_doubles_and_caps_at_five_seconds() {
        assert_eq!(requeue_backoff(1), Duration::from_secs_f64(0.5));
        assert_eq!(requeue_backoff(2), Duration::from_secs_f64(1.0));
        assert_eq!(requeue_backoff(3), Duration::from_secs_f64(2.0));
        assert_eq!(requeue_backoff(4), Duration::from_secs_f64(4.0));
        assert_eq!(requeue_backoff(5), Duration::from_secs_f64(5.0));
        assert_eq!(requeue_backoff(30), Duration::from_secs_f64(5.0));
    }
}
