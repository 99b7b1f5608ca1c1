//! Status transition rules.
//!
//! The table below is the single authority over status mutations; the
//! guarded writer in `lekhak-pipelines` consults it before every write that
//! carries a `status` field. Terminal states only permit self-transitions,
//! which keeps a racing second writer from resurrecting a finished job.

use crate::contract::JobStatus;

const FROM_UNSET: &[JobStatus] = &[
    JobStatus::Queued,
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

const FROM_QUEUED: &[JobStatus] = FROM_UNSET;

const FROM_PROCESSING: &[JobStatus] = &[
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

/// Normalize a raw status value: trim, uppercase, and map empty to `None`.
#[must_use]
pub fn normalize(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase())
}

fn allowed_from(current: Option<&str>) -> &'static [JobStatus] {
    let Some(current) = current.and_then(|s| s.parse::<JobStatus>().ok()) else {
        // Unknown or absent current status behaves like an unset record.
        return FROM_UNSET;
    };
    match current {
        JobStatus::Queued => FROM_QUEUED,
        JobStatus::Processing => FROM_PROCESSING,
        JobStatus::Completed => &[JobStatus::Completed],
        JobStatus::Failed => &[JobStatus::Failed],
        JobStatus::Cancelled => &[JobStatus::Cancelled],
        JobStatus::WaitingApproval | JobStatus::Approved => FROM_UNSET,
    }
}

/// Whether a write moving the record from `current` to `target` is permitted.
///
/// An empty or absent target is always allowed: the write carries no status
/// mutation. Unknown current values are treated as unset.
#[must_use]
pub fn is_allowed_transition(current: Option<&str>, target: Option<&str>) -> bool {
    let Some(target) = normalize(target) else {
        return true;
    };
    let Ok(target) = target.parse::<JobStatus>() else {
        return false;
    };
    let current = normalize(current);
    allowed_from(current.as_deref()).contains(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_sticky() {
        assert!(is_allowed_transition(Some("COMPLETED"), Some("COMPLETED")));
        assert!(!is_allowed_transition(Some("COMPLETED"), Some("PROCESSING")));
        assert!(is_allowed_transition(Some("FAILED"), Some("FAILED")));
        assert!(!is_allowed_transition(Some("FAILED"), Some("COMPLETED")));
        assert!(is_allowed_transition(Some("CANCELLED"), Some("CANCELLED")));
        assert!(!is_allowed_transition(Some("CANCELLED"), Some("QUEUED")));
    }

    #[test]
    fn processing_can_transition_to_terminal() {
        assert!(is_allowed_transition(Some("PROCESSING"), Some("COMPLETED")));
        assert!(is_allowed_transition(Some("PROCESSING"), Some("FAILED")));
        assert!(is_allowed_transition(Some("PROCESSING"), Some("CANCELLED")));
        assert!(!is_allowed_transition(Some("PROCESSING"), Some("QUEUED")));
    }

    #[test]
    fn empty_target_is_allowed() {
        assert!(is_allowed_transition(Some("QUEUED"), Some("")));
        assert!(is_allowed_transition(None, None));
        assert!(is_allowed_transition(Some("COMPLETED"), Some("  ")));
    }

    #[test]
    fn unset_and_unknown_current_allow_all_core_targets() {
        for target in ["QUEUED", "PROCESSING", "COMPLETED", "FAILED", "CANCELLED"] {
            assert!(is_allowed_transition(None, Some(target)));
            assert!(is_allowed_transition(Some("BOGUS"), Some(target)));
        }
    }

    #[test]
    fn normalization_applies_to_both_sides() {
        assert!(is_allowed_transition(Some(" processing "), Some("completed")));
        assert!(!is_allowed_transition(Some("completed"), Some(" processing")));
    }

    #[test]
    fn unknown_target_is_blocked() {
        assert!(!is_allowed_transition(Some("QUEUED"), Some("RUNNING")));
    }

    #[test]
    fn every_guarded_path_stays_inside_the_table() {
        // Walk a representative status sequence and assert each accepted hop
        // would also be accepted starting from the state it lands in.
        let path = ["QUEUED", "PROCESSING", "PROCESSING", "COMPLETED", "COMPLETED"];
        let mut current: Option<&str> = None;
        for next in path {
            assert!(is_allowed_transition(current, Some(next)));
            current = Some(next);
        }
        assert!(!is_allowed_transition(current, Some("FAILED")));
    }
}
