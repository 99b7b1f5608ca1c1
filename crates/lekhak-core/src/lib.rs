#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Domain model shared across the Lekhak worker: the job descriptor, the
//! status contract and its transition rules, the failure taxonomy, the
//! recovery policy, job routing, and the dead-letter record.
//!
//! Everything in this crate is synchronous and side-effect free so the
//! decision logic stays deterministic and unit-testable; the crates above it
//! own the KV store, the pipelines, and the worker loop.

pub mod contract;
pub mod dead_letter;
pub mod job;
pub mod machine;
pub mod recovery;
pub mod router;
pub mod taxonomy;

pub use contract::{CONTRACT_VERSION, JobStatus};
pub use dead_letter::{DeadLetterEntry, DeadLetterInput, ErrorType, InputType};
pub use job::JobDescriptor;
pub use machine::is_allowed_transition;
pub use recovery::{RecoveryAction, RecoveryDecision, RecoveryReason, RetryBudgets};
pub use router::JobKind;
pub use taxonomy::{ErrorCode, FailureKind};
