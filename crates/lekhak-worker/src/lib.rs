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

//! The Lekhak worker process: queue dispatch, per-type admission control,
//! retry/requeue and dead-letter handling, and the process bootstrap.

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod queues;
pub mod runner;

pub use config::{ConfigError, QueueMode, WorkerConfig};
pub use queues::{QueueBinding, QueuePlan};
pub use runner::{StepOutcome, Worker, WorkerOptions};
