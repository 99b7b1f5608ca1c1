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

//! Telemetry for the Lekhak worker: structured logging setup and the
//! Prometheus metrics registry.

pub mod init;
pub mod metrics;

pub use init::{LogFormat, LoggingConfig, init_logging};
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
