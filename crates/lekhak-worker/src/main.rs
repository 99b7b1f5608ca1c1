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

//! Binary entrypoint for the Lekhak worker process.

use anyhow::Result;

/// Bootstraps the worker and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<()> {
    lekhak_worker::bootstrap::run_app().await
}
