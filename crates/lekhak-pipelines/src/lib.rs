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

//! Resumable chunked pipelines for OCR and transcription.
//!
//! Both pipelines share the same shape: resolve the input, walk its work
//! units (pages or audio chunks) while streaming progress through the
//! guarded status store, assemble the output text, upload it, and emit the
//! terminal status. Cancellation is cooperative: every work-unit boundary
//! polls the status record before continuing.
//!
//! The AI inference calls, blob transport, and media decoding are external
//! collaborators behind the traits in [`deps`]; tests substitute scripted
//! implementations.

pub mod cancel;
pub mod deps;
pub mod error;
pub mod ocr;
pub mod output;
pub mod prompts;
pub mod status;
pub mod transcribe;

pub use cancel::{ensure_not_cancelled, is_cancelled};
pub use deps::{BlobStore, MediaDecoder, OcrModel, PipelineDeps, TranscriptionModel};
pub use error::{JobError, JobResult};
pub use ocr::{OcrConfig, OcrOutcome, OcrPipeline};
pub use prompts::PromptLibrary;
pub use status::{GuardedWrite, StatusStore};
pub use transcribe::{TranscriptionConfig, TranscriptionOutcome, TranscriptionPipeline};
