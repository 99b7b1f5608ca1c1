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
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Test doubles for the Lekhak worker: an in-memory KV store, scripted
//! model/blob/decoder collaborators, and job payload builders.

pub mod jobs;
pub mod memory_kv;
pub mod scripted;

pub use jobs::{JobPayloadBuilder, ocr_job, transcription_job};
pub use memory_kv::MemoryKvStore;
pub use scripted::{MemoryBlobStore, ScriptedOcrModel, ScriptedTranscriptionModel, SyntheticDecoder};
