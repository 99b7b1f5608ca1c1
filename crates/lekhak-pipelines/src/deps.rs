//! Collaborator seams: model inference, blob transport, media decoding.
//!
//! These are external systems the pipelines treat as opaque. They are
//! constructed once at startup and injected, so tests can substitute
//! scripted implementations and the worker binary can run against a local
//! profile without cloud credentials.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lekhak_kv::{KvStore, RetryPolicy};
use lekhak_quality::PageImage;

use crate::status::StatusStore;

/// Blob-store transport: downloads inputs, persists text outputs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Materialize a blob URI as a local file under `dest_dir`.
    async fn download(&self, uri: &str, dest_dir: &Path) -> anyhow::Result<PathBuf>;

    /// Upload UTF-8 text under the given destination key and return the
    /// blob URI of the stored object.
    async fn upload_text(&self, destination: &str, content: &str) -> anyhow::Result<String>;
}

/// Remote OCR inference: one page image in, recognized text out.
#[async_trait]
pub trait OcrModel: Send + Sync {
    /// Run OCR over a single page with the resolved prompt.
    async fn ocr_page(&self, image: &PageImage, prompt: &str) -> anyhow::Result<String>;
}

/// Remote speech-to-text inference over one audio chunk.
#[async_trait]
pub trait TranscriptionModel: Send + Sync {
    /// Transcribe one re-encoded chunk file with the resolved prompt.
    async fn transcribe_chunk(&self, chunk: &Path, prompt: &str) -> anyhow::Result<String>;
}

/// Shared collaborator bundle both pipelines are constructed from.
#[derive(Clone)]
pub struct PipelineDeps {
    /// KV store used for cancellation polls.
    pub kv: Arc<dyn KvStore>,
    /// Guarded status writer.
    pub status: StatusStore,
    /// Blob transport for inputs and outputs.
    pub blob: Arc<dyn BlobStore>,
    /// Media decoder for rasterization and audio splitting.
    pub decoder: Arc<dyn MediaDecoder>,
    /// Retry policy for short KV reads.
    pub kv_retry: RetryPolicy,
    /// Retry policy for blob transfers.
    pub blob_retry: RetryPolicy,
}

/// Media decoding: PDF rasterization and audio splitting.
#[async_trait]
pub trait MediaDecoder: Send + Sync {
    /// Number of pages in a document.
    async fn page_count(&self, document: &Path) -> anyhow::Result<usize>;

    /// Rasterize `count` pages starting at the 0-based `start` index at the
    /// requested DPI. Used in batches to bound peak memory.
    async fn rasterize_pages(
        &self,
        document: &Path,
        start: usize,
        count: usize,
        dpi: u32,
    ) -> anyhow::Result<Vec<PageImage>>;

    /// Split an audio input into re-encoded segment files of `chunk`
    /// duration, written under `workdir`, in playback order.
    async fn split_audio(
        &self,
        input: &Path,
        chunk: Duration,
        workdir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>>;
}
