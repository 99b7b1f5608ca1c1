//! Scripted collaborator doubles for the pipeline seams.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lekhak_pipelines::deps::{BlobStore, MediaDecoder, OcrModel, TranscriptionModel};
use lekhak_quality::PageImage;

type Script = Mutex<VecDeque<Result<String>>>;

fn next_scripted(script: &Script, default: &str) -> Result<String> {
    match script
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .pop_front()
    {
        Some(result) => result,
        None => Ok(default.to_string()),
    }
}

/// OCR model returning scripted responses, then a default.
pub struct ScriptedOcrModel {
    script: Script,
    default: String,
    calls: Mutex<Vec<String>>,
}

impl ScriptedOcrModel {
    /// Model that always returns `default`.
    #[must_use]
    pub fn with_default(default: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: default.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one scripted response (ok or error).
    pub fn push_response(&self, response: Result<String>) {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(response);
    }

    /// Prompts observed so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl OcrModel for ScriptedOcrModel {
    async fn ocr_page(&self, _image: &PageImage, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(prompt.to_string());
        next_scripted(&self.script, &self.default)
    }
}

/// Transcription model returning scripted responses, then a default.
pub struct ScriptedTranscriptionModel {
    script: Script,
    default: String,
}

impl ScriptedTranscriptionModel {
    /// Model that always returns `default`.
    #[must_use]
    pub fn with_default(default: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: default.to_string(),
        }
    }

    /// Queue one scripted response (ok or error).
    pub fn push_response(&self, response: Result<String>) {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(response);
    }
}

#[async_trait]
impl TranscriptionModel for ScriptedTranscriptionModel {
    async fn transcribe_chunk(&self, _chunk: &Path, _prompt: &str) -> Result<String> {
        next_scripted(&self.script, &self.default)
    }
}

/// Blob store over an in-memory map keyed by URI.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    /// Fresh empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a downloadable object.
    pub fn seed(&self, uri: &str, content: &str) {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(uri.to_string(), content.to_string());
    }

    /// Read back an uploaded object by destination key.
    #[must_use]
    pub fn object(&self, destination: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(destination)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, uri: &str, dest_dir: &Path) -> Result<PathBuf> {
        let content = self
            .objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("no such blob: {uri}"))?;
        let name = uri.rsplit('/').next().unwrap_or("input.bin");
        let path = dest_dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    async fn upload_text(&self, destination: &str, content: &str) -> Result<String> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(destination.to_string(), content.to_string());
        Ok(format!("gs://test-bucket/{destination}"))
    }
}

/// Decoder producing synthetic flat-gray pages and fixed-size audio chunks.
pub struct SyntheticDecoder {
    pages: usize,
    chunks: usize,
    luma: u8,
}

impl SyntheticDecoder {
    /// Decoder reporting `pages` document pages and `chunks` audio chunks.
    #[must_use]
    pub const fn new(pages: usize, chunks: usize) -> Self {
        Self {
            pages,
            chunks,
            luma: 200,
        }
    }

    /// Override the fill value of synthesized pages.
    #[must_use]
    pub const fn with_luma(mut self, luma: u8) -> Self {
        self.luma = luma;
        self
    }
}

#[async_trait]
impl MediaDecoder for SyntheticDecoder {
    async fn page_count(&self, _document: &Path) -> Result<usize> {
        Ok(self.pages)
    }

    async fn rasterize_pages(
        &self,
        _document: &Path,
        start: usize,
        count: usize,
        _dpi: u32,
    ) -> Result<Vec<PageImage>> {
        let end = (start + count).min(self.pages);
        Ok((start..end)
            .map(|_| {
                PageImage::filled(320, 240, self.luma).ok_or_else(|| anyhow!("bad page geometry"))
            })
            .collect::<Result<Vec<_>>>()?)
    }

    async fn split_audio(
        &self,
        _input: &Path,
        _chunk: Duration,
        workdir: &Path,
    ) -> Result<Vec<PathBuf>> {
        (0..self.chunks)
            .map(|idx| {
                let path = workdir.join(format!("chunk-{idx:03}.wav"));
                std::fs::write(&path, format!("chunk {idx}"))?;
                Ok(path)
            })
            .collect()
    }
}
