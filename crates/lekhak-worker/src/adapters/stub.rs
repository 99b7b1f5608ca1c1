//! Development-profile collaborators: a filesystem blob store and
//! deterministic stand-ins for the model and the media decoder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lekhak_pipelines::deps::{BlobStore, MediaDecoder, OcrModel, TranscriptionModel};
use lekhak_quality::PageImage;

/// Blob store over a local directory tree.
///
/// Objects uploaded to `jobs/<id>/<name>` land under the root as regular
/// files; downloads accept `file://` URIs, plain paths, and `gs://` URIs
/// whose key is resolved under the root.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Blob store rooted at `root`, created on demand.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve_local(&self, uri: &str) -> PathBuf {
        if let Some(path) = uri.strip_prefix("file://") {
            return PathBuf::from(path);
        }
        if let Some(rest) = uri.strip_prefix("gs://") {
            let key = rest.split_once('/').map_or("", |(_, key)| key);
            return self.root.join(key);
        }
        PathBuf::from(uri)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, uri: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source = self.resolve_local(uri);
        if !source.exists() {
            return Err(anyhow!("no such file: {}", source.display()));
        }
        let name = source
            .file_name()
            .map_or_else(|| "input.bin".into(), |n| n.to_string_lossy().into_owned());
        let dest = dest_dir.join(name);
        tokio::fs::copy(&source, &dest)
            .await
            .with_context(|| format!("failed to copy {} into scratch dir", source.display()))?;
        Ok(dest)
    }

    async fn upload_text(&self, destination: &str, content: &str) -> Result<String> {
        let path = self.root.join(destination);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(format!("file://{}", path.display()))
    }
}

/// Deterministic OCR stand-in for development runs.
pub struct StubOcrModel;

#[async_trait]
impl OcrModel for StubOcrModel {
    async fn ocr_page(&self, _image: &PageImage, prompt: &str) -> Result<String> {
        Ok(format!(
            "Development OCR output. Prompt head: {}",
            prompt.chars().take(48).collect::<String>()
        ))
    }
}

/// Deterministic transcription stand-in for development runs.
pub struct StubTranscriptionModel;

#[async_trait]
impl TranscriptionModel for StubTranscriptionModel {
    async fn transcribe_chunk(&self, chunk: &Path, _prompt: &str) -> Result<String> {
        Ok(format!(
            "Development transcript for {}.",
            chunk.file_name().map_or_else(
                || "chunk".to_string(),
                |n| n.to_string_lossy().into_owned()
            )
        ))
    }
}

/// Single-page, single-chunk decoder stand-in.
///
/// Real rasterization and audio splitting are external; this keeps the
/// pipelines exercisable against arbitrary local files.
pub struct StubMediaDecoder;

#[async_trait]
impl MediaDecoder for StubMediaDecoder {
    async fn page_count(&self, document: &Path) -> Result<usize> {
        if document.exists() { Ok(1) } else { Ok(0) }
    }

    async fn rasterize_pages(
        &self,
        _document: &Path,
        _start: usize,
        count: usize,
        _dpi: u32,
    ) -> Result<Vec<PageImage>> {
        (0..count)
            .map(|_| PageImage::filled(640, 480, 180).ok_or_else(|| anyhow!("bad page geometry")))
            .collect()
    }

    async fn split_audio(
        &self,
        input: &Path,
        _chunk: Duration,
        workdir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let dest = workdir.join("chunk-000.bin");
        tokio::fs::copy(input, &dest)
            .await
            .with_context(|| format!("failed to stage {}", input.display()))?;
        Ok(vec![dest])
    }
}
