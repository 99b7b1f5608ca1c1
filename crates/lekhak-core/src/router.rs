//! Pipeline selection from payload hints.

use crate::job::JobDescriptor;

/// File extensions that force the OCR pipeline.
pub const OCR_EXTENSIONS: &[&str] = &[".pdf", ".png", ".jpg", ".jpeg", ".webp", ".tif", ".tiff"];

/// The two pipelines a job can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Document OCR over rasterized pages.
    Ocr,
    /// Audio/video transcription over fixed chunks.
    Transcription,
}

impl JobKind {
    /// Lowercase route label used in logs and metric tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Transcription => "transcription",
        }
    }

    /// Uppercase type label used for admission-set keys and counters.
    #[must_use]
    pub const fn type_label(self) -> &'static str {
        match self {
            Self::Ocr => "OCR",
            Self::Transcription => "TRANSCRIPTION",
        }
    }
}

fn has_ocr_extension(filename: &str) -> bool {
    let lower = filename.trim().to_lowercase();
    OCR_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Classify a job as OCR or transcription.
///
/// Routing is robust to inconsistent upstream payloads: an `ocr` source or
/// an explicit OCR job type wins, and a recognizable image/document
/// extension catches payloads that declare neither.
#[must_use]
pub fn route(job: &JobDescriptor) -> JobKind {
    let source = job.source.as_deref().unwrap_or("").trim().to_lowercase();
    if source == "ocr" {
        return JobKind::Ocr;
    }

    let declared = job.declared_type().unwrap_or("").trim().to_uppercase();
    if declared == "OCR" {
        return JobKind::Ocr;
    }

    if job.filename.as_deref().is_some_and(has_ocr_extension) {
        return JobKind::Ocr;
    }

    JobKind::Transcription
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(source: Option<&str>, job_type: Option<&str>, filename: Option<&str>) -> JobDescriptor {
        let mut job = JobDescriptor::new("j1");
        job.source = source.map(str::to_string);
        job.job_type = job_type.map(str::to_string);
        job.filename = filename.map(str::to_string);
        job
    }

    #[test]
    fn source_hint_wins() {
        assert_eq!(route(&job_with(Some("ocr"), None, None)), JobKind::Ocr);
        assert_eq!(route(&job_with(Some("OCR"), None, Some("talk.mp3"))), JobKind::Ocr);
    }

    #[test]
    fn declared_type_selects_ocr() {
        assert_eq!(route(&job_with(None, Some("OCR"), None)), JobKind::Ocr);
        assert_eq!(
            route(&job_with(None, Some("TRANSCRIPTION"), None)),
            JobKind::Transcription
        );
    }

    #[test]
    fn legacy_type_alias_is_honored() {
        let mut job = JobDescriptor::new("j1");
        job.type_alias = Some("ocr".to_string());
        assert_eq!(route(&job), JobKind::Ocr);
    }

    #[test]
    fn extension_catches_undeclared_documents() {
        for name in ["scan.pdf", "page.PNG", "photo.jpeg", "doc.tiff", "pic.webp"] {
            assert_eq!(route(&job_with(None, None, Some(name))), JobKind::Ocr, "{name}");
        }
        for name in ["talk.mp3", "clip.mp4", "note.txt", "archive"] {
            assert_eq!(
                route(&job_with(None, None, Some(name))),
                JobKind::Transcription,
                "{name}"
            );
        }
    }

    #[test]
    fn output_depends_only_on_routing_fields() {
        let mut a = job_with(None, None, Some("scan.pdf"));
        let mut b = job_with(None, None, Some("scan.pdf"));
        a.request_id = Some("r1".to_string());
        b.input_gcs_uri = Some("gs://bucket/scan.pdf".to_string());
        b.attempts = 4;
        assert_eq!(route(&a), route(&b));
    }
}
