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

//! Deterministic quality scoring for OCR pages and transcription segments.
//!
//! No model calls, no I/O: every score is a pure function of the recognized
//! text and (for OCR) a grayscale raster of the source page, so the same
//! inputs always produce the same quality annotations. Guard rules encode
//! domain knowledge about visually-noisy-but-clean pages and dense blurry
//! pages; they adjust the weighted score after the fact.

pub mod ocr;
pub mod page_image;
pub mod transcription;

pub use ocr::{
    CalibrationSample, GuardThresholds, OcrWeights, PageMetrics, score_page,
    summarize_document_quality,
};
pub use page_image::PageImage;
pub use transcription::{SegmentMetrics, SegmentRow, score_segment, summarize_segments};

/// Clamp a value into `[0, 1]`.
#[must_use]
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Round to two decimal places, the precision of page-level scores.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to four decimal places, the precision of segment-level metrics.
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Drop duplicate hints while preserving first-seen order.
#[must_use]
pub fn dedupe_hints(hints: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    hints
        .into_iter()
        .filter(|hint| seen.insert(hint.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp01_bounds_and_is_idempotent() {
        for x in [-2.0, -0.0, 0.0, 0.3, 1.0, 1.7, f64::MAX] {
            let clamped = clamp01(x);
            assert!((0.0..=1.0).contains(&clamped));
            assert!((clamp01(clamped) - clamped).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rounding_precision() {
        assert!((round2(0.678) - 0.68).abs() < 1e-9);
        assert!((round4(0.643_33) - 0.6433).abs() < 1e-9);
    }

    #[test]
    fn dedupe_preserves_insertion_order() {
        let hints = vec![
            "Image appears blurry".to_string(),
            "Low contrast detected".to_string(),
            "Image appears blurry".to_string(),
        ];
        assert_eq!(
            dedupe_hints(hints),
            vec![
                "Image appears blurry".to_string(),
                "Low contrast detected".to_string()
            ]
        );
    }
}
