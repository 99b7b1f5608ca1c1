//! OCR page scoring: metrics, weighted score, hints, guard rules,
//! recalibration, and the document-level summary.

use serde::{Deserialize, Serialize};

use crate::page_image::PageImage;
use crate::{clamp01, round2};

/// Hint emitted when the blur proxy is high.
pub const HINT_BLURRY: &str = "Image appears blurry";
/// Hint emitted when page contrast is low.
pub const HINT_LOW_CONTRAST: &str = "Low contrast detected";
/// Hint emitted when very little text was recognized.
pub const HINT_LITTLE_TEXT: &str = "Very little readable text found";
/// Hint emitted when the recognized text looks noisy.
pub const HINT_NOISY: &str = "OCR output appears noisy";

/// Per-page metrics, each in `[0, 1]` and rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// Confidence proxy derived from text cleanliness.
    pub char_conf_proxy: f64,
    /// Grayscale contrast estimate.
    pub contrast_score: f64,
    /// Blur estimate; higher means more blurry.
    pub blur_score: f64,
    /// Recognized-character density relative to page area.
    pub text_density_score: f64,
    /// Fraction of characters outside the expected alphabet.
    pub garbage_ratio: f64,
}

/// Weights of the five metric terms; must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OcrWeights {
    /// Weight of the confidence proxy.
    pub char_conf_proxy: f64,
    /// Weight of the density term.
    pub text_density_score: f64,
    /// Weight of the contrast term.
    pub contrast_score: f64,
    /// Weight of the inverted blur term.
    pub blur_quality_score: f64,
    /// Weight of the inverted garbage term.
    pub noise_quality_score: f64,
}

impl Default for OcrWeights {
    fn default() -> Self {
        Self {
            char_conf_proxy: 0.34,
            text_density_score: 0.12,
            contrast_score: 0.20,
            blur_quality_score: 0.18,
            noise_quality_score: 0.16,
        }
    }
}

impl OcrWeights {
    const KEYS: [&'static str; 5] = [
        "char_conf_proxy",
        "text_density_score",
        "contrast_score",
        "blur_quality_score",
        "noise_quality_score",
    ];

    /// Parse an override JSON object (`{"char_conf_proxy": 0.4, ...}`).
    ///
    /// Unknown keys are ignored, negative or non-numeric values keep their
    /// default, and the result is renormalized to sum to 1. Undecodable
    /// input falls back to the defaults.
    #[must_use]
    pub fn from_json(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            return Self::default();
        };
        let mut weights = Self::default();
        for key in Self::KEYS {
            if let Some(value) = parsed.get(key).and_then(serde_json::Value::as_f64)
                && value >= 0.0
            {
                *weights.slot_mut(key) = value;
            }
        }
        weights.normalized()
    }

    fn slot_mut(&mut self, key: &str) -> &mut f64 {
        match key {
            "char_conf_proxy" => &mut self.char_conf_proxy,
            "text_density_score" => &mut self.text_density_score,
            "contrast_score" => &mut self.contrast_score,
            "blur_quality_score" => &mut self.blur_quality_score,
            _ => &mut self.noise_quality_score,
        }
    }

    fn slot(&self, key: &str) -> f64 {
        match key {
            "char_conf_proxy" => self.char_conf_proxy,
            "text_density_score" => self.text_density_score,
            "contrast_score" => self.contrast_score,
            "blur_quality_score" => self.blur_quality_score,
            _ => self.noise_quality_score,
        }
    }

    fn total(&self) -> f64 {
        self.char_conf_proxy
            + self.text_density_score
            + self.contrast_score
            + self.blur_quality_score
            + self.noise_quality_score
    }

    /// Renormalize so the weights sum to 1; degenerate totals fall back to
    /// the defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return Self::default();
        }
        self.char_conf_proxy /= total;
        self.text_density_score /= total;
        self.contrast_score /= total;
        self.blur_quality_score /= total;
        self.noise_quality_score /= total;
        self
    }
}

/// Named thresholds of the guard rules, overridable via configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardThresholds {
    /// Minimum stripped-text length for the clean-text floor.
    pub clean_text_min_chars: usize,
    /// Maximum garbage ratio for the clean predicates.
    pub clean_text_garbage_max: f64,
    /// Minimum confidence proxy for the clean predicates.
    pub clean_text_char_conf_min: f64,
    /// Floor applied by the clean-text rule.
    pub clean_text_floor: f64,
    /// Density above which blur/contrast hints are suppressed.
    pub hint_suppress_density_min: f64,
    /// Minimum density for the clean-proxy floor.
    pub clean_proxy_density_min: f64,
    /// Floor applied by the clean-proxy rule.
    pub clean_proxy_floor: f64,
    /// Density ceiling for the sparse-clean bonus.
    pub sparse_clean_density_max: f64,
    /// Bonus applied to sparse clean pages.
    pub sparse_clean_bonus: f64,
    /// Bonus applied to dense clean pages.
    pub dense_clean_bonus: f64,
    /// Minimum confidence proxy for the dense-clean predicate.
    pub dense_clean_char_conf_min: f64,
    /// Maximum garbage ratio for the dense-clean predicate.
    pub dense_clean_garbage_max: f64,
    /// Minimum density for the dense-clean predicate.
    pub dense_clean_density_min: f64,
    /// Minimum density for the dense-blur penalty.
    pub dense_blur_density_min: f64,
    /// Minimum blur for the dense-blur penalty.
    pub dense_blur_min: f64,
    /// Penalty applied to dense blurry noisy pages.
    pub dense_blur_penalty: f64,
    /// Minimum garbage ratio for the dense-blur penalty.
    pub dense_blur_penalty_noise_min: f64,
    /// Pages scoring below this are listed as low-confidence.
    pub low_threshold: f64,
}

impl Default for GuardThresholds {
    fn default() -> Self {
        Self {
            clean_text_min_chars: 80,
            clean_text_garbage_max: 0.12,
            clean_text_char_conf_min: 0.78,
            clean_text_floor: 0.65,
            hint_suppress_density_min: 0.35,
            clean_proxy_density_min: 0.04,
            clean_proxy_floor: 0.62,
            sparse_clean_density_max: 0.25,
            sparse_clean_bonus: 0.08,
            dense_clean_bonus: 0.08,
            dense_clean_char_conf_min: 0.90,
            dense_clean_garbage_max: 0.05,
            dense_clean_density_min: 0.15,
            dense_blur_density_min: 0.70,
            dense_blur_min: 0.80,
            dense_blur_penalty: 0.10,
            dense_blur_penalty_noise_min: 0.08,
            low_threshold: 0.65,
        }
    }
}

impl GuardThresholds {
    /// Build thresholds from defaults plus a configuration lookup keyed by
    /// the `OCR_QUALITY_*` names. Unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut guards = Self::default();
        let float = |name: &str, slot: &mut f64| {
            if let Some(value) = lookup(name).and_then(|raw| raw.trim().parse::<f64>().ok()) {
                *slot = value;
            }
        };
        float(
            "OCR_QUALITY_CLEAN_TEXT_GARBAGE_MAX",
            &mut guards.clean_text_garbage_max,
        );
        float(
            "OCR_QUALITY_CLEAN_TEXT_CHAR_CONF_MIN",
            &mut guards.clean_text_char_conf_min,
        );
        float("OCR_QUALITY_CLEAN_TEXT_FLOOR", &mut guards.clean_text_floor);
        float(
            "OCR_QUALITY_HINT_SUPPRESS_DENSITY_MIN",
            &mut guards.hint_suppress_density_min,
        );
        float(
            "OCR_QUALITY_CLEAN_PROXY_DENSITY_MIN",
            &mut guards.clean_proxy_density_min,
        );
        float("OCR_QUALITY_CLEAN_PROXY_FLOOR", &mut guards.clean_proxy_floor);
        float(
            "OCR_QUALITY_SPARSE_CLEAN_DENSITY_MAX",
            &mut guards.sparse_clean_density_max,
        );
        float("OCR_QUALITY_SPARSE_CLEAN_BONUS", &mut guards.sparse_clean_bonus);
        float("OCR_QUALITY_DENSE_CLEAN_BONUS", &mut guards.dense_clean_bonus);
        float(
            "OCR_QUALITY_DENSE_CLEAN_CHAR_CONF_MIN",
            &mut guards.dense_clean_char_conf_min,
        );
        float(
            "OCR_QUALITY_DENSE_CLEAN_GARBAGE_MAX",
            &mut guards.dense_clean_garbage_max,
        );
        float(
            "OCR_QUALITY_DENSE_CLEAN_DENSITY_MIN",
            &mut guards.dense_clean_density_min,
        );
        float(
            "OCR_QUALITY_DENSE_BLUR_DENSITY_MIN",
            &mut guards.dense_blur_density_min,
        );
        float("OCR_QUALITY_DENSE_BLUR_MIN", &mut guards.dense_blur_min);
        float("OCR_QUALITY_DENSE_BLUR_PENALTY", &mut guards.dense_blur_penalty);
        float(
            "OCR_QUALITY_DENSE_BLUR_PENALTY_NOISE_MIN",
            &mut guards.dense_blur_penalty_noise_min,
        );
        float("OCR_QUALITY_LOW_THRESHOLD", &mut guards.low_threshold);
        if let Some(value) = lookup("OCR_QUALITY_CLEAN_TEXT_MIN_CHARS")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
        {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                guards.clean_text_min_chars = (value.max(1.0)) as usize;
            }
        }
        guards
    }
}

fn is_expected_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || ('\u{0900}'..='\u{097F}').contains(&ch)
        || ch.is_whitespace()
        || matches!(ch, '.' | ',' | ';' | ':' | '!' | '?' | '(' | ')' | '"' | '-')
}

/// Fraction of characters outside the expected alphabet; empty text is all
/// garbage.
#[must_use]
pub fn garbage_ratio(text: &str) -> f64 {
    let clean = text.trim();
    if clean.is_empty() {
        return 1.0;
    }
    let total = clean.chars().count();
    let noisy = clean.chars().filter(|&ch| !is_expected_char(ch)).count();
    noisy as f64 / total.max(1) as f64
}

/// Confidence proxy derived from text cleanliness; empty text scores 0.
#[must_use]
pub fn char_conf_proxy(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    clamp01(1.0 - garbage_ratio(text) * 1.5)
}

/// Grayscale contrast estimate.
#[must_use]
pub fn contrast_score(image: &PageImage) -> f64 {
    clamp01(image.luma_stddev() / 64.0)
}

/// Blur estimate; higher means more blurry.
#[must_use]
pub fn blur_score(image: &PageImage) -> f64 {
    let sharpness = clamp01(image.edge_mean() / 32.0);
    clamp01(1.0 - sharpness)
}

/// Recognized-character density relative to page area.
#[must_use]
pub fn text_density_score(text: &str, image: &PageImage) -> f64 {
    let chars = text.trim().chars().count() as f64;
    clamp01(chars * 8000.0 / image.area() as f64)
}

/// Weighted score over clamped metrics, rounded to two decimals.
#[must_use]
pub fn score_from_metrics(metrics: &PageMetrics, weights: &OcrWeights) -> f64 {
    let raw = weights.char_conf_proxy * clamp01(metrics.char_conf_proxy)
        + weights.text_density_score * clamp01(metrics.text_density_score)
        + weights.contrast_score * clamp01(metrics.contrast_score)
        + weights.blur_quality_score * clamp01(1.0 - metrics.blur_score)
        + weights.noise_quality_score * clamp01(1.0 - metrics.garbage_ratio);
    round2(clamp01(raw))
}

/// Apply the guard rules in order, carrying the running adjusted score.
///
/// Rules: clean-text floor (with hint suppression), clean-proxy floor,
/// sparse-clean bonus, dense-clean bonus, dense-blur penalty. The result is
/// clamped to `[0, 1]` and rounded to two decimals.
#[must_use]
pub fn apply_guard_rules(
    score: f64,
    metrics: &PageMetrics,
    hints: &[String],
    text: &str,
    guards: &GuardThresholds,
) -> (f64, Vec<String>) {
    let clean = text.trim();
    let mut adjusted = score;
    let mut output_hints: Vec<String> = hints.to_vec();

    let is_clean_text = clean.chars().count() >= guards.clean_text_min_chars
        && metrics.garbage_ratio <= guards.clean_text_garbage_max
        && metrics.char_conf_proxy >= guards.clean_text_char_conf_min;
    if is_clean_text {
        adjusted = adjusted.max(guards.clean_text_floor);
        if metrics.text_density_score >= guards.hint_suppress_density_min {
            output_hints.retain(|h| h != HINT_BLURRY && h != HINT_LOW_CONTRAST);
        }
    }

    // Text-derived signals can be clean while the page-vision proxies are
    // harsh; the proxy floor prevents severe under-scoring in that case.
    let clean_proxy = metrics.char_conf_proxy >= guards.clean_text_char_conf_min
        && metrics.garbage_ratio <= guards.clean_text_garbage_max
        && metrics.text_density_score >= guards.clean_proxy_density_min;
    if clean_proxy {
        adjusted = adjusted.max(guards.clean_proxy_floor);
    }

    // Sparse readable pages (short notes, quotes) get a bounded bonus rather
    // than a hard floor so ranking stays continuous.
    if clean_proxy && metrics.text_density_score <= guards.sparse_clean_density_max {
        adjusted += guards.sparse_clean_bonus;
    }

    let dense_clean = metrics.char_conf_proxy >= guards.dense_clean_char_conf_min
        && metrics.garbage_ratio <= guards.dense_clean_garbage_max
        && metrics.text_density_score >= guards.dense_clean_density_min;
    if dense_clean {
        adjusted += guards.dense_clean_bonus;
    }

    if metrics.text_density_score >= guards.dense_blur_density_min
        && metrics.blur_score >= guards.dense_blur_min
        && metrics.garbage_ratio >= guards.dense_blur_penalty_noise_min
        && !dense_clean
    {
        adjusted -= guards.dense_blur_penalty;
    }

    (round2(clamp01(adjusted)), output_hints)
}

/// Score a page: metrics, weighted score, guard adjustments, and hints.
#[must_use]
pub fn score_page(
    text: &str,
    image: &PageImage,
    weights: &OcrWeights,
    guards: &GuardThresholds,
) -> (f64, PageMetrics, Vec<String>) {
    let conf = char_conf_proxy(text);
    let contrast = contrast_score(image);
    let blur = blur_score(image);
    let density = text_density_score(text, image);
    let noise = garbage_ratio(text);

    let mut hints = Vec::new();
    if blur > 0.60 {
        hints.push(HINT_BLURRY.to_string());
    }
    if contrast < 0.40 {
        hints.push(HINT_LOW_CONTRAST.to_string());
    }
    if density < 0.20 {
        hints.push(HINT_LITTLE_TEXT.to_string());
    }
    if noise > 0.25 {
        hints.push(HINT_NOISY.to_string());
    }

    let metrics = PageMetrics {
        char_conf_proxy: round2(conf),
        contrast_score: round2(contrast),
        blur_score: round2(blur),
        text_density_score: round2(density),
        garbage_ratio: round2(noise),
    };
    let score = score_from_metrics(&metrics, weights);
    let (score, hints) = apply_guard_rules(score, &metrics, &hints, text, guards);
    (score, metrics, hints)
}

/// Document-level summary: average score (two decimals) and 1-based indices
/// of pages below the low-confidence threshold.
#[must_use]
pub fn summarize_document_quality(page_scores: &[f64], low_threshold: f64) -> (f64, Vec<usize>) {
    if page_scores.is_empty() {
        return (0.0, Vec::new());
    }
    let avg = round2(page_scores.iter().sum::<f64>() / page_scores.len() as f64);
    let low_pages = page_scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score < low_threshold)
        .map(|(idx, _)| idx + 1)
        .collect();
    (avg, low_pages)
}

/// One labeled sample for weight recalibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    /// Observed page metrics.
    pub metrics: PageMetrics,
    /// Human-assigned quality target in `[0, 1]`.
    pub target_score: f64,
}

const CALIBRATION_SPREAD: f64 = 0.10;
const CALIBRATION_STEP: f64 = 0.05;

/// Offline grid search over small additive weight deltas, minimizing mean
/// absolute error against the labeled samples. Returns the winning weights
/// and their MAE (four decimals); defaults and 0.0 when no sample is valid.
#[must_use]
pub fn recalibrate_weights(samples: &[CalibrationSample]) -> (OcrWeights, f64) {
    let defaults = OcrWeights::default();
    if samples.is_empty() {
        return (defaults, 0.0);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = ((2.0 * CALIBRATION_SPREAD) / CALIBRATION_STEP) as usize + 1;
    let deltas: Vec<f64> = (0..steps)
        .map(|i| -CALIBRATION_SPREAD + i as f64 * CALIBRATION_STEP)
        .collect();

    let mut best = defaults;
    let mut best_mae = f64::INFINITY;

    let combos = deltas.len().pow(OcrWeights::KEYS.len() as u32);
    for combo in 0..combos {
        let mut candidate = defaults;
        let mut index = combo;
        for key in OcrWeights::KEYS {
            let delta = deltas[index % deltas.len()];
            index /= deltas.len();
            *candidate.slot_mut(key) = (defaults.slot(key) + delta).max(0.0);
        }
        if candidate.total() <= 0.0 {
            continue;
        }
        let candidate = candidate.normalized();

        let mut err = 0.0;
        let mut count = 0usize;
        for sample in samples {
            if !(0.0..=1.0).contains(&sample.target_score) {
                continue;
            }
            let predicted = score_from_metrics(&sample.metrics, &candidate);
            err += (predicted - sample.target_score).abs();
            count += 1;
        }
        if count == 0 {
            continue;
        }
        let mae = err / count as f64;
        if mae < best_mae {
            best_mae = mae;
            best = candidate;
        }
    }

    if best_mae.is_infinite() {
        return (defaults, 0.0);
    }
    (best, crate::round4(best_mae))
}
