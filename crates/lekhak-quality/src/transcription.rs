//! Transcription segment scoring and the transcript-level summary.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{clamp01, round4};

/// Hint for segments with fewer than eight words.
pub const HINT_SHORT_SEGMENT: &str = "Very short segment text";
/// Hint for segments with a low Devanagari share.
pub const HINT_LOW_HINDI: &str = "Low Hindi-script ratio";
/// Hint for segments dominated by adjacent repeats.
pub const HINT_REPEATED_WORDS: &str = "High repeated-word ratio";
/// Hint for segments with little vocabulary variety.
pub const HINT_LOW_VARIETY: &str = "Low vocabulary variety";

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static word pattern"));

/// Per-segment metrics; ratios rounded to four decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    /// Token count.
    pub word_count: usize,
    /// Character count of the trimmed text.
    pub char_count: usize,
    /// Share of letters in the Devanagari block.
    pub devanagari_ratio: f64,
    /// Adjacent-duplicate rate.
    pub repeat_ratio: f64,
    /// Distinct lowercased words over total words.
    pub unique_ratio: f64,
    /// `min(1, words / 80)`.
    pub density_score: f64,
    /// `min(1, chars / 450)`.
    pub length_score: f64,
}

/// One scored segment feeding the transcript summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRow {
    /// 1-based segment index.
    pub segment_index: usize,
    /// Segment score in `[0, 1]`.
    pub score: f64,
    /// First actionable hint for the segment, empty when none.
    pub hint: String,
}

fn words(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

fn devanagari_ratio(text: &str) -> f64 {
    let letters: Vec<char> = text.chars().filter(|ch| ch.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    let dev = letters
        .iter()
        .filter(|ch| ('\u{0900}'..='\u{097F}').contains(*ch))
        .count();
    clamp01(dev as f64 / letters.len() as f64)
}

fn repeat_ratio(words: &[&str]) -> f64 {
    if words.len() < 2 {
        return 0.0;
    }
    let repeats = words
        .windows(2)
        .filter(|pair| pair[0].to_lowercase() == pair[1].to_lowercase())
        .count();
    clamp01(repeats as f64 / (words.len() - 1) as f64)
}

/// Score one transcript segment and derive its hints.
#[must_use]
pub fn score_segment(text: &str) -> (f64, SegmentMetrics, Vec<String>) {
    let tokens = words(text);
    let word_count = tokens.len();
    let char_count = text.trim().chars().count();

    let devanagari = devanagari_ratio(text);
    let repeats = repeat_ratio(&tokens);
    let unique = if word_count == 0 {
        0.0
    } else {
        let distinct: std::collections::HashSet<String> =
            tokens.iter().map(|w| w.to_lowercase()).collect();
        distinct.len() as f64 / word_count as f64
    };
    let density = (word_count as f64 / 80.0).min(1.0);
    let length = (char_count as f64 / 450.0).min(1.0);

    let score = clamp01(
        0.28 * density
            + 0.22 * length
            + 0.22 * devanagari
            + 0.18 * unique
            + 0.10 * (1.0 - repeats),
    );

    let mut hints = Vec::new();
    if word_count < 8 {
        hints.push(HINT_SHORT_SEGMENT.to_string());
    }
    if devanagari < 0.45 {
        hints.push(HINT_LOW_HINDI.to_string());
    }
    if repeats > 0.20 {
        hints.push(HINT_REPEATED_WORDS.to_string());
    }
    if unique < 0.35 && word_count >= 8 {
        hints.push(HINT_LOW_VARIETY.to_string());
    }

    let metrics = SegmentMetrics {
        word_count,
        char_count,
        devanagari_ratio: round4(devanagari),
        repeat_ratio: round4(repeats),
        unique_ratio: round4(unique),
        density_score: round4(density),
        length_score: round4(length),
    };
    (score, metrics, hints)
}

/// Summarize segment scores: unweighted average (four decimals), 1-based
/// indices below the threshold, and up to ten human-readable hints.
#[must_use]
pub fn summarize_segments(rows: &[SegmentRow], low_threshold: f64) -> (f64, Vec<usize>, Vec<String>) {
    if rows.is_empty() {
        return (0.0, Vec::new(), Vec::new());
    }

    let avg = rows.iter().map(|row| row.score).sum::<f64>() / rows.len() as f64;

    let mut low_segments = Vec::new();
    let mut hints = Vec::new();
    for row in rows {
        if row.score < low_threshold && row.segment_index > 0 {
            low_segments.push(row.segment_index);
            let hint = row.hint.trim();
            if !hint.is_empty() {
                hints.push(format!("Segment {}: {hint}", row.segment_index));
            }
        }
    }
    hints.truncate(10);

    (round4(clamp01(avg)), low_segments, hints)
}
