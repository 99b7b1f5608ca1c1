//! Output naming and assembly.

use unicode_normalization::UnicodeNormalization;

/// Separator between pages or chunks in the assembled output.
pub const PART_SEPARATOR: &str = "\n\n";

/// Stem used when the payload provides no usable name.
pub const DEFAULT_STEM: &str = "transcript";

const MAX_STEM_CHARS: usize = 180;

/// Sanitize a filename stem: NFKC-normalize, collapse non-alphanumeric runs
/// into `_`, trim leading/trailing `_`, and clamp to 180 characters. An
/// empty result falls back to [`DEFAULT_STEM`].
#[must_use]
pub fn sanitize_stem(raw: &str) -> String {
    let normalized: String = raw.trim().nfkc().collect();

    let mut out = String::new();
    let mut in_run = false;
    for ch in normalized.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    let trimmed: String = out.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    if trimmed.is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        trimmed
    }
}

fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Derive the `.txt` output filename from the desired output name, falling
/// back to the input filename and then to the default stem.
#[must_use]
pub fn output_text_filename(output_filename: Option<&str>, filename: Option<&str>) -> String {
    let preferred = output_filename
        .filter(|name| !name.trim().is_empty())
        .or(filename)
        .unwrap_or("");
    format!("{}.txt", sanitize_stem(stem_of(preferred.trim())))
}

/// Blob destination key for a job's output.
#[must_use]
pub fn output_destination(job_id: &str, filename: &str) -> String {
    format!("jobs/{job_id}/{filename}")
}

/// Concatenate pages or chunks with the blank-line separator.
#[must_use]
pub fn join_parts(parts: &[String]) -> String {
    parts.join(PART_SEPARATOR)
}

/// Prefix a UTF-8 BOM so mobile viewers reliably detect the encoding.
#[must_use]
pub fn with_bom(text: &str) -> String {
    if text.starts_with('\u{feff}') {
        text.to_string()
    } else {
        format!("\u{feff}{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_runs_and_trims() {
        assert_eq!(sanitize_stem("My Scan (final)!!.pdf"), "My_Scan_final_pdf");
        assert_eq!(sanitize_stem("  hello   world  "), "hello_world");
        assert_eq!(sanitize_stem("___"), DEFAULT_STEM);
        assert_eq!(sanitize_stem(""), DEFAULT_STEM);
    }

    #[test]
    fn sanitize_keeps_devanagari() {
        assert_eq!(sanitize_stem("जैन ग्रंथ 12"), "जैन_ग्रंथ_12");
    }

    #[test]
    fn sanitize_clamps_long_stems() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_stem(&long).chars().count(), 180);
    }

    #[test]
    fn output_filename_prefers_output_name() {
        assert_eq!(
            output_text_filename(Some("custom name.txt"), Some("scan.pdf")),
            "custom_name.txt"
        );
        assert_eq!(output_text_filename(None, Some("scan.pdf")), "scan.txt");
        assert_eq!(output_text_filename(Some("  "), Some("scan.pdf")), "scan.txt");
        assert_eq!(output_text_filename(None, None), "transcript.txt");
    }

    #[test]
    fn destination_is_scoped_by_job() {
        assert_eq!(output_destination("j1", "scan.txt"), "jobs/j1/scan.txt");
    }

    #[test]
    fn join_and_bom() {
        let parts = vec!["one".to_string(), "two".to_string()];
        assert_eq!(join_parts(&parts), "one\n\ntwo");
        let with = with_bom("text");
        assert!(with.starts_with('\u{feff}'));
        assert_eq!(with_bom(&with), with);
    }
}
