//! Named prompt sections loaded from the prompts file.
//!
//! File format: plain text with sections opened by `### PROMPT: <NAME>` (or
//! the shorthand `### <NAME>`) and closed by `=== END PROMPT ===`. Lookup
//! tries the exact name first, then `<NAME>_PROMPT`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};

const END_MARKER: &str = "=== END PROMPT ===";

/// Parsed prompt sections keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    sections: HashMap<String, String>,
}

impl PromptLibrary {
    /// Parse prompt sections out of file content.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut sections = HashMap::new();
        let mut current_name: Option<String> = None;
        let mut current_body: Vec<&str> = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(name) = header_name(trimmed) {
                if let Some(open) = current_name.take() {
                    sections.insert(open, current_body.join("\n").trim().to_string());
                }
                current_body.clear();
                current_name = Some(name);
            } else if trimmed == END_MARKER {
                if let Some(open) = current_name.take() {
                    sections.insert(open, current_body.join("\n").trim().to_string());
                }
                current_body.clear();
            } else if current_name.is_some() {
                current_body.push(line);
            }
        }
        if let Some(open) = current_name {
            sections.insert(open, current_body.join("\n").trim().to_string());
        }

        Self { sections }
    }

    /// Load and parse a prompts file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or contains no
    /// sections.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompts file {}", path.display()))?;
        let library = Self::parse(&content);
        if library.sections.is_empty() {
            bail!("prompts file {} contains no sections", path.display());
        }
        Ok(library)
    }

    /// Resolve a prompt by name, falling back to `<NAME>_PROMPT`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        if let Some(prompt) = self.sections.get(name) {
            return Some(prompt);
        }
        self.sections
            .get(&format!("{name}_PROMPT"))
            .map(String::as_str)
    }

    /// Names of all parsed sections, unordered.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }
}

fn header_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("###")?.trim();
    if rest.is_empty() {
        return None;
    }
    let name = rest.strip_prefix("PROMPT:").map_or(rest, str::trim);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Substitute the page-number placeholder (`{page}` or `{PAGE_NUMBER}`).
#[must_use]
pub fn substitute_page_number(prompt: &str, page: usize) -> String {
    prompt
        .replace("{page}", &page.to_string())
        .replace("{PAGE_NUMBER}", &page.to_string())
}
