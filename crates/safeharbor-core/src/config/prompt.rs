//! Prompt-injection pattern configuration.
//!
//! Loaded from the `prompt_injection:` section of `prompt_patterns.yaml`.
//! Encoding patterns are kept as regex source strings; they are compiled by
//! the detector that uses them.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Keywords, phrases and encoding patterns that indicate an injection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPatterns {
    /// Words that instruct the reader to change behavior (`ignore`, `bypass`).
    #[serde(default = "default_instruction_keywords")]
    pub instruction_keywords: Vec<String>,

    /// Words that ask for elevated privileges (`admin`, `root`).
    #[serde(default = "default_privilege_keywords")]
    pub privilege_keywords: Vec<String>,

    /// Multi-word phrases matched as case-insensitive substrings.
    #[serde(default = "default_dangerous_phrases")]
    pub dangerous_phrases: Vec<String>,

    /// Regexes that detect escaped or encoded payloads.
    #[serde(default = "default_encoding_patterns")]
    pub encoding_patterns: Vec<String>,

    /// Phrases shorter than this are ignored.
    #[serde(default = "default_min_phrase_length")]
    pub min_phrase_length: usize,
}

impl Default for PromptPatterns {
    fn default() -> Self {
        Self {
            instruction_keywords: default_instruction_keywords(),
            privilege_keywords: default_privilege_keywords(),
            dangerous_phrases: default_dangerous_phrases(),
            encoding_patterns: default_encoding_patterns(),
            min_phrase_length: default_min_phrase_length(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompt_injection: PromptPatterns,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_instruction_keywords() -> Vec<String> {
    strings(&["ignore", "disable", "override", "bypass"])
}

fn default_privilege_keywords() -> Vec<String> {
    strings(&["admin", "root", "superuser"])
}

fn default_dangerous_phrases() -> Vec<String> {
    strings(&[
        "ignore previous instructions",
        "disable validation",
        "bypass security",
    ])
}

fn default_encoding_patterns() -> Vec<String> {
    strings(&[r"\\x[0-9a-fA-F]{2}", r"\\u[0-9a-fA-F]{4}"])
}

fn default_min_phrase_length() -> usize {
    10
}

impl PromptPatterns {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse the `prompt_injection:` section of a pattern file.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: PromptFile = serde_yaml::from_str(content)?;
        Ok(file.prompt_injection)
    }

    pub fn pattern_count(&self) -> usize {
        self.instruction_keywords.len()
            + self.privilege_keywords.len()
            + self.dangerous_phrases.len()
            + self.encoding_patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let patterns = PromptPatterns::default();
        assert_eq!(patterns.instruction_keywords.len(), 4);
        assert!(patterns.privilege_keywords.contains(&"root".to_string()));
        assert_eq!(patterns.min_phrase_length, 10);
        assert_eq!(patterns.pattern_count(), 12);
    }

    #[test]
    fn test_from_yaml_overrides_section() {
        let patterns = PromptPatterns::from_yaml(
            r#"
prompt_injection:
  instruction_keywords: [forget]
  min_phrase_length: 5
"#,
        )
        .unwrap();
        assert_eq!(patterns.instruction_keywords, vec!["forget".to_string()]);
        assert_eq!(patterns.min_phrase_length, 5);
        // Unset keys keep their defaults.
        assert_eq!(patterns.privilege_keywords, default_privilege_keywords());
    }
}
