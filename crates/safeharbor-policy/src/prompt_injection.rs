//! Layer 7: prompt-injection detection.
//!
//! Queries are often written or relayed by language models, so free text
//! inside a query is a channel for instructions aimed at whatever reads it
//! next. Only comments and string literals carry free text; both are scanned
//! against configurable keyword, phrase and encoding patterns.

use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;
use regex::Regex;
use safeharbor_core::PromptPatterns;
use safeharbor_sql::SqlParser;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"));

/// Where a piece of scanned text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOrigin {
    Comment,
    StringLiteral,
}

impl fmt::Display for TextOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextOrigin::Comment => f.write_str("comment"),
            TextOrigin::StringLiteral => f.write_str("string"),
        }
    }
}

/// Compiled prompt-injection patterns.
#[derive(Debug, Clone)]
pub struct PromptInjectionDetector {
    instruction_keywords: HashSet<String>,
    privilege_keywords: HashSet<String>,
    dangerous_phrases: Vec<String>,
    encoding_patterns: Vec<Regex>,
    min_phrase_length: usize,
    parser: SqlParser,
}

impl PromptInjectionDetector {
    /// Compile `patterns`. An invalid encoding regex is a configuration error.
    pub fn new(patterns: &PromptPatterns) -> Result<Self, ValidationError> {
        fn lower(items: &[String]) -> HashSet<String> {
            items.iter().map(|s| s.to_lowercase()).collect()
        }
        let encoding_patterns = patterns
            .encoding_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){p}")).map_err(|e| {
                    ValidationError::configuration(
                        "prompt_patterns.yaml",
                        format!("invalid encoding pattern '{p}': {e}"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            instruction_keywords: lower(&patterns.instruction_keywords),
            privilege_keywords: lower(&patterns.privilege_keywords),
            dangerous_phrases: patterns
                .dangerous_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            encoding_patterns,
            min_phrase_length: patterns.min_phrase_length,
            parser: SqlParser::default(),
        })
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.parser = SqlParser::new(max_depth);
        self
    }

    /// Check one comment body or string literal.
    ///
    /// Phrases are checked first, then individual words, then encodings.
    pub fn check_text(&self, text: &str, origin: TextOrigin) -> Result<(), ValidationError> {
        let lower = text.to_lowercase();

        let instruction = |pattern: &str| match origin {
            TextOrigin::Comment => ValidationError::InstructionInComment {
                comment: text.to_string(),
                pattern: pattern.to_string(),
            },
            TextOrigin::StringLiteral => ValidationError::InstructionInString {
                string: text.to_string(),
                pattern: pattern.to_string(),
            },
        };

        if let Some(phrase) = self
            .dangerous_phrases
            .iter()
            .find(|p| p.len() >= self.min_phrase_length && lower.contains(p.as_str()))
        {
            tracing::debug!(%origin, "Dangerous phrase detected");
            return Err(instruction(phrase));
        }

        for word in WORD.find_iter(&lower).map(|m| m.as_str()) {
            if self.instruction_keywords.contains(word) {
                tracing::debug!(%origin, "Instruction keyword detected");
                return Err(instruction(word));
            }
            if self.privilege_keywords.contains(word) {
                tracing::debug!(%origin, "Privilege keyword detected");
                return Err(ValidationError::PrivilegeEscalation {
                    text: text.to_string(),
                    keyword: word.to_string(),
                });
            }
        }

        if let Some(pattern) = self.encoding_patterns.iter().find(|p| p.is_match(text)) {
            tracing::debug!(%origin, "Encoded content detected");
            let source = pattern.as_str();
            return Err(ValidationError::ObfuscationDetected {
                text: text.to_string(),
                pattern: source.strip_prefix("(?i)").unwrap_or(source).to_string(),
            });
        }

        Ok(())
    }

    /// Scan every comment, then every string literal, in `query`.
    pub fn validate(
        &self,
        query: &str,
        request_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let statement = self.parser.parse(query)?;

        for comment in statement.comments().into_iter().filter(|c| !c.is_empty()) {
            self.check_text(comment, TextOrigin::Comment)?;
        }
        for literal in statement.string_literals().into_iter().filter(|s| !s.is_empty()) {
            self.check_text(literal, TextOrigin::StringLiteral)?;
        }

        Ok(ValidationResult::passed(
            request_id,
            Layer::PromptInjection,
            "Prompt injection validation passed",
        ))
    }
}
