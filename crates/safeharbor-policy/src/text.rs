//! Text-level helpers shared by the regex-based checks.

/// Collapse every run of whitespace into one space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
