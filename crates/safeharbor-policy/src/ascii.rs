//! Layer 0: ASCII input validation.
//!
//! Only printable ASCII (0x20-0x7E) plus tab, newline and carriage return may
//! appear in a query. Rejecting everything else up front removes homograph,
//! zero-width and bidirectional-override tricks before any parsing happens.

use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;

const PRINTABLE_MIN: u32 = 0x20;
const PRINTABLE_MAX: u32 = 0x7E;

/// Whether `c` may appear in query text or result values.
pub fn is_allowed_char(c: char) -> bool {
    matches!(c as u32, PRINTABLE_MIN..=PRINTABLE_MAX) || matches!(c, '\t' | '\n' | '\r')
}

fn offending(position: usize, c: char) -> ValidationError {
    let code_point = c as u32;
    if code_point > PRINTABLE_MAX {
        ValidationError::NonAsciiCharacter {
            position,
            character: c,
            code_point,
        }
    } else {
        ValidationError::InvalidControlCharacter {
            position,
            code_point,
        }
    }
}

/// Validate that `query` is non-empty and contains only allowed characters.
///
/// Positions are character indices, not byte offsets.
pub fn validate_ascii_input(
    query: &str,
    request_id: &str,
) -> Result<ValidationResult, ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    if let Some((position, c)) = query.chars().enumerate().find(|(_, c)| !is_allowed_char(*c)) {
        tracing::debug!(position, code_point = c as u32, "Disallowed character in query");
        return Err(offending(position, c));
    }

    Ok(ValidationResult::passed(
        request_id,
        Layer::AsciiInput,
        "ASCII input validation passed",
    ))
}

/// Every disallowed character as `(position, character, code_point)`.
pub fn non_ascii_positions(query: &str) -> Vec<(usize, char, u32)> {
    query
        .chars()
        .enumerate()
        .filter(|(_, c)| !is_allowed_char(*c))
        .map(|(i, c)| (i, c, c as u32))
        .collect()
}
