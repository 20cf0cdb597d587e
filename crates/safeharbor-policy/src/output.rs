//! Layer 8: result-set validation.
//!
//! Runs after the wrapped query has been executed elsewhere, as the last
//! check before rows leave the system. Rows are JSON objects keyed by column
//! name.

use crate::ascii::is_allowed_char;
use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;
use regex::Regex;
use safeharbor_core::DEFAULT_MIN_PATIENT_COUNT;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Default cap on returned rows.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Characters of a flagged value kept in a warning.
const WARNING_VALUE_LEN: usize = 50;

const PATIENT_COUNT_COLUMN: &str = "Count_Patients";

/// Value shapes that look like PHI, most specific first.
static PHI_SHAPES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("ssn_pattern", r"^\d{3}-\d{2}-\d{4}$"),
        ("phone_pattern", r"^\d{3}-\d{3}-\d{4}$"),
        ("date_pattern", r"^\d{4}-\d{2}-\d{2}"),
        ("email_pattern", r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"),
        ("zip_pattern", r"^\d{5}(-\d{4})?$"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("PHI shape pattern is valid")))
    .collect()
});

/// A string value that resembles PHI. Reported, never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputWarning {
    pub row: usize,
    pub column: String,
    pub pattern: &'static str,
    pub value: String,
}

/// Name of the PHI shape `value` matches, if any.
pub fn phi_shape(value: &str) -> Option<&'static str> {
    PHI_SHAPES
        .iter()
        .find(|(_, re)| re.is_match(value))
        .map(|(name, _)| *name)
}

/// Numeric value of a `Count_Patients` cell, numeric strings included.
fn patient_count(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|c| c.is_finite()),
        other => other.as_f64(),
    }
}

/// Validates executed result sets.
#[derive(Debug, Clone)]
pub struct OutputValidator {
    min_patient_count: u64,
    max_rows: usize,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PATIENT_COUNT, DEFAULT_MAX_ROWS)
    }
}

impl OutputValidator {
    pub fn new(min_patient_count: u64, max_rows: usize) -> Self {
        Self {
            min_patient_count,
            max_rows,
        }
    }

    pub fn validate(
        &self,
        rows: &[Map<String, Value>],
        request_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        if rows.len() > self.max_rows {
            return Err(ValidationError::TooManyRows {
                row_count: rows.len(),
                max_rows: self.max_rows,
            });
        }

        if rows.is_empty() {
            return Ok(ValidationResult::passed(
                request_id,
                Layer::AsciiOutput,
                "ASCII output validation passed (empty result set)",
            )
            .with_details(json!({ "row_count": 0, "warnings": [] })));
        }

        let mut warnings = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            for (column, value) in row {
                let text = match value {
                    Value::Null => continue,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };

                if let Some(c) = text.chars().find(|c| !is_allowed_char(*c)) {
                    return Err(ValidationError::NonAsciiOutput {
                        column: column.clone(),
                        row: row_index,
                        char_code: c as u32,
                    });
                }

                // Only strings are matched against PHI shapes.
                if !value.is_string() {
                    continue;
                }
                if let Some(pattern) = phi_shape(&text) {
                    warnings.push(OutputWarning {
                        row: row_index,
                        column: column.clone(),
                        pattern,
                        value: text.chars().take(WARNING_VALUE_LEN).collect(),
                    });
                }
            }

            let count = row.get(PATIENT_COUNT_COLUMN).and_then(patient_count);
            if let Some(count) = count.filter(|c| *c < self.min_patient_count as f64) {
                return Err(ValidationError::PatientCountBelowThreshold {
                    row: row_index,
                    count: count.max(0.0) as u64,
                    threshold: self.min_patient_count,
                });
            }
        }

        if !warnings.is_empty() {
            tracing::warn!(count = warnings.len(), "Result values resemble PHI");
        }

        Ok(
            ValidationResult::passed(request_id, Layer::AsciiOutput, "ASCII output validation passed")
                .with_details(json!({
                    "row_count": rows.len(),
                    "column_count": rows.first().map(Map::len).unwrap_or_default(),
                    "warnings": warnings,
                })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_clean_rows_pass() {
        let result = OutputValidator::default()
            .validate(
                &rows(json!([
                    { "gender_concept_id": 8507, "Count_Patients": 25000 },
                    { "gender_concept_id": 8532, "Count_Patients": 31000 },
                ])),
                "r",
            )
            .unwrap();
        let details = result.details.unwrap();
        assert_eq!(details["row_count"], 2);
        assert_eq!(details["column_count"], 2);
        assert_eq!(details["warnings"], json!([]));
    }

    #[test]
    fn test_empty_result_set() {
        let result = OutputValidator::default().validate(&[], "r").unwrap();
        assert_eq!(result.details.unwrap()["row_count"], 0);
    }

    #[test]
    fn test_too_many_rows() {
        let data = vec![Map::new(); 3];
        let err = OutputValidator::new(1, 2).validate(&data, "r").unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooManyRows {
                row_count: 3,
                max_rows: 2
            }
        );
    }

    #[test]
    fn test_non_ascii_value() {
        let err = OutputValidator::new(1, 10)
            .validate(&rows(json!([{ "a": "ok" }, { "a": "caf\u{e9}" }])), "r")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonAsciiOutput {
                column: "a".into(),
                row: 1,
                char_code: 0xE9
            }
        );
    }

    #[test]
    fn test_count_below_threshold() {
        let err = OutputValidator::default()
            .validate(&rows(json!([{ "Count_Patients": 150 }])), "r")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::PatientCountBelowThreshold {
                row: 0,
                count: 150,
                threshold: 20000
            }
        );
    }

    #[test]
    fn test_count_as_numeric_string() {
        let err = OutputValidator::default()
            .validate(
                &rows(json!([
                    { "Count_Patients": "25000" },
                    { "Count_Patients": " 150 " }
                ])),
                "r",
            )
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::PatientCountBelowThreshold {
                row: 1,
                count: 150,
                threshold: 20000
            }
        );

        // Text that is not a number is left to the other checks.
        OutputValidator::default()
            .validate(&rows(json!([{ "Count_Patients": "many" }])), "r")
            .unwrap();
    }

    #[test]
    fn test_phi_shaped_values_warn() {
        let result = OutputValidator::new(1, 10)
            .validate(
                &rows(json!([
                    { "a": "123-45-6789", "b": 12345, "c": "1980-01-01", "d": "x@example.org" }
                ])),
                "r",
            )
            .unwrap();
        let warnings = &result.details.unwrap()["warnings"];
        let patterns: Vec<_> = warnings
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["pattern"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(patterns, vec!["ssn_pattern", "date_pattern", "email_pattern"]);
    }

    #[test]
    fn test_phi_shape_order() {
        assert_eq!(phi_shape("555-123-4567"), Some("phone_pattern"));
        assert_eq!(phi_shape("02139-1234"), Some("zip_pattern"));
        assert_eq!(phi_shape("Male"), None);
    }
}
