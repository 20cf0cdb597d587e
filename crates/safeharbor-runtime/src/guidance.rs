//! Educational guidance for rejected queries.
//!
//! A rejection tells the caller what was wrong; guidance explains the rule
//! behind it and shows a query shape that passes. Lookups are keyed purely
//! by error code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Explanation and example for one error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    pub educational_guidance: String,
    pub correct_pattern: Option<String>,
}

impl Guidance {
    pub fn new(educational_guidance: impl Into<String>, correct_pattern: Option<&str>) -> Self {
        Self {
            educational_guidance: educational_guidance.into(),
            correct_pattern: correct_pattern.map(str::to_string),
        }
    }
}

/// Source of guidance text.
pub trait GuidanceLookup: Send + Sync {
    fn guidance(&self, code: &str) -> Option<Guidance>;
}

impl GuidanceLookup for HashMap<String, Guidance> {
    fn guidance(&self, code: &str) -> Option<Guidance> {
        self.get(code).cloned()
    }
}

const GROUPED_QUERY: &str = "SELECT gender_concept_id,\n       COUNT(DISTINCT person_id) AS Count_Patients\nFROM person\nGROUP BY gender_concept_id";

/// Guidance shipped with the validator.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinGuidance;

impl GuidanceLookup for BuiltinGuidance {
    fn guidance(&self, code: &str) -> Option<Guidance> {
        let (text, pattern) = match code {
            "E001" => (
                "Queries may contain printable ASCII only. Look-alike Unicode letters and invisible characters can disguise identifiers, so they are rejected. Retype the reported character in plain ASCII.",
                Some("SELECT year_of_birth FROM person"),
            ),
            "E002" => (
                "Control characters other than newline, carriage return and tab are not allowed. Remove the reported character.",
                Some("SELECT year_of_birth,\n       gender_concept_id\nFROM person"),
            ),
            "E003" => ("Submit a non-empty SQL query.", Some(GROUPED_QUERY)),
            "E101" => (
                "Only tables of the approved OMOP CDM schema may be queried. Check the table name against the schema documentation.",
                Some("SELECT COUNT(DISTINCT person_id) AS Count_Patients\nFROM condition_occurrence"),
            ),
            "E102" => (
                "The column does not exist in the referenced table. Qualify columns with the table or alias they belong to and check their spelling.",
                Some("SELECT p.gender_concept_id\nFROM person p"),
            ),
            "E103" => (
                "Schema validation is enabled but no schema is loaded. Configure a schema file or disable the schema layer.",
                None,
            ),
            "E201" => (
                "The column holds a direct identifier (name, SSN, record number, contact detail, device or network identifier, biometric). Safe Harbor de-identification removes all of them; query coded, aggregate attributes instead.",
                Some(GROUPED_QUERY),
            ),
            "E202" => (
                "Geography finer than a state (street, city, county, ZIP, coordinates) identifies individuals. Use state-level or larger divisions.",
                Some("SELECT state_code,\n       COUNT(DISTINCT person_id) AS Count_Patients\nFROM person\nGROUP BY state_code"),
            ),
            "E203" => (
                "Only the year of a date may be used. Full dates, months and days are identifying; use year columns such as year_of_birth.",
                Some("SELECT year_of_birth,\n       COUNT(DISTINCT person_id) AS Count_Patients\nFROM person\nGROUP BY year_of_birth"),
            ),
            "E204" => (
                "SELECT * returns every column, including any that hold PHI. List the non-PHI columns you need explicitly.",
                Some(GROUPED_QUERY),
            ),
            "E301" => (
                "Results must be aggregated over at least one non-PHI dimension. Add a GROUP BY for every non-aggregate column, or select only aggregates.",
                Some(GROUPED_QUERY),
            ),
            "E302" | "E303" => (
                "Every query must count patients with exactly COUNT(DISTINCT person_id) AS Count_Patients. The minimum patient threshold is applied to that column, so its spelling and alias must match.",
                Some(GROUPED_QUERY),
            ),
            "E304" => (
                "Aggregate functions belong in the select list only. Filter on the aggregated result after it is returned instead of in WHERE or HAVING.",
                Some(GROUPED_QUERY),
            ),
            "E305" => (
                "Group by named columns. Positional references and grouping by the patient count are not allowed.",
                Some(GROUPED_QUERY),
            ),
            "E401" => (
                "Subqueries could aggregate below the minimum patient threshold before it is applied. Rewrite the query as a single SELECT.",
                Some(GROUPED_QUERY),
            ),
            "E402" => (
                "WITH clauses could aggregate below the minimum patient threshold before it is applied. Inline the logic into a single SELECT.",
                Some(GROUPED_QUERY),
            ),
            "E701" | "E702" => (
                "Comments and string literals may only describe the query or hold data values. Remove instruction-like text.",
                None,
            ),
            "E703" => (
                "References to privileged roles are not allowed in queries. Remove them from comments and strings.",
                None,
            ),
            "E704" => (
                "Escaped or encoded content is not allowed. Write values as plain ASCII text.",
                None,
            ),
            "E801" => (
                "The validator is misconfigured. Contact the administrator; the query itself was not evaluated.",
                None,
            ),
            "E802" => (
                "The query could not be parsed. Submit a single, syntactically valid SELECT statement.",
                Some(GROUPED_QUERY),
            ),
            "E803" => ("The result set contained non-ASCII data and was withheld.", None),
            "E804" => (
                "The result set exceeded the row limit. Group by fewer or coarser dimensions.",
                None,
            ),
            "E805" => (
                "A result row fell below the minimum patient count and the result set was withheld.",
                None,
            ),
            _ => return None,
        };
        Some(Guidance::new(text, pattern))
    }
}
