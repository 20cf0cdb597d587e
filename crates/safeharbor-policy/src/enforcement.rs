//! Layer 4: threshold enforcement.
//!
//! A validated query is wrapped so the database itself drops every group
//! below the minimum patient count:
//!
//! ```sql
//! SELECT * FROM (
//!     <validated query>
//! ) AS validated_query
//! WHERE Count_Patients >= 20000
//! ```
//!
//! The filter runs after the inner query's own `WHERE`, so nothing the caller
//! writes can lower the threshold. Subqueries and CTEs are rejected first
//! because either could hide an un-thresholded aggregate from the wrapper.

use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;
use regex::Regex;
use safeharbor_core::DEFAULT_MIN_PATIENT_COUNT;
use safeharbor_sql::{trim_trailing, SqlParser, Statement};
use std::sync::LazyLock;

static PARENTHESIZED_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*SELECT\s").expect("subquery pattern is valid")
});

static WRAPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)SELECT \* FROM \(\s*(.+?)\s*\) AS validated_query\s+WHERE Count_Patients >= \d+",
    )
    .expect("wrapper pattern is valid")
});

/// Rejects circumvention attempts and wraps queries with the threshold.
#[derive(Debug, Clone)]
pub struct Enforcer {
    min_patient_count: u64,
    parser: SqlParser,
}

impl Default for Enforcer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PATIENT_COUNT)
    }
}

impl Enforcer {
    pub fn new(min_patient_count: u64) -> Self {
        Self {
            min_patient_count,
            parser: SqlParser::default(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.parser = SqlParser::new(max_depth);
        self
    }

    pub fn min_patient_count(&self) -> u64 {
        self.min_patient_count
    }

    /// Reject CTEs (E402) and subqueries (E401).
    pub fn check_circumvention(
        &self,
        query: &str,
        request_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let statement = self.parser.parse(query)?;
        if statement.is_empty() {
            return Ok(ValidationResult::passed(
                request_id,
                Layer::Enforcement,
                "Enforcement validation passed (no statements to validate)",
            ));
        }

        if has_cte(&statement) {
            tracing::debug!("CTE rejected");
            return Err(ValidationError::CteNotAllowed);
        }
        if has_subquery(&statement, query) {
            tracing::debug!("Subquery rejected");
            return Err(ValidationError::SubqueryNotAllowed);
        }

        Ok(ValidationResult::passed(
            request_id,
            Layer::Enforcement,
            "Enforcement validation passed - no circumvention attempts detected",
        ))
    }

    /// Wrap a validated query with the patient count filter. Trailing
    /// whitespace, comments and semicolons are dropped first.
    pub fn wrap(&self, query: &str) -> String {
        let query = trim_trailing(query)
            .unwrap_or_else(|_| query.trim_end_matches(|c: char| c == ';' || c.is_whitespace()));
        format!(
            "SELECT * FROM (\n    {query}\n) AS validated_query\nWHERE Count_Patients >= {}",
            self.min_patient_count
        )
    }
}

/// Recover the inner query from a wrapped one. Input that is not wrapped is
/// returned unchanged.
pub fn unwrap(wrapped: &str) -> &str {
    WRAPPED
        .captures(wrapped)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim())
        .unwrap_or(wrapped)
}

fn has_cte(statement: &Statement) -> bool {
    statement.significant().any(|node| node.is_keyword("WITH"))
}

fn has_subquery(statement: &Statement, query: &str) -> bool {
    statement.count_keyword("SELECT") > 1 || PARENTHESIZED_SELECT.is_match(&query.to_uppercase())
}
