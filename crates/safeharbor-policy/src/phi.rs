//! Layer 2: PHI column validation.
//!
//! Rejects `SELECT *` and any reference to a column whose name is a known
//! PHI identifier, wherever it appears (select list, filters, joins,
//! grouping, ordering). String literals and comments are data, not column
//! references, and are never checked.

use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;
use crate::text::normalize_whitespace;
use regex::Regex;
use safeharbor_core::{PhiCatalog, PhiCategory};
use safeharbor_sql::{with_clauses, Clause, Name, Node, SqlParser, Statement};
use std::sync::{Arc, LazyLock};

static SELECT_STAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bSELECT\s*\*\s*FROM\b").expect("SELECT * pattern is valid")
});

/// Validates queries against a [`PhiCatalog`].
#[derive(Debug, Clone)]
pub struct PhiValidator {
    catalog: Arc<PhiCatalog>,
    parser: SqlParser,
}

impl PhiValidator {
    pub fn new(catalog: Arc<PhiCatalog>) -> Self {
        Self {
            catalog,
            parser: SqlParser::default(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.parser = SqlParser::new(max_depth);
        self
    }

    pub fn validate(
        &self,
        query: &str,
        request_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let statement = self.parser.parse(query)?;
        if statement.is_empty() {
            return Ok(ValidationResult::passed(
                request_id,
                Layer::Phi,
                "PHI validation passed (no tokens to validate)",
            ));
        }

        if SELECT_STAR.is_match(&normalize_whitespace(&query.to_uppercase()))
            || has_select_wildcard(&statement)
        {
            tracing::debug!("SELECT * rejected");
            return Err(ValidationError::SelectStar);
        }

        self.check_level(statement.nodes(), Clause::Select, false)?;

        Ok(ValidationResult::passed(
            request_id,
            Layer::Phi,
            "PHI validation passed - no prohibited identifiers detected",
        ))
    }

    fn check_level(
        &self,
        nodes: &[Node],
        start: Clause,
        in_function: bool,
    ) -> Result<(), ValidationError> {
        for (clause, node) in with_clauses(nodes, start) {
            let clause = if in_function && clause.is_table_source() {
                start
            } else {
                clause
            };
            match node {
                Node::Name(name) if !clause.is_table_source() => {
                    self.check_name(name, clause)?;
                }
                Node::Function { args, .. } => self.check_level(args, clause, true)?,
                Node::Parenthesis(inner) => self.check_level(inner, clause, false)?,
                Node::Aliased { .. } | Node::List(_) | Node::Expression(_) | Node::Where(_) => {
                    self.check_level(node.children(), clause, in_function)?;
                }
                Node::Name(_)
                | Node::Keyword(_)
                | Node::Wildcard(_)
                | Node::Comment(_)
                | Node::StringLiteral(_)
                | Node::Number(_)
                | Node::Operator(_)
                | Node::Punctuation(_)
                | Node::Whitespace(_) => {}
            }
        }
        Ok(())
    }

    fn check_name(&self, name: &Name, clause: Clause) -> Result<(), ValidationError> {
        let column = name.real_name();
        let Some(category) = self.catalog.category_of(column) else {
            return Ok(());
        };

        tracing::debug!(column = %column, clause = %clause, ?category, "PHI identifier rejected");
        let column_name = column.to_string();
        let clause = clause.as_str().to_string();
        Err(match category {
            PhiCategory::Direct => ValidationError::DirectPhiIdentifier {
                identifier_type: PhiCatalog::identifier_type(column).to_string(),
                column_name,
                clause,
            },
            PhiCategory::Geographic => ValidationError::GeographicPhi {
                column_name,
                clause,
            },
            PhiCategory::Date => ValidationError::DatePhi {
                column_name,
                clause,
            },
        })
    }
}

/// A bare or qualified `*` in a select list (not inside a function call).
fn has_select_wildcard(statement: &Statement) -> bool {
    fn level(nodes: &[Node], start: Clause) -> bool {
        with_clauses(nodes, start)
            .into_iter()
            .any(|(clause, node)| match node {
                Node::Wildcard(_) => clause == Clause::Select,
                Node::Function { .. } => false,
                Node::Parenthesis(inner) => level(inner, clause),
                other => level(other.children(), clause),
            })
    }
    level(statement.nodes(), Clause::Select)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validate(query: &str) -> Result<ValidationResult, ValidationError> {
        PhiValidator::new(Arc::new(PhiCatalog::default())).validate(query, "req-test")
    }

    #[test]
    fn test_clean_query_passes() {
        let result = validate(
            "SELECT gender_concept_id, year_of_birth, COUNT(DISTINCT person_id) AS Count_Patients \
             FROM person GROUP BY gender_concept_id, year_of_birth",
        )
        .unwrap();
        assert!(result.success);
    }

    #[test]
    fn test_select_star() {
        assert_eq!(validate("SELECT * FROM person").unwrap_err(), ValidationError::SelectStar);
        assert_eq!(
            validate("select\n*\nfrom person").unwrap_err(),
            ValidationError::SelectStar
        );
        assert_eq!(
            validate("SELECT p.* FROM person p").unwrap_err(),
            ValidationError::SelectStar
        );
    }

    #[test]
    fn test_count_star_is_not_select_star() {
        validate("SELECT year_of_birth, COUNT(*) FROM person GROUP BY year_of_birth").unwrap();
    }

    #[test]
    fn test_direct_identifier_in_select() {
        let err = validate(
            "SELECT patient_name, COUNT(DISTINCT person_id) AS Count_Patients FROM person GROUP BY patient_name",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DirectPhiIdentifier {
                column_name: "patient_name".into(),
                identifier_type: "name (Category 1)".into(),
                clause: "SELECT".into(),
            }
        );
    }

    #[test]
    fn test_qualified_and_aliased_identifiers() {
        let err = validate("SELECT p.SSN AS x FROM person p").unwrap_err();
        assert_eq!(err.code(), "E201");
        assert_eq!(err.details()["column_name"], "SSN");
    }

    #[test]
    fn test_geographic_in_where() {
        let err = validate("SELECT a FROM location WHERE zip = '02139'").unwrap_err();
        assert_eq!(
            err,
            ValidationError::GeographicPhi {
                column_name: "zip".into(),
                clause: "WHERE".into(),
            }
        );
    }

    #[test]
    fn test_date_in_group_by() {
        let err = validate("SELECT COUNT(DISTINCT person_id) AS Count_Patients FROM person GROUP BY month_of_birth")
            .unwrap_err();
        assert_eq!(err.code(), "E203");
        assert_eq!(err.details()["clause"], "GROUP BY");
    }

    #[test]
    fn test_identifier_inside_function() {
        let err = validate("SELECT MAX(birth_date) FROM person").unwrap_err();
        assert_eq!(err.code(), "E203");
    }

    #[test]
    fn test_join_condition() {
        let err = validate(
            "SELECT COUNT(DISTINCT p.person_id) AS Count_Patients FROM person p \
             JOIN note n ON n.mrn = p.person_source_value",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E201");
        assert_eq!(err.details()["clause"], "ON");
    }

    #[test]
    fn test_string_literal_is_exempt() {
        validate("SELECT gender_source_value FROM person WHERE gender_source_value = 'patient_name'")
            .unwrap();
    }

    #[test]
    fn test_table_names_are_not_columns() {
        let catalog = PhiCatalog::new(["email"], Vec::<&str>::new(), Vec::<&str>::new());
        PhiValidator::new(Arc::new(catalog))
            .validate("SELECT a FROM email", "r")
            .unwrap();
    }

    #[test]
    fn test_direct_wins_over_geographic() {
        // `name` is direct, `city` geographic; the first reference decides.
        let err = validate("SELECT city, name FROM location").unwrap_err();
        assert_eq!(err.code(), "E202");
        let err = validate("SELECT name, city FROM location").unwrap_err();
        assert_eq!(err.code(), "E201");
    }
}
