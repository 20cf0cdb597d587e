//! Layer 3: aggregation enforcement.
//!
//! Aggregation is what de-identifies a result set, so every query must:
//!
//! 1. carry the patient count exactly as `COUNT(DISTINCT person_id) AS Count_Patients`,
//! 2. group by at least one dimension unless it is a global aggregate,
//! 3. use aggregate functions only in the select list,
//! 4. group by named columns, not positions or the count alias.
//!
//! The row threshold itself is applied by the enforcement wrapper.

use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;
use safeharbor_sql::{with_clauses, Clause, Node, SqlParser, Statement};
use serde_json::json;

/// Alias the patient count column must carry, compared case-sensitively.
pub const PATIENT_COUNT_ALIAS: &str = "Count_Patients";

const AGGREGATE_FUNCTIONS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "STDDEV", "VARIANCE"];

/// `COUNT(DISTINCT person_id)`, optionally qualified. With `distinct` unset,
/// matches the form that forgot `DISTINCT`.
fn is_person_count(node: &Node, distinct: bool) -> bool {
    let Node::Function { name, args } = node else {
        return false;
    };
    if name.is_qualified() || !name.real_name().eq_ignore_ascii_case("COUNT") {
        return false;
    }
    let args: Vec<&Node> = args.iter().filter(|n| !n.is_trivia()).collect();
    let column = match (distinct, args.as_slice()) {
        (true, [keyword, Node::Name(column)]) if keyword.is_keyword("DISTINCT") => column,
        (false, [Node::Name(column)]) => column,
        _ => return false,
    };
    column.parts.len() <= 2 && column.real_name().eq_ignore_ascii_case("person_id")
}

fn malformed(found: &Node) -> ValidationError {
    ValidationError::InvalidPatientCountSyntax {
        found_syntax: found.to_string(),
    }
}

/// `Ok(true)` when the select list carries the exact patient count,
/// `Ok(false)` when no attempt at one was made, and E303 for anything close
/// but wrong. Only top-level select items count, so text in comments or
/// string literals never satisfies the check.
fn check_patient_count(select_items: &[Node]) -> Result<bool, ValidationError> {
    let mut found = false;
    for item in select_items {
        let Node::Aliased { expr, alias } = item else {
            continue;
        };
        if is_person_count(expr, true) {
            if alias != PATIENT_COUNT_ALIAS {
                return Err(malformed(item));
            }
            found = true;
        } else if alias.eq_ignore_ascii_case(PATIENT_COUNT_ALIAS) {
            // Nothing else may be named Count_Patients.
            return Err(malformed(item));
        }
    }
    if found {
        return Ok(true);
    }

    // Near misses: the count without DISTINCT, or without its alias.
    let mut near_miss = None;
    for item in select_items {
        item.visit(&mut |n| {
            if near_miss.is_none() && (is_person_count(n, false) || is_person_count(n, true)) {
                near_miss = Some(n);
            }
        });
    }
    match near_miss {
        Some(node) => Err(malformed(node)),
        None => Ok(false),
    }
}

/// Whether `query` carries the required patient count column.
pub fn has_required_patient_count(query: &str) -> bool {
    SqlParser::default()
        .parse(query)
        .is_ok_and(|statement| {
            matches!(check_patient_count(&Shape::of(&statement).select_items), Ok(true))
        })
}

fn is_aggregate(node: &Node) -> bool {
    match node {
        Node::Function { name, .. } => AGGREGATE_FUNCTIONS
            .iter()
            .any(|f| f.eq_ignore_ascii_case(name.real_name())),
        _ => false,
    }
}

fn contains_aggregate(node: &Node) -> bool {
    let mut found = false;
    node.visit(&mut |n| found |= is_aggregate(n));
    found
}

/// Items of a clause body: the members of a list, or the node itself.
fn items(node: &Node) -> &[Node] {
    match node {
        Node::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

/// What the top level of a statement says about its aggregation.
#[derive(Debug, Default)]
struct Shape {
    has_group_by: bool,
    select_items: Vec<Node>,
    select_aggregates: usize,
    select_regular_columns: Vec<String>,
    group_by_columns: Vec<String>,
    group_by_items: Vec<Node>,
    /// `(function, clause)` of the first aggregate outside the select list.
    misplaced: Option<(String, Clause)>,
}

impl Shape {
    fn of(statement: &Statement) -> Self {
        let mut shape = Shape {
            has_group_by: statement.count_keyword("GROUP") > 0,
            ..Shape::default()
        };

        for (clause, node) in with_clauses(statement.nodes(), Clause::Other) {
            if matches!(node, Node::Keyword(_) | Node::Punctuation(_)) {
                continue;
            }
            match clause {
                Clause::Select => {
                    for item in items(node).iter().filter(|n| !n.is_trivia()) {
                        shape.select_items.push(item.clone());
                        if contains_aggregate(item) {
                            shape.select_aggregates += 1;
                        } else if !matches!(item, Node::Keyword(_) | Node::Punctuation(_)) {
                            shape.select_regular_columns.push(item.to_string());
                        }
                    }
                }
                Clause::GroupBy => {
                    for item in items(node).iter().filter(|n| !n.is_trivia()) {
                        if !matches!(item, Node::Punctuation(_)) {
                            shape.group_by_columns.push(item.to_string());
                            shape.group_by_items.push(item.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        shape.misplaced = find_misplaced(statement.nodes(), Clause::Other, false);
        shape
    }

    fn is_global_aggregate(&self, has_patient_count: bool) -> bool {
        (self.select_aggregates > 0 || has_patient_count)
            && !self.has_group_by
            && self.select_regular_columns.is_empty()
    }
}

/// First aggregate that sits outside a select list, searching every level.
fn find_misplaced(nodes: &[Node], start: Clause, in_function: bool) -> Option<(String, Clause)> {
    for (clause, node) in with_clauses(nodes, start) {
        let clause = if in_function { start } else { clause };
        if is_aggregate(node) && clause != Clause::Select {
            return Some((node.to_string(), clause));
        }
        let found = match node {
            Node::Function { args, .. } => find_misplaced(args, clause, true),
            Node::Parenthesis(inner) => find_misplaced(inner, clause, false),
            other => find_misplaced(other.children(), clause, in_function),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn check_group_by_item(item: &Node) -> Result<(), ValidationError> {
    let target = match item {
        Node::Expression(nodes) => nodes.iter().find(|n| !n.is_trivia()).unwrap_or(item),
        other => other,
    };
    match target {
        Node::Number(n) => Err(ValidationError::InvalidGroupByColumn {
            column_name: n.clone(),
            reason: "positional references are not allowed; name the column explicitly"
                .to_string(),
        }),
        Node::Name(name) if name.real_name().eq_ignore_ascii_case(PATIENT_COUNT_ALIAS) => {
            Err(ValidationError::InvalidGroupByColumn {
                column_name: name.to_string(),
                reason: "cannot group by the patient count".to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Validates aggregation requirements.
#[derive(Debug, Clone, Default)]
pub struct AggregationValidator {
    parser: SqlParser,
}

impl AggregationValidator {
    pub fn new() -> Self {
        Self::default()
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
                Layer::Aggregation,
                "Aggregation validation passed (no statements to validate)",
            ));
        }

        let shape = Shape::of(&statement);

        let has_patient_count = check_patient_count(&shape.select_items)?;
        if !has_patient_count {
            return Err(ValidationError::MissingPatientCount);
        }

        if !shape.has_group_by && !shape.is_global_aggregate(has_patient_count) {
            tracing::debug!(
                regular_columns = shape.select_regular_columns.len(),
                "GROUP BY missing"
            );
            return Err(ValidationError::MissingGroupBy);
        }

        if let Some((function, clause)) = shape.misplaced {
            tracing::debug!(%function, %clause, "Aggregate outside SELECT");
            return Err(ValidationError::AggregateInNonSelect {
                clause: clause.as_str().to_string(),
                function,
            });
        }

        for item in &shape.group_by_items {
            check_group_by_item(item)?;
        }

        Ok(
            ValidationResult::passed(request_id, Layer::Aggregation, "Aggregation validation passed")
                .with_details(json!({ "group_by_columns": shape.group_by_columns })),
        )
    }
}

/// Columns listed in the top-level `GROUP BY`, as written.
pub fn extract_group_by_columns(statement: &Statement) -> Vec<String> {
    Shape::of(statement).group_by_columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validate(query: &str) -> Result<ValidationResult, ValidationError> {
        AggregationValidator::new().validate(query, "req-test")
    }

    #[test]
    fn test_valid_grouped_query() {
        let result = validate(
            "SELECT gender_concept_id, COUNT(DISTINCT person_id) AS Count_Patients \
             FROM person GROUP BY gender_concept_id",
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(
            result.details.unwrap()["group_by_columns"],
            json!(["gender_concept_id"])
        );
    }

    #[test]
    fn test_qualified_person_id() {
        validate(
            "SELECT p.gender_concept_id, COUNT(DISTINCT p.person_id) AS Count_Patients \
             FROM person p GROUP BY p.gender_concept_id",
        )
        .unwrap();
    }

    #[test]
    fn test_global_aggregate_needs_no_group_by() {
        validate("SELECT COUNT(DISTINCT person_id) AS Count_Patients FROM person").unwrap();
    }

    #[test]
    fn test_missing_group_by() {
        let err = validate(
            "SELECT gender_concept_id, COUNT(DISTINCT person_id) AS Count_Patients FROM person",
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingGroupBy);
    }

    #[test]
    fn test_missing_patient_count() {
        let err = validate("SELECT gender_concept_id FROM person GROUP BY gender_concept_id")
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingPatientCount);
    }

    #[test]
    fn test_wrong_alias_case() {
        let err = validate(
            "SELECT year_of_birth, COUNT(DISTINCT person_id) AS count_patients \
             FROM person GROUP BY year_of_birth",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPatientCountSyntax {
                found_syntax: "COUNT(DISTINCT person_id) AS count_patients".into()
            }
        );
    }

    #[test]
    fn test_missing_distinct() {
        let err = validate(
            "SELECT year_of_birth, COUNT(person_id) AS Count_Patients FROM person GROUP BY year_of_birth",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPatientCountSyntax {
                found_syntax: "COUNT(person_id) AS Count_Patients".into()
            }
        );
    }

    #[test]
    fn test_count_inside_comment_does_not_count() {
        let err = validate(
            "SELECT gender_concept_id, 99999 AS Count_Patients FROM person \
             GROUP BY gender_concept_id -- COUNT(DISTINCT person_id) AS Count_Patients",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPatientCountSyntax {
                found_syntax: "99999 AS Count_Patients".into()
            }
        );

        let err = validate(
            "SELECT gender_concept_id FROM person GROUP BY gender_concept_id \
             /* COUNT(DISTINCT person_id) AS Count_Patients */",
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingPatientCount);
    }

    #[test]
    fn test_count_inside_string_literal_does_not_count() {
        let err = validate(
            "SELECT gender_concept_id FROM person \
             WHERE 'COUNT(DISTINCT person_id) AS Count_Patients' <> '' \
             GROUP BY gender_concept_id",
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingPatientCount);
    }

    #[test]
    fn test_other_column_named_count_patients() {
        let err = validate(
            "SELECT gender_concept_id, COUNT(DISTINCT person_id) AS Count_Patients, \
             year_of_birth AS count_patients FROM person GROUP BY gender_concept_id, year_of_birth",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPatientCountSyntax {
                found_syntax: "year_of_birth AS count_patients".into()
            }
        );
    }

    #[test]
    fn test_count_must_be_a_select_item() {
        let err = validate(
            "SELECT gender_concept_id, COUNT(DISTINCT person_id) * 2 AS Count_Patients \
             FROM person GROUP BY gender_concept_id",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E303");
    }

    #[test]
    fn test_missing_alias() {
        let err = validate(
            "SELECT year_of_birth, COUNT(DISTINCT person_id) FROM person GROUP BY year_of_birth",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E303");
    }

    #[test]
    fn test_patient_count_spanning_lines() {
        validate(
            "SELECT year_of_birth,\n  COUNT(\n    DISTINCT person_id\n  )\n  AS Count_Patients\nFROM person\nGROUP BY year_of_birth",
        )
        .unwrap();
    }

    #[test]
    fn test_aggregate_in_having() {
        let err = validate(
            "SELECT year_of_birth, COUNT(DISTINCT person_id) AS Count_Patients FROM person \
             GROUP BY year_of_birth HAVING COUNT(DISTINCT person_id) > 100",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E304");
        assert_eq!(err.details()["clause"], "HAVING");
    }

    #[test]
    fn test_aggregate_in_where() {
        let err = validate(
            "SELECT year_of_birth, COUNT(DISTINCT person_id) AS Count_Patients FROM person \
             WHERE SUM(year_of_birth) > 1 GROUP BY year_of_birth",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E304");
        assert_eq!(err.details()["clause"], "WHERE");
    }

    #[test]
    fn test_positional_group_by() {
        let err = validate(
            "SELECT year_of_birth, COUNT(DISTINCT person_id) AS Count_Patients FROM person GROUP BY 1",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E305");
        assert_eq!(err.details()["column_name"], "1");
    }

    #[test]
    fn test_group_by_count_alias() {
        let err = validate(
            "SELECT year_of_birth, COUNT(DISTINCT person_id) AS Count_Patients FROM person \
             GROUP BY year_of_birth, Count_Patients",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E305");
    }

    #[test]
    fn test_group_by_columns_extracted() {
        let stmt = SqlParser::default()
            .parse("SELECT a, b FROM t GROUP BY a, b ORDER BY a")
            .unwrap();
        assert_eq!(extract_group_by_columns(&stmt), vec!["a", "b"]);
    }

    #[test]
    fn test_has_required_patient_count() {
        assert!(has_required_patient_count(
            "select count(distinct person_id) as Count_Patients from person"
        ));
        assert!(!has_required_patient_count(
            "SELECT COUNT(DISTINCT person_id) AS total FROM person"
        ));
        assert!(!has_required_patient_count(
            "SELECT 1 AS n FROM person -- COUNT(DISTINCT person_id) AS Count_Patients"
        ));
    }
}
