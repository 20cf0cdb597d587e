//! Layer 1: schema validation.
//!
//! Checks that every table and column a query references exists in the
//! approved schema. Runs in two passes over the token tree:
//!
//! 1. collect tables from `FROM`/`JOIN` (schema prefixes stripped, aliases
//!    recorded) and reject unknown ones
//! 2. check every column reference outside `FROM`/`JOIN`

use crate::error::{Layer, ValidationError};
use crate::result::ValidationResult;
use safeharbor_core::SchemaCatalog;
use safeharbor_sql::{with_clauses, Clause, Name, Node, SqlParser};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Words that look like identifiers but never name a column.
const NON_COLUMN_WORDS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "distinct", "as", "asc", "desc", "null", "true", "false",
    // niladic builtins, written without parentheses
    "current_date", "current_time", "current_timestamp", "localtime", "localtimestamp",
];

/// Tables, table aliases and select-list aliases of one query.
#[derive(Debug, Default)]
struct QueryScope {
    tables: BTreeSet<String>,
    table_aliases: HashMap<String, String>,
    column_aliases: HashSet<String>,
}

impl QueryScope {
    fn add_table(&mut self, name: &Name, alias: Option<&str>) {
        let table = name.real_name().to_lowercase();
        if let Some(alias) = alias {
            self.table_aliases.insert(alias.to_lowercase(), table.clone());
        }
        self.tables.insert(table);
    }

    fn resolve(&self, qualifier: &str) -> String {
        let qualifier = qualifier.to_lowercase();
        self.table_aliases
            .get(&qualifier)
            .cloned()
            .unwrap_or(qualifier)
    }
}

/// Validates table and column references against a [`SchemaCatalog`].
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    catalog: Arc<SchemaCatalog>,
    parser: SqlParser,
    verbose_errors: bool,
}

impl SchemaValidator {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            parser: SqlParser::default(),
            verbose_errors: true,
        }
    }

    /// Bound the nesting depth accepted while parsing and walking.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.parser = SqlParser::new(max_depth);
        self
    }

    /// Whether errors list the valid tables or columns.
    pub fn with_verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = verbose;
        self
    }

    pub fn validate(
        &self,
        query: &str,
        request_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        if self.catalog.is_empty() {
            return Err(ValidationError::SchemaNotLoaded);
        }

        let statement = self.parser.parse(query)?;
        if statement.is_empty() {
            return Ok(ValidationResult::passed(
                request_id,
                Layer::Schema,
                "Schema validation passed (no tokens to validate)",
            ));
        }

        let mut scope = QueryScope::default();
        collect_scope(statement.nodes(), Clause::Other, false, &mut scope);

        for table in &scope.tables {
            if !self.catalog.is_valid_table(table) {
                tracing::debug!(table = %table, "Unknown table");
                return Err(ValidationError::UnknownTable {
                    table_name: table.clone(),
                    schema: self.catalog.label().to_string(),
                    candidates: self.table_candidates(),
                });
            }
        }

        self.check_level(statement.nodes(), Clause::Other, false, 0, &scope)?;

        Ok(ValidationResult::passed(
            request_id,
            Layer::Schema,
            "Schema validation passed - all table and column references are valid",
        ))
    }

    fn table_candidates(&self) -> Vec<String> {
        if self.verbose_errors {
            self.catalog.tables().map(str::to_string).collect()
        } else {
            Vec::new()
        }
    }

    fn column_candidates(&self, table: &str) -> Vec<String> {
        if self.verbose_errors {
            self.catalog
                .columns(table)
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        }
    }

    fn check_level(
        &self,
        nodes: &[Node],
        start: Clause,
        in_function: bool,
        depth: usize,
        scope: &QueryScope,
    ) -> Result<(), ValidationError> {
        if depth > self.parser.max_depth() {
            return Err(ValidationError::Parsing {
                reason: format!(
                    "SQL structure too deeply nested (max depth: {})",
                    self.parser.max_depth()
                ),
            });
        }

        let tagged = with_clauses(nodes, start);
        for (i, (clause, node)) in tagged.iter().enumerate() {
            // `FROM` inside EXTRACT/SUBSTRING arguments does not name a table.
            let clause = if in_function && clause.is_table_source() {
                start
            } else {
                *clause
            };

            match node {
                Node::Name(name) => {
                    if clause.is_table_source() {
                        continue;
                    }
                    let prev = i.checked_sub(1).map(|p| tagged[p].1);
                    let next = tagged.get(i + 1).map(|(_, n)| *n);
                    let is_cast_type = matches!(prev, Some(Node::Operator(op)) if op == "::");
                    let is_extract_field =
                        in_function && next.is_some_and(|n| n.is_keyword("FROM"));
                    // `DATE '2020-01-01'`, `TIMESTAMP '...'`
                    let is_literal_type = matches!(next, Some(Node::StringLiteral(_)));
                    if !is_cast_type && !is_extract_field && !is_literal_type {
                        self.check_column(name, clause, scope)?;
                    }
                }
                Node::Function { args, .. } => {
                    self.check_level(args, clause, true, depth + 1, scope)?;
                }
                Node::Parenthesis(inner) => {
                    self.check_level(inner, clause, false, depth + 1, scope)?;
                }
                Node::Aliased { .. } | Node::List(_) | Node::Expression(_) | Node::Where(_) => {
                    self.check_level(node.children(), clause, in_function, depth, scope)?;
                }
                Node::Keyword(_)
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

    fn check_column(
        &self,
        name: &Name,
        clause: Clause,
        scope: &QueryScope,
    ) -> Result<(), ValidationError> {
        let column = name.real_name().to_lowercase();

        if let Some(qualifier) = name.qualifier() {
            let table = scope.resolve(qualifier);
            // Unknown qualifiers (derived tables, outer references) are skipped.
            if scope.tables.contains(&table) && !self.catalog.is_valid_column(&table, &column) {
                tracing::debug!(table = %table, column = %column, "Unknown column");
                return Err(ValidationError::UnknownColumn {
                    column_name: name.real_name().to_string(),
                    candidates: self.column_candidates(&table),
                    table_name: table,
                    schema: self.catalog.label().to_string(),
                });
            }
            return Ok(());
        }

        if scope.tables.is_empty() || NON_COLUMN_WORDS.contains(&column.as_str()) {
            return Ok(());
        }
        if matches!(clause, Clause::GroupBy | Clause::OrderBy | Clause::Having)
            && scope.column_aliases.contains(&column)
        {
            return Ok(());
        }
        if scope
            .tables
            .iter()
            .any(|table| self.catalog.is_valid_column(table, &column))
        {
            return Ok(());
        }

        tracing::debug!(column = %column, "Column not found in any query table");
        let tables: Vec<&str> = scope.tables.iter().map(String::as_str).collect();
        Err(ValidationError::UnknownColumn {
            column_name: name.real_name().to_string(),
            table_name: format!("any of [{}]", tables.join(", ")),
            schema: self.catalog.label().to_string(),
            candidates: Vec::new(),
        })
    }
}

/// Pass 1: tables from `FROM`/`JOIN` at every level, plus select-list aliases.
fn collect_scope(nodes: &[Node], start: Clause, in_function: bool, scope: &mut QueryScope) {
    for (clause, node) in with_clauses(nodes, start) {
        if clause.is_table_source() && !in_function {
            collect_tables(node, scope);
            continue;
        }
        match node {
            Node::Aliased { alias, .. } if clause == Clause::Select => {
                scope.column_aliases.insert(alias.to_lowercase());
                collect_scope(node.children(), clause, in_function, scope);
            }
            Node::Function { args, .. } => collect_scope(args, clause, true, scope),
            Node::Parenthesis(inner) => collect_scope(inner, clause, false, scope),
            other => collect_scope(other.children(), clause, in_function, scope),
        }
    }
}

fn collect_tables(node: &Node, scope: &mut QueryScope) {
    match node {
        Node::Name(name) => scope.add_table(name, None),
        Node::Aliased { expr, alias } => match expr.as_ref() {
            Node::Name(name) => scope.add_table(name, Some(alias)),
            other => collect_tables(other, scope),
        },
        Node::List(items) => items.iter().for_each(|item| collect_tables(item, scope)),
        Node::Parenthesis(inner) => collect_scope(inner, Clause::Other, false, scope),
        _ => {}
    }
}
