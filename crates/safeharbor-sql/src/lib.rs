//! # safeharbor-sql
//!
//! SQL tokenizing and token-tree grouping for SafeHarbor.
//!
//! Query text is tokenized with `sqlparser`'s PostgreSQL tokenizer and then
//! grouped into a small closed tree of [`Node`]s. The tree is deliberately
//! shallow: validators only need to know which identifiers appear in which
//! clause, where functions and aliases are, and whether a statement nests
//! another one. No full grammar is applied, so queries that a database
//! would reject can still be inspected and explained.
//!
//! ```text
//! SELECT gender_concept_id, COUNT(DISTINCT person_id) AS Count_Patients
//! FROM person GROUP BY gender_concept_id
//!
//! Keyword(SELECT)
//! List[ Name(gender_concept_id),
//!       Aliased{ Function{COUNT, [Keyword(DISTINCT), Name(person_id)]}, Count_Patients } ]
//! Keyword(FROM)  Name(person)
//! Keyword(GROUP) Keyword(BY) Name(gender_concept_id)
//! ```

pub mod clause;
pub mod error;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod statement;

pub use clause::{with_clauses, Clause};
pub use error::SqlError;
pub use lexer::trim_trailing;
pub use node::{Name, Node};
pub use parser::SqlParser;
pub use statement::Statement;
