//! Error types for the SQL crate.

use thiserror::Error;

/// Errors that can occur while turning query text into a [`Statement`](crate::Statement).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// The tokenizer rejected the input.
    #[error("failed to tokenize SQL: {0}")]
    Tokenize(String),

    /// Parentheses nest deeper than the configured limit.
    #[error("query nesting depth exceeds maximum of {max_depth}")]
    NestingTooDeep { max_depth: usize },

    /// A closing parenthesis has no opening partner, or vice versa.
    #[error("unbalanced parenthesis in query")]
    UnbalancedParenthesis,

    /// More than one statement was supplied.
    #[error("only a single SQL statement is allowed, found {count}")]
    MultipleStatements { count: usize },
}
