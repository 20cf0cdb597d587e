//! Tokenizer adapter.
//!
//! Runs `sqlparser`'s tokenizer and maps each token to a leaf [`Node`].
//! Only a fixed set of structural words become keywords; everything else the
//! tokenizer reports as a word is an identifier, so columns called `name`,
//! `month` or `day` are never mistaken for syntax.

use crate::error::SqlError;
use crate::node::{Name, Node};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer, Whitespace};

/// Words treated as keywords. Matching is case-insensitive.
pub const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "ON", "USING", "AS",
    "DISTINCT", "ALL", "AND", "OR", "NOT", "IN", "IS", "NULL", "TRUE", "FALSE", "LIKE", "ILIKE",
    "BETWEEN", "EXISTS", "CASE", "WHEN", "THEN", "ELSE", "END", "WITH", "RECURSIVE", "UNION",
    "INTERSECT", "EXCEPT", "ASC", "DESC", "NULLS", "FIRST", "LAST", "INTERVAL", "OVER",
    "PARTITION", "FETCH", "ROWS", "ONLY", "INSERT", "UPDATE", "DELETE", "DROP", "INTO", "VALUES",
    "SET", "CREATE", "ALTER", "TRUNCATE", "LATERAL", "TOP",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Tokenize `sql` into leaf nodes.
pub(crate) fn lex(sql: &str) -> Result<Vec<Node>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| SqlError::Tokenize(e.to_string()))?;

    Ok(tokens.into_iter().filter_map(leaf).collect())
}

/// `sql` with trailing whitespace, comments and semicolons removed, so it
/// can be embedded in a larger statement.
pub fn trim_trailing(sql: &str) -> Result<&str, SqlError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| SqlError::Tokenize(e.to_string()))?;

    let last = tokens.iter().rev().find(|t| {
        !matches!(
            t.token,
            Token::Whitespace(_) | Token::SemiColon | Token::EOF
        )
    });
    Ok(match last {
        Some(token) => &sql[..byte_offset(sql, token.span.end)],
        None => "",
    })
}

/// Byte offset of a tokenizer location (1-based line and column).
fn byte_offset(sql: &str, location: Location) -> usize {
    let (mut line, mut column) = (1, 1);
    for (offset, ch) in sql.char_indices() {
        if line == location.line && column == location.column {
            return offset;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    sql.len()
}

fn leaf(token: Token) -> Option<Node> {
    let node = match token {
        Token::EOF => return None,
        Token::Word(word) => match word.quote_style {
            Some(_) => Node::Name(Name::quoted(word.value)),
            None if is_keyword(&word.value) => Node::Keyword(word.value.to_ascii_uppercase()),
            None => Node::Name(Name::new(word.value)),
        },
        // PostgreSQL reads double quotes as identifiers.
        Token::DoubleQuotedString(s) => Node::Name(Name::quoted(s)),
        Token::Number(n, _) => Node::Number(n),
        Token::SingleQuotedString(s)
        | Token::NationalStringLiteral(s)
        | Token::EscapedStringLiteral(s)
        | Token::HexStringLiteral(s) => Node::StringLiteral(s),
        Token::DollarQuotedString(s) => Node::StringLiteral(s.value),
        Token::Whitespace(Whitespace::SingleLineComment { comment, .. }) => {
            Node::Comment(comment.trim().to_string())
        }
        Token::Whitespace(Whitespace::MultiLineComment(comment)) => {
            Node::Comment(comment.trim().to_string())
        }
        Token::Whitespace(ws) => Node::Whitespace(ws.to_string()),
        Token::Comma => Node::Punctuation(",".to_string()),
        Token::LParen => Node::Punctuation("(".to_string()),
        Token::RParen => Node::Punctuation(")".to_string()),
        Token::Period => Node::Punctuation(".".to_string()),
        Token::SemiColon => Node::Punctuation(";".to_string()),
        Token::Mul => Node::Operator("*".to_string()),
        other => Node::Operator(other.to_string()),
    };
    Some(node)
}
