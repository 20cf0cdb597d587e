//! Clause tracking for token-tree walkers.

use crate::node::Node;
use std::fmt;

/// The clause a node appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    From,
    Join,
    On,
    Using,
    Where,
    GroupBy,
    OrderBy,
    Having,
    Limit,
    /// Anything else (`WITH`, set operators, statement start).
    Other,
}

impl Clause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::From => "FROM",
            Clause::Join => "JOIN",
            Clause::On => "ON",
            Clause::Using => "USING",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::OrderBy => "ORDER BY",
            Clause::Having => "HAVING",
            Clause::Limit => "LIMIT",
            Clause::Other => "OTHER",
        }
    }

    /// The clause a keyword opens, if it opens one.
    pub fn opened_by(keyword: &str) -> Option<Clause> {
        let clause = match keyword.to_ascii_uppercase().as_str() {
            "SELECT" => Clause::Select,
            "FROM" => Clause::From,
            "JOIN" => Clause::Join,
            "ON" => Clause::On,
            "USING" => Clause::Using,
            "WHERE" => Clause::Where,
            "GROUP" => Clause::GroupBy,
            "ORDER" => Clause::OrderBy,
            "HAVING" => Clause::Having,
            "LIMIT" | "OFFSET" | "FETCH" => Clause::Limit,
            "WITH" | "UNION" | "INTERSECT" | "EXCEPT" => Clause::Other,
            _ => return None,
        };
        Some(clause)
    }

    /// Whether nodes in this clause name tables rather than columns.
    pub fn is_table_source(&self) -> bool {
        matches!(self, Clause::From | Clause::Join)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pair every non-trivia node of one tree level with the clause it sits in.
///
/// Keywords are yielded too, tagged with the clause they open. A `Where`
/// node is always tagged [`Clause::Where`]. Nested levels are not entered;
/// walkers call this again on children, passing the enclosing clause as
/// `start`.
pub fn with_clauses(nodes: &[Node], start: Clause) -> Vec<(Clause, &Node)> {
    let mut clause = start;
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes.iter().filter(|n| !n.is_trivia()) {
        match node {
            Node::Keyword(k) => {
                if let Some(opened) = Clause::opened_by(k) {
                    clause = opened;
                }
                out.push((clause, node));
            }
            Node::Where(_) => out.push((Clause::Where, node)),
            _ => out.push((clause, node)),
        }
    }
    out
}
