//! Grouping pass: flat leaves into a token tree.
//!
//! Each tree level is grouped in the same order:
//!
//! 1. parentheses nest (bounded depth) and their contents are grouped first
//! 2. dotted identifiers merge into one [`Name`], `t.*` into a wildcard
//! 3. `name (...)` becomes a [`Node::Function`]
//! 4. `*` in operand position becomes a [`Node::Wildcard`]
//! 5. `WHERE ...` up to the next clause terminator becomes a [`Node::Where`]
//! 6. comma-separated segments between clause keywords become list items,
//!    each item optionally aliased

use crate::error::SqlError;
use crate::lexer;
use crate::node::{Name, Node};
use crate::statement::Statement;

/// Keywords that start a new segment for list grouping.
const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN", "INNER",
    "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "ON", "USING", "DISTINCT", "ALL",
    "UNION", "INTERSECT", "EXCEPT", "WITH", "RECURSIVE", "INSERT", "INTO", "VALUES", "UPDATE",
    "SET", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE", "FETCH", "LATERAL", "TOP",
    "PARTITION",
];

/// Keywords that close a `WHERE` clause.
const WHERE_TERMINATORS: &[&str] = &[
    "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT", "FETCH",
];

/// Parses query text into a grouped [`Statement`].
#[derive(Debug, Clone)]
pub struct SqlParser {
    max_depth: usize,
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SqlParser {
    /// Create a parser that rejects parentheses nested deeper than `max_depth`.
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Parse a single statement.
    ///
    /// Empty or whitespace-only input yields an empty statement. More than
    /// one non-empty statement separated by `;` is an error.
    pub fn parse(&self, sql: &str) -> Result<Statement, SqlError> {
        let leaves = lexer::lex(sql)?;

        let count = count_statements(&leaves);
        if count > 1 {
            return Err(SqlError::MultipleStatements { count });
        }

        let mut iter = leaves.into_iter();
        let nested = nest(&mut iter, 0, self.max_depth)?;
        let nodes = group(nested);

        tracing::trace!(nodes = nodes.len(), "Grouped statement");
        Ok(Statement::new(nodes))
    }
}

fn count_statements(leaves: &[Node]) -> usize {
    let mut count = 0;
    let mut depth = 0usize;
    let mut has_content = false;
    for leaf in leaves {
        match leaf {
            Node::Punctuation(p) if p == "(" => depth += 1,
            Node::Punctuation(p) if p == ")" => depth = depth.saturating_sub(1),
            Node::Punctuation(p) if p == ";" && depth == 0 => {
                if has_content {
                    count += 1;
                }
                has_content = false;
                continue;
            }
            _ => {}
        }
        if !leaf.is_trivia() {
            has_content = true;
        }
    }
    if has_content {
        count += 1;
    }
    count
}

fn nest(
    iter: &mut impl Iterator<Item = Node>,
    depth: usize,
    max_depth: usize,
) -> Result<Vec<Node>, SqlError> {
    let mut out = Vec::new();
    while let Some(node) = iter.next() {
        if node.is_punctuation("(") {
            if depth + 1 > max_depth {
                return Err(SqlError::NestingTooDeep { max_depth });
            }
            let inner = nest(iter, depth + 1, max_depth)?;
            out.push(Node::Parenthesis(inner));
        } else if node.is_punctuation(")") {
            if depth == 0 {
                return Err(SqlError::UnbalancedParenthesis);
            }
            return Ok(out);
        } else {
            out.push(node);
        }
    }
    if depth > 0 {
        return Err(SqlError::UnbalancedParenthesis);
    }
    Ok(out)
}

fn group(nodes: Vec<Node>) -> Vec<Node> {
    let nodes = nodes
        .into_iter()
        .map(|node| match node {
            Node::Parenthesis(inner) => Node::Parenthesis(group(inner)),
            other => other,
        })
        .collect();
    let nodes = merge_names(nodes);
    let nodes = group_functions(nodes);
    let nodes = mark_wildcards(nodes);
    let nodes = group_where(nodes);
    group_segments(nodes)
}

fn merge_names(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    let mut iter = nodes.into_iter().peekable();
    while let Some(node) = iter.next() {
        if node.is_punctuation(".") && matches!(out.last(), Some(Node::Name(_))) {
            match iter.peek() {
                Some(Node::Name(_)) => {
                    if let (Some(next), Some(last)) =
                        (iter.next().and_then(Node::into_name), out.last_mut())
                    {
                        last.extend_name(next);
                    }
                    continue;
                }
                Some(Node::Operator(op)) if op == "*" => {
                    iter.next();
                    if let Some(Node::Name(qualifier)) = out.pop() {
                        out.push(Node::Wildcard(Some(qualifier.to_string())));
                    }
                    continue;
                }
                _ => {}
            }
        }
        out.push(node);
    }
    out
}

fn group_functions(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Node::Parenthesis(args) = node {
            let name_at = out.iter().rposition(|n| !matches!(n, Node::Whitespace(_)));
            if let Some(i) = name_at.filter(|&i| matches!(out[i], Node::Name(_))) {
                out.truncate(i + 1);
                if let Some(name) = out.pop().and_then(Node::into_name) {
                    out.push(Node::Function { name, args });
                }
            } else {
                out.push(Node::Parenthesis(args));
            }
        } else {
            out.push(node);
        }
    }
    out
}

fn mark_wildcards(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let is_star = matches!(&node, Node::Operator(op) if op == "*");
        if is_star {
            let operand_position = match out.iter().rev().find(|n| !n.is_trivia()) {
                None => true,
                Some(prev) => match prev {
                    Node::Keyword(_) => !prev.is_operand(),
                    Node::Punctuation(p) => p == ",",
                    _ => false,
                },
            };
            if operand_position {
                out.push(Node::Wildcard(None));
                continue;
            }
        }
        out.push(node);
    }
    out
}

fn ends_where(node: &Node) -> bool {
    match node {
        Node::Keyword(k) => WHERE_TERMINATORS.contains(&k.as_str()),
        Node::Punctuation(p) => p == ";",
        _ => false,
    }
}

fn group_where(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut current: Option<Vec<Node>> = None;
    for node in nodes {
        match current.take() {
            Some(clause) if ends_where(&node) => {
                out.push(Node::Where(clause));
                out.push(node);
            }
            Some(mut clause) => {
                clause.push(node);
                current = Some(clause);
            }
            None if node.is_keyword("WHERE") => current = Some(vec![node]),
            None => out.push(node),
        }
    }
    if let Some(clause) = current {
        out.push(Node::Where(clause));
    }
    out
}

fn is_boundary(node: &Node) -> bool {
    match node {
        Node::Keyword(k) => CLAUSE_KEYWORDS.contains(&k.as_str()),
        Node::Where(_) => true,
        Node::Punctuation(p) => p == ";",
        _ => false,
    }
}

fn group_segments(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut segment = Vec::new();
    for node in nodes {
        if is_boundary(&node) {
            flush_segment(&mut out, std::mem::take(&mut segment));
            out.push(node);
        } else {
            segment.push(node);
        }
    }
    flush_segment(&mut out, segment);
    out
}

/// Split off leading and trailing whitespace/comments.
fn split_trivia(mut nodes: Vec<Node>) -> (Vec<Node>, Vec<Node>, Vec<Node>) {
    let Some(first) = nodes.iter().position(|n| !n.is_trivia()) else {
        return (nodes, Vec::new(), Vec::new());
    };
    let last = nodes.iter().rposition(|n| !n.is_trivia()).unwrap_or(first);
    let trailing = nodes.split_off(last + 1);
    let core = nodes.split_off(first);
    (nodes, core, trailing)
}

fn flush_segment(out: &mut Vec<Node>, segment: Vec<Node>) {
    if segment.is_empty() {
        return;
    }

    let mut items: Vec<Vec<Node>> = vec![Vec::new()];
    for node in segment {
        if node.is_punctuation(",") {
            items.push(Vec::new());
        } else if let Some(item) = items.last_mut() {
            item.push(node);
        }
    }

    if items.len() == 1 {
        let Some(item) = items.pop() else { return };
        let (leading, core, trailing) = split_trivia(item);
        let (item, comments) = build_item(core);
        out.extend(leading);
        out.extend(item);
        out.extend(comments);
        out.extend(trailing);
        return;
    }

    // Comments at item edges are kept beside the list so nothing is lost.
    let mut list = Vec::with_capacity(items.len());
    for item in items {
        let (leading, core, trailing) = split_trivia(item);
        let (item, comments) = build_item(core);
        out.extend(
            leading
                .into_iter()
                .chain(comments)
                .chain(trailing)
                .filter(|n| matches!(n, Node::Comment(_))),
        );
        list.extend(item);
    }
    out.push(Node::List(list));
}

/// Group one list item, returning any comments lifted out of it.
fn build_item(core: Vec<Node>) -> (Option<Node>, Vec<Node>) {
    if core.is_empty() {
        return (None, Vec::new());
    }
    let (expr, alias, comments) = split_alias(core);
    let expr = single_or_expression(expr);
    let item = match alias {
        Some(alias) => Node::Aliased {
            expr: Box::new(expr),
            alias,
        },
        None => expr,
    };
    (Some(item), comments)
}

fn single_or_expression(mut nodes: Vec<Node>) -> Node {
    if nodes.len() == 1 {
        if let Some(node) = nodes.pop() {
            return node;
        }
    }
    Node::Expression(nodes)
}

fn alias_name(node: &Node) -> Option<&str> {
    match node {
        Node::Name(name) if !name.is_qualified() => Some(name.real_name()),
        _ => None,
    }
}

/// Detect `expr [AS] alias` at the end of an item. Comments between the
/// expression and the alias come back separately so they are not lost.
fn split_alias(mut core: Vec<Node>) -> (Vec<Node>, Option<String>, Vec<Node>) {
    let significant: Vec<usize> = core
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.is_trivia())
        .map(|(i, _)| i)
        .collect();
    let n = significant.len();
    if n < 2 {
        return (core, None, Vec::new());
    }
    let last = significant[n - 1];
    let prev = significant[n - 2];
    let Some(alias) = alias_name(&core[last]).map(str::to_string) else {
        return (core, None, Vec::new());
    };

    let cut = if core[prev].is_keyword("AS") && n >= 3 {
        significant[n - 3] + 1
    } else if core[prev].is_operand() {
        prev + 1
    } else {
        return (core, None, Vec::new());
    };
    let comments = core
        .drain(cut..)
        .filter(|node| matches!(node, Node::Comment(_)))
        .collect();
    (core, Some(alias), comments)
}
