//! Token-tree node kinds.
//!
//! A parsed query is a sequence of [`Node`]s. Leaves come straight from the
//! tokenizer; compound nodes are produced by the grouping pass in
//! [`crate::parser`]. The enum is closed so every walker must decide what to
//! do with every kind.

use std::fmt;

/// A possibly qualified identifier such as `person_id`, `p.person_id` or
/// `cdm.person`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub parts: Vec<String>,
    /// Whether any part was written as a quoted identifier.
    pub quoted: bool,
}

impl Name {
    pub fn new(part: impl Into<String>) -> Self {
        Self {
            parts: vec![part.into()],
            quoted: false,
        }
    }

    pub fn quoted(part: impl Into<String>) -> Self {
        Self {
            parts: vec![part.into()],
            quoted: true,
        }
    }

    /// The referenced object itself, with every qualifier stripped.
    pub fn real_name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// The part immediately before the real name (`p` in `p.person_id`).
    pub fn qualifier(&self) -> Option<&str> {
        if self.parts.len() >= 2 {
            self.parts.get(self.parts.len() - 2).map(String::as_str)
        } else {
            None
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.parts.len() > 1
    }

    fn push(&mut self, other: Name) {
        self.quoted |= other.quoted;
        self.parts.extend(other.parts);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

/// One node of the token tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A structural keyword, stored uppercase.
    Keyword(String),
    /// An identifier.
    Name(Name),
    /// `*` or `t.*` in operand position.
    Wildcard(Option<String>),
    /// An expression with an explicit or implicit alias.
    Aliased { expr: Box<Node>, alias: String },
    /// Comma-separated items.
    List(Vec<Node>),
    /// A list item made of more than one node.
    Expression(Vec<Node>),
    /// `name(args)`.
    Function { name: Name, args: Vec<Node> },
    /// A parenthesized group; contents are grouped like a statement.
    Parenthesis(Vec<Node>),
    /// `WHERE` and the condition that follows it, keyword included.
    Where(Vec<Node>),
    /// Comment body without its markers.
    Comment(String),
    /// String literal contents without quotes.
    StringLiteral(String),
    Number(String),
    Operator(String),
    /// `,`, `(`, `)`, `.` or `;`.
    Punctuation(String),
    Whitespace(String),
}

impl Node {
    /// Direct children of compound nodes. Leaves have none.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Aliased { expr, .. } => std::slice::from_ref(expr.as_ref()),
            Node::List(nodes)
            | Node::Expression(nodes)
            | Node::Parenthesis(nodes)
            | Node::Where(nodes)
            | Node::Function { args: nodes, .. } => nodes,
            Node::Keyword(_)
            | Node::Name(_)
            | Node::Wildcard(_)
            | Node::Comment(_)
            | Node::StringLiteral(_)
            | Node::Number(_)
            | Node::Operator(_)
            | Node::Punctuation(_)
            | Node::Whitespace(_) => &[],
        }
    }

    /// Whitespace and comments carry no structure.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Node::Whitespace(_) | Node::Comment(_))
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Node::Keyword(k) if k.eq_ignore_ascii_case(keyword))
    }

    pub fn is_punctuation(&self, punct: &str) -> bool {
        matches!(self, Node::Punctuation(p) if p == punct)
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Node::Keyword(k) => Some(k),
            _ => None,
        }
    }

    /// Pre-order visit of this node and all its descendants.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Whether this node can stand on the left of an implicit alias or an
    /// arithmetic operator.
    pub(crate) fn is_operand(&self) -> bool {
        match self {
            Node::Name(_)
            | Node::Function { .. }
            | Node::Parenthesis(_)
            | Node::Number(_)
            | Node::StringLiteral(_)
            | Node::Wildcard(_)
            | Node::Aliased { .. }
            | Node::Expression(_) => true,
            Node::Keyword(k) => matches!(k.as_str(), "END" | "NULL" | "TRUE" | "FALSE"),
            Node::List(_)
            | Node::Where(_)
            | Node::Comment(_)
            | Node::Operator(_)
            | Node::Punctuation(_)
            | Node::Whitespace(_) => false,
        }
    }

    pub(crate) fn into_name(self) -> Option<Name> {
        match self {
            Node::Name(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn extend_name(&mut self, other: Name) -> bool {
        match self {
            Node::Name(name) => {
                name.push(other);
                true
            }
            _ => false,
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, nodes: &[Node], sep: &str) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{node}")?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Keyword(k) => f.write_str(k),
            Node::Name(name) => write!(f, "{name}"),
            Node::Wildcard(None) => f.write_str("*"),
            Node::Wildcard(Some(q)) => write!(f, "{q}.*"),
            Node::Aliased { expr, alias } => write!(f, "{expr} AS {alias}"),
            Node::List(items) => write_joined(f, items, ", "),
            Node::Expression(nodes) | Node::Where(nodes) => write_joined(f, nodes, ""),
            Node::Function { name, args } => {
                write!(f, "{name}(")?;
                write_joined(f, args, "")?;
                f.write_str(")")
            }
            Node::Parenthesis(nodes) => {
                f.write_str("(")?;
                write_joined(f, nodes, "")?;
                f.write_str(")")
            }
            Node::Comment(text) => write!(f, "/* {text} */"),
            Node::StringLiteral(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Node::Number(n) | Node::Operator(n) | Node::Punctuation(n) | Node::Whitespace(n) => {
                f.write_str(n)
            }
        }
    }
}
