//! Parsed statement.

use crate::node::Node;

/// One parsed query: the top level of its token tree.
///
/// Statements are immutable. Validators that need one parse the query text
/// themselves rather than sharing a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    nodes: Vec<Node>,
}

impl Statement {
    pub(crate) fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Top-level nodes, trivia included.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Top-level nodes without whitespace and comments.
    pub fn significant(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_trivia())
    }

    /// True when the statement holds nothing but whitespace and comments.
    pub fn is_empty(&self) -> bool {
        self.significant().next().is_none()
    }

    /// The leading keyword (`SELECT`, `WITH`, ...), if the statement starts
    /// with one.
    pub fn first_keyword(&self) -> Option<&str> {
        self.significant().next().and_then(Node::as_keyword)
    }

    /// Pre-order visit of every node in the tree.
    pub fn visit<'a>(&'a self, mut f: impl FnMut(&'a Node)) {
        for node in &self.nodes {
            node.visit(&mut f);
        }
    }

    /// How many times `keyword` appears anywhere in the tree.
    pub fn count_keyword(&self, keyword: &str) -> usize {
        let mut count = 0;
        self.visit(|node| {
            if node.is_keyword(keyword) {
                count += 1;
            }
        });
        count
    }

    /// Every comment body, in tree order.
    pub fn comments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit(|node| {
            if let Node::Comment(text) = node {
                out.push(text.as_str());
            }
        });
        out
    }

    /// Every string literal, in tree order.
    pub fn string_literals(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit(|node| {
            if let Node::StringLiteral(text) = node {
                out.push(text.as_str());
            }
        });
        out
    }
}
