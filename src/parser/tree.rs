use std::fmt::Write as _;

use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    #[default]
    Incomplete,
    Complete,
    /// Some alternative is fully matched, but a longer one may still apply.
    MaybeComplete,
}

/// Node of the incrementally built parse tree. Leaves carry the matched
/// token; an EPSILON leaf carries none.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub symbol: String,
    pub token: Option<Token>,
    pub children: Vec<SyntaxNode>,
    pub completion: Completion,
    /// Closed nodes are never extended again.
    pub closed: bool,
    pub line: usize,
}

impl SyntaxNode {
    pub fn branch(symbol: &str, line: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            token: None,
            children: Vec::new(),
            completion: Completion::Incomplete,
            closed: false,
            line,
        }
    }

    pub fn leaf(symbol: &str, token: Option<Token>, line: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            token,
            children: Vec::new(),
            completion: Completion::Complete,
            closed: true,
            line,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Neither closed nor complete, so it may still grow.
    pub fn is_open(&self) -> bool {
        !self.closed && self.completion != Completion::Complete
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&SyntaxNode> {
        path.iter()
            .try_fold(self, |node, &index| node.children.get(index))
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut SyntaxNode> {
        path.iter()
            .try_fold(self, |node, &index| node.children.get_mut(index))
    }

    /// Closes the node and its open descendants. Returns the paths of the
    /// nodes it closed, relative to this one.
    pub fn close_subtree(&mut self) -> Vec<Vec<usize>> {
        let mut closed = Vec::new();
        self.close_into(&mut Vec::new(), &mut closed);
        closed
    }

    fn close_into(&mut self, path: &mut Vec<usize>, closed: &mut Vec<Vec<usize>>) {
        if self.closed {
            return;
        }
        self.closed = true;
        closed.push(path.clone());
        for (index, child) in self.children.iter_mut().enumerate() {
            path.push(index);
            child.close_into(path, closed);
            path.pop();
        }
    }

    /// Path of the last node in pre-order that satisfies `predicate`. The
    /// children of closed nodes are not searched.
    pub fn last_in_preorder(&self, predicate: impl Fn(&SyntaxNode) -> bool) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        self.find_last(&predicate, &mut path).then_some(path)
    }

    fn find_last(&self, predicate: &impl Fn(&SyntaxNode) -> bool, path: &mut Vec<usize>) -> bool {
        if !self.closed {
            for (index, child) in self.children.iter().enumerate().rev() {
                path.push(index);
                if child.find_last(predicate, path) {
                    return true;
                }
                path.pop();
            }
        }
        predicate(self)
    }

    /// Leaves carrying a token, left to right.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(token) = &node.token {
                tokens.push(token);
            }
            stack.extend(node.children.iter().rev());
        }
        tokens
    }

    pub fn first_token(&self) -> Option<&Token> {
        if let Some(token) = &self.token {
            return Some(token);
        }
        self.children.iter().find_map(SyntaxNode::first_token)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = write!(out, "{:indent$}{}", "", self.symbol, indent = depth * 2);
        if let Some(token) = &self.token {
            let _ = write!(out, " '{token}'");
        } else {
            let state = match self.completion {
                Completion::Incomplete => "incomplete",
                Completion::Complete => "complete",
                Completion::MaybeComplete => "maybe",
            };
            let _ = write!(out, " [{state}{}]", if self.closed { ", closed" } else { "" });
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}
