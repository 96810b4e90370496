use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, trace};

pub mod tree;

pub use tree::{Completion, SyntaxNode};

use crate::grammar::{END_OF_INPUT, EPSILON, Grammar};
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Grammar has no start symbol")]
    NoStartSymbol,
    #[error("No rule accepts '{token}' at line {line}, column {column}")]
    NoMatch {
        token: String,
        line: usize,
        column: usize,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// State of one attempt to extend a node.
#[derive(Default)]
struct Search {
    /// Left-recursion guard: a symbol may be entered once per token position.
    active: FxHashSet<(String, usize)>,
    /// Furthest token position a terminal was tried against.
    furthest: usize,
}

/// Edit made to existing nodes while a line is fed.
enum Change {
    /// Children appended after `children`, completion overwritten.
    Grown {
        path: Vec<usize>,
        children: usize,
        completion: Completion,
    },
    /// Nodes closed under `path`, relative to it.
    Closed {
        path: Vec<usize>,
        nodes: Vec<Vec<usize>>,
    },
}

/// Top-down parser that grows one tree a line at a time.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    root: Option<SyntaxNode>,
    line: usize,
}

/// Best way found to continue a symbol from its existing children.
struct Candidate {
    children: Vec<SyntaxNode>,
    consumed: usize,
    settled: usize,
    length: usize,
    completion: Completion,
}

impl Candidate {
    fn is_full(&self) -> bool {
        self.settled == self.length
    }

    /// Compares settled/length ratios without floating point.
    fn has_lower_ratio_than(&self, other: &Candidate) -> bool {
        self.settled * other.length < other.settled * self.length
    }

    fn into_node(self, symbol: &str, line: usize) -> SyntaxNode {
        SyntaxNode {
            children: self.children,
            completion: self.completion,
            ..SyntaxNode::branch(symbol, line)
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&SyntaxNode> {
        self.root.as_ref()
    }

    /// Number of lines fed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_complete(&self) -> bool {
        self.root
            .as_ref()
            .is_some_and(|root| root.completion == Completion::Complete)
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.line = 0;
    }

    /// Extends the tree with one line of tokens. Returns whether more input
    /// is expected. A rejected line leaves the tree untouched.
    pub fn feed_line(&mut self, grammar: &Grammar, tokens: &[Token]) -> ParseResult<bool> {
        if tokens.is_empty() {
            return Ok(!self.is_complete());
        }
        let start = grammar.start_symbol().ok_or(ParseError::NoStartSymbol)?;
        self.line += 1;
        let line = self.line;

        let fresh = self.root.is_none();
        let root = self
            .root
            .get_or_insert_with(|| SyntaxNode::branch(start, line));
        let mut changes = Vec::new();
        if let Err(error) = extend_line(grammar, root, tokens, line, &mut changes) {
            debug!(line, %error, changes = changes.len(), "line rejected");
            if fresh {
                self.root = None;
            } else if let Some(root) = self.root.as_mut() {
                undo(root, changes);
            }
            return Err(error);
        }
        Ok(!self.is_complete())
    }
}

fn extend_line(
    grammar: &Grammar,
    root: &mut SyntaxNode,
    tokens: &[Token],
    line: usize,
    changes: &mut Vec<Change>,
) -> ParseResult<()> {
    let mut position = 0;
    while position < tokens.len() {
        position += extend(grammar, root, &tokens[position..], line, changes)?;
        close_below(grammar, root, &mut Vec::new(), changes);
    }
    Ok(())
}

/// Reverts `changes`, newest first.
fn undo(root: &mut SyntaxNode, changes: Vec<Change>) {
    for change in changes.into_iter().rev() {
        match change {
            Change::Grown {
                path,
                children,
                completion,
            } => {
                if let Some(node) = root.node_at_mut(&path) {
                    node.children.truncate(children);
                    node.completion = completion;
                }
            }
            Change::Closed { path, nodes } => {
                let Some(top) = root.node_at_mut(&path) else {
                    continue;
                };
                for relative in nodes {
                    if let Some(node) = top.node_at_mut(&relative) {
                        node.closed = false;
                    }
                }
            }
        }
    }
}

fn no_match(tokens: &[Token], position: usize) -> ParseError {
    let token = &tokens[position.min(tokens.len() - 1)];
    ParseError::NoMatch {
        token: token.to_string(),
        line: token.span.line,
        column: token.span.column,
    }
}

/// Attaches a prefix of `tokens` to the tree and returns how many were used.
/// A rejection names the furthest token any alternative reached.
fn extend(
    grammar: &Grammar,
    root: &mut SyntaxNode,
    tokens: &[Token],
    line: usize,
    changes: &mut Vec<Change>,
) -> ParseResult<usize> {
    let mut furthest = 0;
    loop {
        let Some(path) = attachment_point(root) else {
            return Err(no_match(tokens, furthest));
        };
        let Some(node) = root.node_at_mut(&path) else {
            return Err(no_match(tokens, furthest));
        };

        let mut search = Search::default();
        let from = node.children.len();
        let matched =
            match_symbol(grammar, &node.symbol, &node.children, tokens, 0, line, &mut search);
        furthest = furthest.max(search.furthest);
        if let Some(candidate) = matched
            && candidate.consumed > 0
        {
            debug!(
                symbol = %node.symbol,
                from,
                consumed = candidate.consumed,
                completion = ?candidate.completion,
                "extended node"
            );
            changes.push(Change::Grown {
                path,
                children: from,
                completion: node.completion,
            });
            let consumed = candidate.consumed;
            node.children.extend(candidate.children);
            node.completion = candidate.completion;
            return Ok(consumed);
        }

        if path.is_empty() {
            return Err(no_match(tokens, furthest));
        }
        trace!(symbol = %node.symbol, "cannot extend, marking complete");
        changes.push(Change::Grown {
            path,
            children: from,
            completion: node.completion,
        });
        node.completion = Completion::Complete;
    }
}

/// The last open node in pre-order, or its last maybe-complete descendant.
fn attachment_point(root: &SyntaxNode) -> Option<Vec<usize>> {
    let open = root.last_in_preorder(SyntaxNode::is_open)?;
    let open_node = root.node_at(&open)?;
    let nested = open_node
        .last_in_preorder(|node| !node.closed && node.completion == Completion::MaybeComplete);
    Some(match nested {
        Some(relative) => open.into_iter().chain(relative).collect(),
        None => open,
    })
}

/// Tries every alternative of `symbol` that is longer than `existing` and
/// starts with the symbols of `existing`.
fn match_symbol(
    grammar: &Grammar,
    symbol: &str,
    existing: &[SyntaxNode],
    tokens: &[Token],
    offset: usize,
    line: usize,
    search: &mut Search,
) -> Option<Candidate> {
    let from = existing.len();
    let mut best: Option<Candidate> = None;
    let mut any_full = false;

    for alternative in grammar.alternatives(symbol) {
        if alternative.len() <= from {
            continue;
        }
        let prefix_matches = existing
            .iter()
            .zip(alternative)
            .all(|(child, expected)| child.symbol == *expected);
        if !prefix_matches {
            continue;
        }
        let Some(mut candidate) =
            match_sequence(grammar, &alternative[from..], tokens, offset, line, search)
        else {
            continue;
        };
        candidate.settled += from;
        candidate.length = alternative.len();
        any_full |= candidate.is_full();

        let better = match &best {
            None => true,
            Some(current) => {
                candidate.consumed > current.consumed
                    || (candidate.consumed == current.consumed
                        && candidate.has_lower_ratio_than(current))
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    let mut best = best?;
    best.completion = if best.is_full() {
        Completion::Complete
    } else if any_full {
        Completion::MaybeComplete
    } else {
        Completion::Incomplete
    };
    Some(best)
}

/// Matches `symbols` left to right. `None` means a token contradicted the
/// sequence; running out of tokens keeps the matched prefix.
fn match_sequence(
    grammar: &Grammar,
    symbols: &[String],
    tokens: &[Token],
    offset: usize,
    line: usize,
    search: &mut Search,
) -> Option<Candidate> {
    let mut children = Vec::new();
    let mut consumed = 0;
    let mut settled = 0;

    for symbol in symbols {
        if symbol == EPSILON {
            children.push(SyntaxNode::leaf(EPSILON, None, line));
            settled += 1;
            continue;
        }
        let Some(token) = tokens.get(consumed) else {
            break;
        };

        if grammar.is_terminal(symbol) {
            let accepted = symbol != END_OF_INPUT
                && token.matches_terminal(symbol, |word| grammar.is_terminal(word));
            if !accepted {
                search.furthest = search.furthest.max(offset + consumed);
                return None;
            }
            children.push(SyntaxNode::leaf(symbol, Some(token.clone()), line));
            consumed += 1;
            settled += 1;
            continue;
        }

        let key = (symbol.clone(), offset + consumed);
        if !search.active.insert(key.clone()) {
            return None;
        }
        let nested = match_symbol(
            grammar,
            symbol,
            &[],
            &tokens[consumed..],
            offset + consumed,
            line,
            search,
        );
        search.active.remove(&key);

        let nested = nested?;
        consumed += nested.consumed;
        let partial = nested.completion == Completion::Incomplete;
        if !partial {
            settled += 1;
        }
        children.push(nested.into_node(symbol, line));
        if partial {
            break;
        }
    }

    Some(Candidate {
        children,
        consumed,
        settled,
        length: symbols.len(),
        completion: Completion::Incomplete,
    })
}

/// Closes every non-terminal child whose FOLLOW set overlaps the FIRST set
/// of its next sibling, together with its subtree. Idempotent.
pub fn close_finished(grammar: &Grammar, node: &mut SyntaxNode) {
    close_below(grammar, node, &mut Vec::new(), &mut Vec::new());
}

/// Closed subtrees hold only closed nodes and are skipped.
fn close_below(
    grammar: &Grammar,
    node: &mut SyntaxNode,
    path: &mut Vec<usize>,
    changes: &mut Vec<Change>,
) {
    for index in 0..node.children.len() {
        let child = &node.children[index];
        if child.closed {
            continue;
        }
        let follow = grammar
            .follow_set(&child.symbol)
            .filter(|_| grammar.is_non_terminal(&child.symbol));
        let finished = match (follow, node.children.get(index + 1)) {
            (Some(follow), Some(next)) => !follow.is_disjoint(&grammar.first_of_symbol(&next.symbol)),
            _ => false,
        };

        path.push(index);
        let child = &mut node.children[index];
        if finished {
            trace!(symbol = %child.symbol, "closing finished subtree");
            let nodes = child.close_subtree();
            changes.push(Change::Closed {
                path: path.clone(),
                nodes,
            });
        } else {
            close_below(grammar, child, path, changes);
        }
        path.pop();
    }
}
