use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

use crate::config::{Scoping, SessionConfig};
use crate::parser::SyntaxNode;
use crate::registry::Registry;
use crate::token::{CLASS_IDENTIFIER, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Unknown type '{type_name}' at line {line}")]
    UnknownType { type_name: String, line: usize },
    #[error("Variable '{name}' is already declared (line {line})")]
    DuplicateVariable { name: String, line: usize },
    #[error("Type '{name}' cannot be defined as '{base}' (line {line})")]
    TypeRejected {
        name: String,
        base: String,
        line: usize,
    },
    #[error("Array '{name}' needs a positive integer size (line {line})")]
    InvalidSize { name: String, line: usize },
    #[error("Declaration at line {line} has no {part}")]
    MissingPart { part: &'static str, line: usize },
    #[error("Stored values do not match their declared types")]
    InconsistentTypes,
    #[error("The parse tree changed while declarations were being walked")]
    StaleTree,
}

pub type DeclarationResult<T> = Result<T, DeclarationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// A loop was queued; call `resume` to walk it.
    Suspended,
    Done,
}

/// Resumable depth-first walk that applies type and variable declarations
/// to the registry. Each loop met at the outer level suspends the walk.
#[derive(Debug, Clone, Default)]
pub struct DeclarationWalker {
    stack: Vec<Vec<usize>>,
    pending: VecDeque<Vec<usize>>,
    done: bool,
}

impl DeclarationWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Starts over from the root of `tree`.
    pub fn walk(
        &mut self,
        tree: &SyntaxNode,
        registry: &mut Registry,
        config: &SessionConfig,
    ) -> DeclarationResult<WalkStatus> {
        self.stack = vec![Vec::new()];
        self.pending.clear();
        self.done = false;
        self.resume(tree, registry, config)
    }

    /// Walks the oldest queued loop, then continues the outer walk until the
    /// next loop or the end of the tree.
    pub fn resume(
        &mut self,
        tree: &SyntaxNode,
        registry: &mut Registry,
        config: &SessionConfig,
    ) -> DeclarationResult<WalkStatus> {
        if self.done {
            return Ok(WalkStatus::Done);
        }
        if let Some(path) = self.pending.pop_front() {
            walk_inline(tree, path, registry, config)?;
        }

        while let Some(path) = self.stack.pop() {
            let node = tree.node_at(&path).ok_or(DeclarationError::StaleTree)?;
            if config.statements.is_loop(&node.symbol) {
                debug!(symbol = %node.symbol, line = node.line, "declaration walk suspended");
                self.pending.push_back(path);
                return Ok(WalkStatus::Suspended);
            }
            if visit(node, registry, config)? {
                push_children(&mut self.stack, &path, node);
            }
        }

        while let Some(path) = self.pending.pop_front() {
            walk_inline(tree, path, registry, config)?;
        }
        self.done = true;
        if !registry.verify_types() {
            return Err(DeclarationError::InconsistentTypes);
        }
        debug!("declaration walk finished");
        Ok(WalkStatus::Done)
    }
}

/// Walks the subtree at `path` to the end, nested loops included.
fn walk_inline(
    tree: &SyntaxNode,
    path: Vec<usize>,
    registry: &mut Registry,
    config: &SessionConfig,
) -> DeclarationResult<()> {
    let mut stack = vec![path];
    while let Some(path) = stack.pop() {
        let node = tree.node_at(&path).ok_or(DeclarationError::StaleTree)?;
        if visit(node, registry, config)? {
            push_children(&mut stack, &path, node);
        }
    }
    Ok(())
}

fn push_children(stack: &mut Vec<Vec<usize>>, path: &[usize], node: &SyntaxNode) {
    for index in (0..node.children.len()).rev() {
        let mut child = path.to_vec();
        child.push(index);
        stack.push(child);
    }
}

/// Applies one node. Returns whether its children still need walking.
fn visit(
    node: &SyntaxNode,
    registry: &mut Registry,
    config: &SessionConfig,
) -> DeclarationResult<bool> {
    let names = &config.statements;
    if node.symbol == names.type_decl {
        declare_types(node, registry, config)?;
        return Ok(false);
    }
    if node.symbol == names.var_decl {
        declare_variables(node, registry, config)?;
        return Ok(false);
    }
    if config.scoping == Scoping::Static
        && let Some(TokenKind::Punct(text)) = node.token.as_ref().map(|token| token.kind())
    {
        match text.as_str() {
            "{" => registry.enter_scope(),
            "}" => {
                registry.exit_scope();
            }
            _ => {}
        }
    }
    Ok(true)
}

/// Leaves of a declaration split at its `:`. Identifiers before it are the
/// declared names; the first identifier after it names the type, and an
/// integer after it gives the array size.
struct DeclarationParts {
    names: Vec<String>,
    type_name: Option<String>,
    size: Option<i64>,
}

fn declaration_parts(node: &SyntaxNode) -> DeclarationParts {
    let mut leaves = Vec::new();
    collect_leaves(node, &mut leaves);

    let mut parts = DeclarationParts {
        names: Vec::new(),
        type_name: None,
        size: None,
    };
    let mut after_colon = false;
    for leaf in leaves {
        let Some(token) = &leaf.token else {
            continue;
        };
        match token.kind() {
            TokenKind::Punct(text) if text == ":" => after_colon = true,
            TokenKind::Word(word) if leaf.symbol == CLASS_IDENTIFIER => {
                if !after_colon {
                    parts.names.push(word.clone());
                } else if parts.type_name.is_none() {
                    parts.type_name = Some(word.clone());
                }
            }
            TokenKind::Integer(size) if after_colon => parts.size = Some(*size),
            _ => {}
        }
    }
    parts
}

fn collect_leaves<'t>(node: &'t SyntaxNode, leaves: &mut Vec<&'t SyntaxNode>) {
    if node.is_leaf() {
        leaves.push(node);
    }
    for child in &node.children {
        collect_leaves(child, leaves);
    }
}

fn declare_types(
    node: &SyntaxNode,
    registry: &mut Registry,
    config: &SessionConfig,
) -> DeclarationResult<()> {
    let parts = declaration_parts(node);
    let base = parts.type_name.ok_or(DeclarationError::MissingPart {
        part: "base type",
        line: node.line,
    })?;
    let base = config.resolve_type_name(&base).to_string();
    if !registry.has_type(&base) {
        return Err(DeclarationError::UnknownType {
            type_name: base,
            line: node.line,
        });
    }
    for name in parts.names {
        if !registry.add_typedef(&name, &base) {
            return Err(DeclarationError::TypeRejected {
                name,
                base,
                line: node.line,
            });
        }
    }
    Ok(())
}

fn declare_variables(
    node: &SyntaxNode,
    registry: &mut Registry,
    config: &SessionConfig,
) -> DeclarationResult<()> {
    let parts = declaration_parts(node);
    let type_name = parts.type_name.ok_or(DeclarationError::MissingPart {
        part: "type",
        line: node.line,
    })?;
    let type_name = config.resolve_type_name(&type_name).to_string();
    if !registry.has_type(&type_name) {
        return Err(DeclarationError::UnknownType {
            type_name,
            line: node.line,
        });
    }

    for name in parts.names {
        let size = match parts.size {
            None => 1,
            Some(size) => usize::try_from(size)
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| DeclarationError::InvalidSize {
                    name: name.clone(),
                    line: node.line,
                })?,
        };
        if !registry.add_variable(&name, Some(&type_name), size) {
            return Err(DeclarationError::DuplicateVariable {
                name,
                line: node.line,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::registry::{PRIM_INT, PRIM_REAL, Value};
    use indoc::indoc;

    fn walk_to_end(source: &str, config: SessionConfig) -> (Registry, usize) {
        let session = fixtures::session_with(config.clone(), source);
        let tree = session.tree().expect("tree");
        let mut registry = Registry::new();
        let mut walker = DeclarationWalker::new();
        let mut suspensions = 0;
        let mut status = walker.walk(tree, &mut registry, &config).expect("walk");
        while status == WalkStatus::Suspended {
            suspensions += 1;
            status = walker.resume(tree, &mut registry, &config).expect("resume");
        }
        assert!(walker.is_done());
        (registry, suspensions)
    }

    #[test]
    fn declares_typed_variables_and_arrays() {
        let (registry, suspensions) = walk_to_end(
            "var a, b : int; var c : real [ 4 ];",
            SessionConfig::default(),
        );
        assert_eq!(suspensions, 0);
        assert_eq!(registry.get_variable("a").map(|v| v.type_name.as_str()), Some(PRIM_INT));
        assert_eq!(registry.get_variable("b").map(|v| v.values.len()), Some(1));
        let c = registry.get_variable("c").expect("c");
        assert_eq!(c.values, vec![Value::Real(0.0); 4]);
        assert_eq!(registry.lowest_type(&c.type_name), PRIM_REAL);
    }

    #[test]
    fn typedefs_feed_later_declarations() {
        let (registry, _) = walk_to_end(
            "type meters : real; var d : meters;",
            SessionConfig::default(),
        );
        let d = registry.get_variable("d").expect("d");
        assert_eq!(d.type_name, "meters");
        assert_eq!(registry.lowest_type("meters"), PRIM_REAL);
    }

    #[test]
    fn suspends_at_each_outer_loop() {
        let source = indoc! {"
            var i : int;
            while (i < 2) {
                var inner : int;
                repeat { var nested : real; } until (i > 0);
            }
            repeat { var late : int; } until (i > 0);
            var last : int;
        "};
        let (registry, suspensions) = walk_to_end(source, SessionConfig::default());
        assert_eq!(suspensions, 2);
        for name in ["i", "inner", "nested", "late", "last"] {
            assert!(registry.get_variable(name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn static_scoping_drops_block_variables() {
        let config = SessionConfig {
            scoping: Scoping::Static,
            ..SessionConfig::default()
        };
        let (registry, _) = walk_to_end(
            "var outer : int; if (outer > 0) { var local : int; }",
            config,
        );
        assert!(registry.get_variable("outer").is_some());
        assert!(registry.get_variable("local").is_none());
        assert_eq!(registry.scope_depth(), 1);
    }

    #[test]
    fn rejects_bad_declarations() {
        let config = SessionConfig::default();
        let session = fixtures::session("var x : int; var x : int;");
        let mut registry = Registry::new();
        let error = DeclarationWalker::new()
            .walk(session.tree().expect("tree"), &mut registry, &config)
            .expect_err("duplicate");
        assert_eq!(
            error,
            DeclarationError::DuplicateVariable {
                name: "x".into(),
                line: 2
            }
        );

        let session = fixtures::session("var y : vector;");
        let mut registry = Registry::new();
        let error = DeclarationWalker::new()
            .walk(session.tree().expect("tree"), &mut registry, &config)
            .expect_err("unknown type");
        assert_eq!(error.to_string(), "Unknown type 'vector' at line 1");
    }
}
