use tracing::debug;

mod error;

pub use error::{CompileError, CompileResult};

use crate::config::StatementNames;
use crate::ir::{Access, ArithOp, Program, Relation, StatementId, StatementKind};
use crate::parser::SyntaxNode;
use crate::registry::{Registry, Value};
use crate::token::{CLASS_IDENTIFIER, TokenKind};

/// Compiles a parse tree into a linked statement arena. Variables named in
/// the tree are declared in `registry` when they are not already.
pub fn compile(
    tree: &SyntaxNode,
    registry: &mut Registry,
    names: &StatementNames,
) -> CompileResult<Program> {
    let mut compiler = Compiler {
        names,
        registry,
        program: Program::default(),
    };
    let mut order = Vec::new();
    compiler.flatten(tree, &mut order)?;
    compiler.program.link(&order);
    debug!(
        statements = compiler.program.len(),
        temporaries = compiler.registry.temporary_count(),
        "program compiled"
    );
    Ok(compiler.program)
}

struct Compiler<'a> {
    names: &'a StatementNames,
    registry: &'a mut Registry,
    program: Program,
}

impl Compiler<'_> {
    /// Statement nodes compile to their own shape; any other node becomes a
    /// no-op followed by its flattened children.
    fn flatten(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let names = self.names;
        let symbol = node.symbol.as_str();
        if symbol == names.assign {
            self.assignment(node, order)
        } else if symbol == names.conditional {
            self.conditional(node, order)
        } else if symbol == names.while_loop {
            self.while_loop(node, order)
        } else if symbol == names.repeat_loop {
            self.repeat_loop(node, order)
        } else if symbol == names.print {
            self.print(node, order)
        } else if symbol == names.call {
            self.call(node, order)
        } else {
            self.emit(order, StatementKind::NoOp);
            for child in &node.children {
                self.flatten(child, order)?;
            }
            Ok(())
        }
    }

    fn emit(&mut self, order: &mut Vec<StatementId>, kind: StatementKind) -> StatementId {
        let id = self.program.push(kind);
        order.push(id);
        id
    }

    fn assignment(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let children = &node.children;
        let operator = children
            .iter()
            .position(|child| matches!(literal(child), Some("=" | ":=" | ":")))
            .ok_or_else(|| missing(node, "assignment operator"))?;
        let target_node = operator
            .checked_sub(1)
            .and_then(|index| children.get(index))
            .ok_or_else(|| missing(node, "target"))?;

        let target = self
            .expression(target_node, order)?
            .ok_or_else(|| missing(node, "target"))?;
        if target.variable_id().is_none() {
            return Err(CompileError::ConstantTarget { line: node.line });
        }
        let value = self
            .operand_sequence(&children[operator + 1..], node.line, order)?
            .ok_or_else(|| missing(node, "value"))?;

        self.emit(
            order,
            StatementKind::Assign {
                target: Some(target),
                left: Some(value),
                right: None,
                operator: None,
            },
        );
        Ok(())
    }

    fn conditional(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let (left, relation, right) = self.condition(node, order)?;
        let branch = self.emit(order, branch_kind(left, relation, right));

        let body = find_child(node, &self.names.body, 1).ok_or_else(|| missing(node, "body"))?;
        let then_start = order.len();
        self.flatten(body, order)?;
        let then_first = order.get(then_start).copied();

        match find_child(node, &self.names.else_branch, 1) {
            None => {
                let then_last = order.last().copied();
                self.set_branches(branch, then_first, then_last);
            }
            Some(else_node) => {
                let skip = self.emit(order, StatementKind::Goto { target: None });
                let else_start = order.len();
                self.flatten(else_node, order)?;
                let else_first = order.get(else_start).copied();
                let end = self.emit(order, StatementKind::NoOp);

                if let Some(statement) = self.program.get_mut(skip) {
                    statement.kind = StatementKind::Goto { target: Some(end) };
                }
                self.set_branches(branch, then_first, else_first);
            }
        }
        Ok(())
    }

    /// Conditional whose body ends with a jump back to the branch. The
    /// condition is evaluated again just before that jump.
    fn while_loop(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let evaluation_start = order.len();
        let (left, relation, right) = self.condition(node, order)?;
        let evaluation = order[evaluation_start..].to_vec();
        let branch = self.emit(order, branch_kind(left, relation, right));

        let body = find_child(node, &self.names.body, 1).ok_or_else(|| missing(node, "body"))?;
        let body_start = order.len();
        self.flatten(body, order)?;
        let closing = order.pop().ok_or_else(|| missing(node, "body"))?;

        for id in evaluation {
            if let Some(statement) = self.program.get(id) {
                let kind = statement.kind.clone();
                self.emit(order, kind);
            }
        }
        self.emit(order, StatementKind::Goto { target: Some(branch) });
        order.push(closing);

        let body_first = order.get(body_start).copied();
        self.set_branches(branch, body_first, Some(closing));
        Ok(())
    }

    /// Body first, then the exit test: true leaves the loop, false repeats.
    fn repeat_loop(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let start = self.emit(order, StatementKind::NoOp);
        let body = find_child(node, &self.names.body, 1).ok_or_else(|| missing(node, "body"))?;
        self.flatten(body, order)?;

        let (left, relation, right) = self.condition(node, order)?;
        let branch = self.emit(order, branch_kind(left, relation, right));
        let end = self.emit(order, StatementKind::NoOp);
        self.set_branches(branch, Some(end), Some(start));
        Ok(())
    }

    fn print(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let operand = node
            .children
            .get(1)
            .ok_or_else(|| missing(node, "operand"))?;
        let access = self
            .expression(operand, order)?
            .ok_or_else(|| missing(node, "operand"))?;
        self.emit(
            order,
            StatementKind::Print {
                access: Some(access),
            },
        );
        Ok(())
    }

    fn call(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<()> {
        let function = node
            .first_token()
            .map(ToString::to_string)
            .ok_or_else(|| missing(node, "function name"))?;
        let argument = match node.children.get(2) {
            Some(argument) => self.expression(argument, order)?,
            None => None,
        };
        self.emit(order, StatementKind::Call { function, argument });
        Ok(())
    }

    /// Finds the condition node and emits one temporary per side of its
    /// relational operator.
    fn condition(
        &mut self,
        node: &SyntaxNode,
        order: &mut Vec<StatementId>,
    ) -> CompileResult<(Access, Relation, Access)> {
        let condition = find_child(node, &self.names.condition, 2)
            .ok_or_else(|| missing(node, "condition"))?;
        let children = &condition.children;
        let (index, relation) = children
            .iter()
            .enumerate()
            .find_map(|(index, child)| {
                single_leaf_literal(child)
                    .and_then(Relation::from_symbol)
                    .map(|relation| (index, relation))
            })
            .ok_or_else(|| missing(condition, "relational operator"))?;

        let left_node = index
            .checked_sub(1)
            .and_then(|left| children.get(left))
            .ok_or_else(|| missing(condition, "left operand"))?;
        let right_node = children
            .get(index + 1)
            .ok_or_else(|| missing(condition, "right operand"))?;

        let left = self
            .expression(left_node, order)?
            .ok_or_else(|| missing(condition, "left operand"))?;
        let right = self
            .expression(right_node, order)?
            .ok_or_else(|| missing(condition, "right operand"))?;
        let left = self.copy_to_temporary(left, order);
        let right = self.copy_to_temporary(right, order);
        Ok((left, relation, right))
    }

    fn expression(
        &mut self,
        node: &SyntaxNode,
        order: &mut Vec<StatementId>,
    ) -> CompileResult<Option<Access>> {
        if node.is_leaf() {
            return self.leaf(node);
        }
        if node.symbol == self.names.array {
            return self.array(node, order).map(Some);
        }
        self.operand_sequence(&node.children, node.line, order)
    }

    fn leaf(&mut self, node: &SyntaxNode) -> CompileResult<Option<Access>> {
        let Some(token) = &node.token else {
            return Ok(None);
        };
        let access = match &token.kind {
            TokenKind::Word(name) if node.symbol == CLASS_IDENTIFIER => {
                Some(self.variable(name)?)
            }
            TokenKind::Word(_) | TokenKind::Punct(_) => None,
            TokenKind::Integer(value) => Some(Access::constant(Value::Int(*value))),
            TokenKind::Real(value) => Some(Access::constant(Value::Real(*value))),
            TokenKind::Str(value) => Some(Access::constant(Value::Str(value.clone()))),
        };
        Ok(access)
    }

    /// Operands separated by arithmetic operators, folded left to right with
    /// one temporary per operation.
    fn operand_sequence(
        &mut self,
        nodes: &[SyntaxNode],
        line: usize,
        order: &mut Vec<StatementId>,
    ) -> CompileResult<Option<Access>> {
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        for node in nodes {
            if let Some(operator) = single_leaf_literal(node).and_then(ArithOp::from_symbol) {
                operators.push(operator);
            } else if let Some(access) = self.expression(node, order)? {
                operands.push(access);
            }
        }

        if operands.is_empty() && operators.is_empty() {
            return Ok(None);
        }
        if operands.len() != operators.len() + 1 {
            return Err(CompileError::MalformedExpression {
                line,
                operands: operands.len(),
                operators: operators.len(),
            });
        }

        let mut operands = operands.into_iter();
        let Some(mut accumulated) = operands.next() else {
            return Ok(None);
        };
        for (operator, right) in operators.into_iter().zip(operands) {
            let temporary = self.registry.add_temporary();
            self.emit(
                order,
                StatementKind::Assign {
                    target: Some(Access::variable(temporary)),
                    left: Some(accumulated),
                    right: Some(right),
                    operator: Some(operator),
                },
            );
            accumulated = Access::variable(temporary);
        }
        Ok(Some(accumulated))
    }

    /// `ID [ expr ]`. An index that is itself indexed is copied into a
    /// temporary so the access stays one level deep.
    fn array(&mut self, node: &SyntaxNode, order: &mut Vec<StatementId>) -> CompileResult<Access> {
        let base = match node.children.first() {
            Some(first) => self.expression(first, order)?,
            None => None,
        }
        .ok_or_else(|| missing(node, "array name"))?;
        let index_node = node
            .children
            .get(2)
            .ok_or_else(|| missing(node, "index"))?;
        let index = self
            .expression(index_node, order)?
            .ok_or_else(|| missing(node, "index"))?;

        let index = if index.index.is_some() {
            self.copy_to_temporary(index, order).base
        } else {
            index.base
        };
        Ok(Access {
            base: base.base,
            index: Some(index),
        })
    }

    fn variable(&mut self, name: &str) -> CompileResult<Access> {
        self.registry
            .ensure_variable(name)
            .map(Access::variable)
            .ok_or_else(|| CompileError::UndeclarableVariable {
                name: name.to_string(),
            })
    }

    fn copy_to_temporary(&mut self, value: Access, order: &mut Vec<StatementId>) -> Access {
        let temporary = self.registry.add_temporary();
        self.emit(
            order,
            StatementKind::Assign {
                target: Some(Access::variable(temporary)),
                left: Some(value),
                right: None,
                operator: None,
            },
        );
        Access::variable(temporary)
    }

    fn set_branches(
        &mut self,
        branch: StatementId,
        when_true: Option<StatementId>,
        when_false: Option<StatementId>,
    ) {
        if let Some(statement) = self.program.get_mut(branch)
            && let StatementKind::If {
                on_true, on_false, ..
            } = &mut statement.kind
        {
            *on_true = when_true;
            *on_false = when_false;
        }
    }
}

fn branch_kind(left: Access, relation: Relation, right: Access) -> StatementKind {
    StatementKind::If {
        left: Some(left),
        right: Some(right),
        relation: Some(relation),
        on_true: None,
        on_false: None,
    }
}

fn missing(node: &SyntaxNode, part: &'static str) -> CompileError {
    CompileError::MissingPart {
        symbol: node.symbol.clone(),
        part,
        line: node.line,
    }
}

/// Text of a keyword or punctuation leaf.
fn literal(node: &SyntaxNode) -> Option<&str> {
    node.token.as_ref().and_then(|token| token.literal_text())
}

/// Literal at the bottom of a chain of single-child nodes, as produced by
/// rules such as `op -> +`.
fn single_leaf_literal(node: &SyntaxNode) -> Option<&str> {
    let mut current = node;
    while let [only] = current.children.as_slice() {
        current = only;
    }
    match current.token.as_ref()?.kind() {
        TokenKind::Punct(text) => Some(text.as_str()),
        _ => None,
    }
}

/// Breadth-first search for `symbol` among the descendants of `node`, at
/// most `depth` levels down.
fn find_child<'t>(node: &'t SyntaxNode, symbol: &str, depth: usize) -> Option<&'t SyntaxNode> {
    let mut level: Vec<&SyntaxNode> = vec![node];
    for _ in 0..depth {
        let next: Vec<&SyntaxNode> = level
            .iter()
            .flat_map(|node| node.children.iter())
            .collect();
        if let Some(found) = next.iter().copied().find(|child| child.symbol == symbol) {
            return Some(found);
        }
        level = next;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::ir::Operand;

    fn compile_source(source: &str) -> (Program, Registry) {
        let session = fixtures::session(source);
        let mut registry = Registry::new();
        let tree = session.tree().expect("program should have a tree");
        let program =
            compile(tree, &mut registry, &StatementNames::default()).expect("compile failed");
        (program, registry)
    }

    fn is_goto(kind: &StatementKind) -> bool {
        matches!(kind, StatementKind::Goto { .. })
    }

    fn is_branch(kind: &StatementKind) -> bool {
        matches!(kind, StatementKind::If { .. })
    }

    #[test]
    fn binary_assignment_uses_one_temporary() {
        let (program, registry) = compile_source("a = 1; b = a + 2;");
        assert_eq!(registry.temporary_count(), 1);

        let assignments: Vec<_> = program
            .statements
            .iter()
            .filter_map(|statement| match &statement.kind {
                StatementKind::Assign {
                    target, operator, ..
                } => Some((target.clone(), *operator)),
                _ => None,
            })
            .collect();
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[1].1, Some(ArithOp::Add));
        let b = registry.id_of("b").expect("b declared");
        assert_eq!(assignments[2].0, Some(Access::variable(b)));
    }

    #[test]
    fn three_operands_fold_left() {
        let (program, registry) = compile_source("x = 8 - 2 - 1;");
        assert_eq!(registry.temporary_count(), 2);
        let operators: Vec<_> = program
            .statements
            .iter()
            .filter_map(|statement| match &statement.kind {
                StatementKind::Assign {
                    operator: Some(operator),
                    left,
                    ..
                } => Some((*operator, left.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(operators.len(), 2);
        assert_eq!(operators[0].1, Some(Access::constant(Value::Int(8))));
        let first_temporary = registry.id_of("temp#0").expect("temp#0");
        assert_eq!(operators[1].1, Some(Access::variable(first_temporary)));
    }

    #[test]
    fn while_loop_has_single_back_edge_to_its_branch() {
        let (program, _) =
            compile_source("i = 0; while (i < 3) { print i; i = i + 1; }");
        assert_eq!(program.count(is_goto), 1);
        assert_eq!(program.count(is_branch), 1);

        let branch = program
            .statements
            .iter()
            .position(|statement| is_branch(&statement.kind))
            .map(StatementId)
            .expect("branch");
        let goto = program
            .statements
            .iter()
            .find(|statement| is_goto(&statement.kind))
            .expect("goto");
        assert_eq!(goto.kind, StatementKind::Goto { target: Some(branch) });

        let Some(StatementKind::If { on_false, .. }) = program.get(branch).map(|s| &s.kind) else {
            panic!("expected branch");
        };
        let exit = on_false.expect("false branch");
        assert_eq!(program.get(exit).map(|s| &s.kind), Some(&StatementKind::NoOp));
    }

    #[test]
    fn if_without_else_falls_through_to_body_end() {
        let (program, _) = compile_source("x = 1; if (x > 0) { print x; }");
        assert_eq!(program.count(is_goto), 0);
        let Some(StatementKind::If { on_true, on_false, .. }) = program
            .statements
            .iter()
            .map(|statement| &statement.kind)
            .find(|kind| is_branch(kind))
        else {
            panic!("expected branch");
        };
        assert!(on_true.is_some());
        assert!(on_true < on_false);
    }

    #[test]
    fn else_branch_skips_with_goto() {
        let (program, _) = compile_source("x = 1; if (x > 5) { print 1; } else { print 2; }");
        assert_eq!(program.count(is_goto), 1);
        assert_eq!(
            program.count(|kind| matches!(kind, StatementKind::Print { .. })),
            2
        );
    }

    #[test]
    fn array_index_becomes_access_index() {
        let (program, registry) = compile_source("var a : int [ 3 ]; a[1] = 4; print a[1];");
        let a = registry.id_of("a").expect("a");
        let printed = program
            .statements
            .iter()
            .find_map(|statement| match &statement.kind {
                StatementKind::Print { access } => access.clone(),
                _ => None,
            })
            .expect("print");
        assert_eq!(printed.base, Operand::Variable(a));
        assert_eq!(printed.index, Some(Operand::Constant(Value::Int(1))));
    }

    #[test]
    fn nested_index_is_copied_to_a_temporary() {
        let (program, registry) = compile_source("print a[b[0]];");
        assert_eq!(registry.temporary_count(), 1);
        let temporary = registry.id_of("temp#0").expect("temp#0");
        let printed = program
            .statements
            .iter()
            .find_map(|statement| match &statement.kind {
                StatementKind::Print { access } => access.clone(),
                _ => None,
            })
            .expect("print");
        assert_eq!(printed.index, Some(Operand::Variable(temporary)));
    }

    #[test]
    fn call_takes_name_and_argument() {
        let (program, _) = compile_source("debug();");
        assert_eq!(
            program.count(|kind| matches!(
                kind,
                StatementKind::Call { function, argument: None } if function == "debug"
            )),
            1
        );
    }

    #[test]
    fn other_nodes_become_no_ops() {
        let (program, _) = compile_source("print 1;");
        assert_eq!(program.entry, Some(StatementId(0)));
        assert_eq!(program.get(StatementId(0)).map(|s| &s.kind), Some(&StatementKind::NoOp));
    }
}
