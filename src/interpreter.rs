use std::cmp::Ordering;

use tracing::{debug, trace};

mod error;

pub use error::{InterpreterError, InterpreterResult};

use crate::builtins::Builtin;
use crate::ir::{Access, ArithOp, Operand, Program, StatementId, StatementKind};
use crate::registry::{PRIM_STRING, Registry, Value, VarId};

/// Runs `program` from its entry statement until a statement has no
/// successor, and returns the printed lines.
pub fn execute(
    program: &Program,
    registry: &mut Registry,
    step_limit: usize,
) -> InterpreterResult<Vec<String>> {
    let mut interpreter = Interpreter {
        program,
        registry,
        output: Vec::new(),
    };
    interpreter.run(step_limit)?;
    Ok(interpreter.output)
}

/// Location a resolved access reads from or writes to.
enum Place {
    Slot { id: VarId, index: usize },
    Constant(Value),
}

struct Interpreter<'a> {
    program: &'a Program,
    registry: &'a mut Registry,
    output: Vec<String>,
}

impl Interpreter<'_> {
    fn run(&mut self, step_limit: usize) -> InterpreterResult<()> {
        let mut current = self.program.entry;
        let mut steps = 0usize;
        while let Some(id) = current {
            steps += 1;
            if steps > step_limit {
                return Err(InterpreterError::StepLimitExceeded { limit: step_limit });
            }
            current = self.step(id)?;
        }
        debug!(steps, lines = self.output.len(), "program finished");
        Ok(())
    }

    /// Executes one statement and returns the statement to run next.
    fn step(&mut self, id: StatementId) -> InterpreterResult<Option<StatementId>> {
        let program = self.program;
        let statement = program
            .get(id)
            .ok_or_else(|| corrupt(id, "dangling statement id"))?;
        trace!(statement = id.0, kind = ?statement.kind, "execute");

        match &statement.kind {
            StatementKind::NoOp => {}
            StatementKind::Print { access } => {
                let access = access.as_ref().ok_or_else(|| corrupt(id, "print without operand"))?;
                let value = self.read(id, access)?;
                self.output.push(value.to_string());
            }
            StatementKind::Assign {
                target,
                left,
                right,
                operator,
            } => {
                let target = target
                    .as_ref()
                    .ok_or_else(|| corrupt(id, "assignment without target"))?;
                let left = left
                    .as_ref()
                    .ok_or_else(|| corrupt(id, "assignment without operand"))?;
                let value = match operator {
                    None => self.read(id, left)?,
                    Some(operator) => {
                        let right = right
                            .as_ref()
                            .ok_or_else(|| corrupt(id, "binary assignment without second operand"))?;
                        self.arithmetic(id, *operator, left, right)?
                    }
                };
                self.write(id, target, value)?;
            }
            StatementKind::If {
                left,
                right,
                relation,
                on_true,
                on_false,
            } => {
                let (Some(left), Some(right), Some(relation)) = (left, right, relation) else {
                    return Err(corrupt(id, "branch without comparison"));
                };
                let (Some(on_true), Some(on_false)) = (on_true, on_false) else {
                    return Err(corrupt(id, "branch without target"));
                };
                let left = self.read(id, left)?;
                let right = self.read(id, right)?;
                let taken = if relation.holds(compare(&left, &right)?) {
                    *on_true
                } else {
                    *on_false
                };
                return Ok(Some(taken));
            }
            StatementKind::Goto { target } => {
                let target = target.ok_or_else(|| corrupt(id, "goto without target"))?;
                return Ok(Some(target));
            }
            StatementKind::Call { function, argument } => {
                let builtin = Builtin::from_name(function).ok_or_else(|| {
                    InterpreterError::UndefinedFunction {
                        name: function.clone(),
                    }
                })?;
                trace!(builtin = builtin.name(), "call");
                match builtin {
                    Builtin::Print => {
                        let line = match argument {
                            Some(argument) => self.read(id, argument)?.to_string(),
                            None => String::new(),
                        };
                        self.output.push(line);
                    }
                    Builtin::Debug => self.output.extend(self.registry.describe_types()),
                }
            }
        }
        Ok(statement.next)
    }

    fn arithmetic(
        &mut self,
        id: StatementId,
        operator: ArithOp,
        left: &Access,
        right: &Access,
    ) -> InterpreterResult<Value> {
        let textual = self.is_string_typed(left) || self.is_string_typed(right);
        let left = self.read(id, left)?;
        let right = self.read(id, right)?;
        combine(operator, left, right, textual)
    }

    fn is_string_typed(&self, access: &Access) -> bool {
        access
            .variable_id()
            .and_then(|id| self.registry.variable(id))
            .is_some_and(|variable| self.registry.lowest_type(&variable.type_name) == PRIM_STRING)
    }

    fn resolve(&self, id: StatementId, access: &Access) -> InterpreterResult<Place> {
        let index = match &access.index {
            None => 0,
            Some(operand) => {
                let value = self.operand(id, operand, 0)?;
                value.as_index().ok_or_else(|| InterpreterError::InvalidIndex {
                    index: value.to_string(),
                })?
            }
        };
        match &access.base {
            Operand::Variable(variable) => Ok(Place::Slot {
                id: *variable,
                index,
            }),
            Operand::Constant(_) if access.index.is_some() => {
                Err(corrupt(id, "indexed constant"))
            }
            Operand::Constant(value) => Ok(Place::Constant(value.clone())),
        }
    }

    fn operand(&self, id: StatementId, operand: &Operand, index: usize) -> InterpreterResult<Value> {
        match operand {
            Operand::Constant(value) => Ok(value.clone()),
            Operand::Variable(variable) => self.slot(id, *variable, index),
        }
    }

    fn slot(&self, id: StatementId, variable: VarId, index: usize) -> InterpreterResult<Value> {
        let name = self
            .registry
            .variable(variable)
            .map(|variable| variable.name.clone())
            .ok_or_else(|| corrupt(id, "unknown variable"))?;
        self.registry
            .value(variable, index)
            .cloned()
            .ok_or(InterpreterError::IndexOutOfRange { name, index })
    }

    fn read(&self, id: StatementId, access: &Access) -> InterpreterResult<Value> {
        match self.resolve(id, access)? {
            Place::Constant(value) => Ok(value),
            Place::Slot { id: variable, index } => self.slot(id, variable, index),
        }
    }

    fn write(&mut self, id: StatementId, target: &Access, value: Value) -> InterpreterResult<()> {
        let Place::Slot {
            id: variable,
            index,
        } = self.resolve(id, target)?
        else {
            return Err(corrupt(id, "assignment to a constant"));
        };
        if self.registry.set_value(variable, value.clone(), index) {
            return Ok(());
        }
        let name = self
            .registry
            .variable(variable)
            .map(|variable| variable.name.clone())
            .unwrap_or_default();
        Err(InterpreterError::AssignmentRejected {
            name,
            value: value.to_string(),
        })
    }
}

fn corrupt(id: StatementId, detail: &'static str) -> InterpreterError {
    InterpreterError::Corrupt {
        statement: id.0,
        detail,
    }
}

/// Applies `operator`. Strings only concatenate; mixed numbers widen to
/// reals; integer division stays integral when it is exact.
fn combine(operator: ArithOp, left: Value, right: Value, textual: bool) -> InterpreterResult<Value> {
    let textual = textual || matches!(left, Value::Str(_)) || matches!(right, Value::Str(_));
    if textual {
        return match operator {
            ArithOp::Add => Ok(Value::Str(format!("{left}{right}"))),
            _ => Err(InterpreterError::UnsupportedOperation {
                operation: operator.symbol().to_string(),
                type_name: PRIM_STRING.to_string(),
            }),
        };
    }

    if let (Value::Int(left), Value::Int(right)) = (&left, &right) {
        let (left, right) = (*left, *right);
        let overflow = || InterpreterError::Overflow {
            operation: operator.symbol().to_string(),
        };
        return match operator {
            ArithOp::Add => left.checked_add(right).map(Value::Int).ok_or_else(overflow),
            ArithOp::Sub => left.checked_sub(right).map(Value::Int).ok_or_else(overflow),
            ArithOp::Mul => left.checked_mul(right).map(Value::Int).ok_or_else(overflow),
            ArithOp::Div if right == 0 => Err(InterpreterError::DivisionByZero),
            ArithOp::Div if left % right == 0 => {
                left.checked_div(right).map(Value::Int).ok_or_else(overflow)
            }
            ArithOp::Div => Ok(Value::Real(left as f64 / right as f64)),
        };
    }

    let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) else {
        return Err(InterpreterError::UnsupportedOperation {
            operation: operator.symbol().to_string(),
            type_name: PRIM_STRING.to_string(),
        });
    };
    let result = match operator {
        ArithOp::Add => left + right,
        ArithOp::Sub => left - right,
        ArithOp::Mul => left * right,
        ArithOp::Div if right == 0.0 => return Err(InterpreterError::DivisionByZero),
        ArithOp::Div => left / right,
    };
    Ok(Value::Real(result))
}

/// Compares both values as numbers; text is read numerically first. Only a
/// NaN cannot be compared.
fn compare(left: &Value, right: &Value) -> InterpreterResult<Ordering> {
    match (left.to_number(), right.to_number()) {
        (Value::Int(left), Value::Int(right)) => Ok(left.cmp(&right)),
        (l, r) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(l, r)| l.partial_cmp(&r))
            .ok_or_else(|| InterpreterError::TypeMismatch {
                left: left.to_string(),
                right: right.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::fixtures;
    use crate::ir::Relation;
    use indoc::indoc;

    fn run(source: &str) -> Vec<String> {
        fixtures::run(source).expect("program should run")
    }

    fn run_err(source: &str) -> String {
        fixtures::run(source)
            .expect_err("program should fail")
            .to_string()
    }

    #[test]
    fn binary_assignment_stores_result() {
        let mut session = fixtures::session("a = 1; b = a + 2;");
        session.run().expect("program should run");
        let b = session.registry().get_variable("b").expect("b");
        assert_eq!(b.values, vec![Value::Int(3)]);
    }

    #[test]
    fn while_loop_counts() {
        assert_eq!(
            run("i = 0; while (i < 3) { print i; i = i + 1; }"),
            vec!["0", "1", "2"]
        );
    }

    #[test]
    fn false_condition_skips_loop_body() {
        assert_eq!(run("i = 5; while (i < 3) { print i; } print 9;"), vec!["9"]);
    }

    #[test]
    fn repeat_runs_body_at_least_once() {
        assert_eq!(run("i = 10; repeat { print i; } until (i > 0);"), vec!["10"]);
        assert_eq!(
            run("i = 0; repeat { i = i + 1; } until (i >= 3); print i;"),
            vec!["3"]
        );
    }

    #[test]
    fn if_else_picks_one_branch() {
        assert_eq!(
            run("x = 2; if (x > 5) { print 1; } else { print 2; } print 3;"),
            vec!["2", "3"]
        );
        assert_eq!(run("x = 7; if (x <> 5) { print 1; } print 3;"), vec!["1", "3"]);
    }

    #[test]
    fn mixed_arithmetic_widens_to_real() {
        assert_eq!(run("x = 1 + 2.5; print x;"), vec!["3.5"]);
        assert_eq!(run("x = 7 / 2; print x;"), vec!["3.5"]);
        assert_eq!(run("x = 6 / 2; print x;"), vec!["3"]);
    }

    #[test]
    fn strings_concatenate_with_numbers() {
        assert_eq!(run("s = \"n=\" + 4; print s;"), vec!["n=4"]);
        assert!(run_err("s = \"a\" - 1;").contains("not supported for type PRIM_STRING"));
    }

    #[test]
    fn arrays_store_per_index() {
        assert_eq!(
            run("var a : int [ 3 ]; a[0] = 4; a[2] = a[0] * 2; print a[2]; print a[1];"),
            vec!["8", "0"]
        );
    }

    #[test]
    fn builtin_calls_print_and_dump() {
        assert_eq!(run("x = 2; print(x + 1);"), vec!["3"]);
        let output = run("x = 1.5; debug();");
        assert!(output.contains(&"x : PRIM_REAL = 1.5".to_string()));
        assert_eq!(run_err("launch();"), "Undefined function 'launch'");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(run_err("x = 1 / 0;"), "Division by zero");
    }

    #[test]
    fn step_limit_stops_runaway_loops() {
        let config = SessionConfig {
            step_limit: 50,
            ..SessionConfig::default()
        };
        let mut session = fixtures::session_with(config, "i = 0; while (i < 1) { print i; }");
        let error = session.run().expect_err("loop never ends");
        assert!(error.to_string().contains("Step limit of 50"));
    }

    #[test]
    fn missing_parts_are_corrupt() {
        let mut registry = Registry::new();
        let mut program = Program::default();
        let goto = program.push(StatementKind::Goto { target: None });
        program.link(&[goto]);
        let error = execute(&program, &mut registry, 10).expect_err("corrupt");
        assert!(error.is_fatal());

        let mut program = Program::default();
        let branch = program.push(StatementKind::If {
            left: Some(Access::constant(Value::Int(1))),
            right: Some(Access::constant(Value::Int(2))),
            relation: Some(Relation::Less),
            on_true: Some(StatementId(9)),
            on_false: None,
        });
        program.link(&[branch]);
        assert_eq!(
            execute(&program, &mut registry, 10),
            Err(InterpreterError::Corrupt {
                statement: 0,
                detail: "branch without target",
            })
        );
    }

    #[test]
    fn dangling_jump_is_corrupt() {
        let mut registry = Registry::new();
        let mut program = Program::default();
        let goto = program.push(StatementKind::Goto {
            target: Some(StatementId(4)),
        });
        program.link(&[goto]);
        assert_eq!(
            execute(&program, &mut registry, 10),
            Err(InterpreterError::Corrupt {
                statement: 4,
                detail: "dangling statement id",
            })
        );
    }

    #[test]
    fn compares_numbers_across_kinds() {
        assert_eq!(compare(&Value::Int(2), &Value::Real(2.0)), Ok(Ordering::Equal));
        assert_eq!(compare(&Value::Int(2), &Value::Str("2".into())), Ok(Ordering::Equal));
        assert_eq!(
            compare(&Value::Str("10".into()), &Value::Str("9".into())),
            Ok(Ordering::Greater)
        );
        assert!(compare(&Value::Real(f64::NAN), &Value::Int(0)).is_err());
    }

    #[test]
    fn reassigned_variable_widens_to_real() {
        assert_eq!(run("x = 1; x = x + 0.5; print x;"), vec!["1.5"]);
        assert_eq!(run("x = 2.5; x = 4; print x;"), vec!["4"]);
    }

    #[test]
    fn loop_temporaries_take_each_result_kind() {
        let source = indoc! {"
            a = 2;
            b = 2;
            i = 0;
            while (i < 3) {
                c = a / b;
                print c;
                a = a + 1;
                i = i + 1;
            }
        "};
        assert_eq!(run(source), vec!["1", "1.5", "2"]);
        assert_eq!(
            run("i = 0; while (i < 2) { print i * 0.5 + 1; i = i + 1; }"),
            vec!["1.0", "1.5"]
        );
    }

    #[test]
    fn string_operands_compare_as_numbers() {
        assert_eq!(
            run("s = \"10\"; t = \"9\"; if (s < t) { print 1; } print 2;"),
            vec!["2"]
        );
        assert_eq!(
            run("s = \"abc\"; if (s = 0) { print \"zero\"; } else { print \"other\"; }"),
            vec!["zero"]
        );
        assert_eq!(run("var n : string; n = 7; if (n > 6) { print n; }"), vec!["7"]);
    }

    #[test]
    fn print_builtin_emits_its_argument() {
        let mut registry = Registry::new();
        let mut program = Program::default();
        let call = program.push(StatementKind::Call {
            function: "print".into(),
            argument: Some(Access::constant(Value::Real(2.5))),
        });
        let empty = program.push(StatementKind::Call {
            function: "print".into(),
            argument: None,
        });
        program.link(&[call, empty]);
        assert_eq!(
            execute(&program, &mut registry, 10),
            Ok(vec!["2.5".to_string(), String::new()])
        );
    }
}
