use std::fmt;

use crate::registry::{Registry, Value, VarId};

/// Index into [`Program::statements`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(VarId),
    Constant(Value),
}

/// Value location read or written by a statement: a variable or a literal,
/// optionally indexed. Resolved again on every execution step.
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub base: Operand,
    pub index: Option<Operand>,
}

impl Access {
    pub fn variable(id: VarId) -> Self {
        Self {
            base: Operand::Variable(id),
            index: None,
        }
    }

    pub fn constant(value: Value) -> Self {
        Self {
            base: Operand::Constant(value),
            index: None,
        }
    }

    pub fn variable_id(&self) -> Option<VarId> {
        match self.base {
            Operand::Variable(id) => Some(id),
            Operand::Constant(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl Relation {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessEqual),
            "=" => Some(Self::Equal),
            "<>" | "!=" => Some(Self::NotEqual),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "=",
            Self::NotEqual => "<>",
        }
    }

    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Greater => ordering == Greater,
            Self::GreaterEqual => ordering != Less,
            Self::Less => ordering == Less,
            Self::LessEqual => ordering != Greater,
            Self::Equal => ordering == Equal,
            Self::NotEqual => ordering != Equal,
        }
    }
}

/// Statement payloads. Required parts are optional so that a damaged graph
/// can be represented; the interpreter rejects it when it gets there.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    NoOp,
    Print {
        access: Option<Access>,
    },
    /// `target = left` or `target = left op right`.
    Assign {
        target: Option<Access>,
        left: Option<Access>,
        right: Option<Access>,
        operator: Option<ArithOp>,
    },
    If {
        left: Option<Access>,
        right: Option<Access>,
        relation: Option<Relation>,
        on_true: Option<StatementId>,
        on_false: Option<StatementId>,
    },
    Goto {
        target: Option<StatementId>,
    },
    Call {
        function: String,
        argument: Option<Access>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub next: Option<StatementId>,
}

/// Statement arena. Edges are ids, so loops are plain back-references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub entry: Option<StatementId>,
}

impl Program {
    pub fn push(&mut self, kind: StatementKind) -> StatementId {
        self.statements.push(Statement { kind, next: None });
        StatementId(self.statements.len() - 1)
    }

    pub fn get(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(id.0)
    }

    pub fn get_mut(&mut self, id: StatementId) -> Option<&mut Statement> {
        self.statements.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Chains `order` through `next` and makes its head the entry point.
    pub fn link(&mut self, order: &[StatementId]) {
        for pair in order.windows(2) {
            if let Some(statement) = self.get_mut(pair[0]) {
                statement.next = Some(pair[1]);
            }
        }
        if let Some(&last) = order.last()
            && let Some(statement) = self.get_mut(last)
        {
            statement.next = None;
        }
        self.entry = order.first().copied();
    }

    pub fn count(&self, predicate: impl Fn(&StatementKind) -> bool) -> usize {
        self.statements
            .iter()
            .filter(|statement| predicate(&statement.kind))
            .count()
    }

    /// Human-readable listing, one statement per line, with variable names
    /// taken from `registry`.
    pub fn render(&self, registry: &Registry) -> String {
        let mut out = String::new();
        for (index, statement) in self.statements.iter().enumerate() {
            let next = statement
                .next
                .map(|id| format!(" -> {}", id.0))
                .unwrap_or_default();
            out.push_str(&format!(
                "{index:>4}: {}{next}\n",
                Listing(&statement.kind, registry)
            ));
        }
        out
    }
}

struct Listing<'a>(&'a StatementKind, &'a Registry);

impl Listing<'_> {
    fn access(&self, access: &Option<Access>) -> String {
        let Some(access) = access else {
            return "?".to_string();
        };
        let base = self.operand(&access.base);
        match &access.index {
            Some(index) => format!("{base}[{}]", self.operand(index)),
            None => base,
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Variable(id) => self
                .1
                .variable(*id)
                .map(|variable| variable.name.clone())
                .unwrap_or_else(|| format!("var{}", id.index())),
            Operand::Constant(Value::Str(text)) => format!("\"{text}\""),
            Operand::Constant(value) => value.to_string(),
        }
    }
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = |id: &Option<StatementId>| {
            id.map(|id| id.0.to_string())
                .unwrap_or_else(|| "?".to_string())
        };
        match self.0 {
            StatementKind::NoOp => write!(f, "noop"),
            StatementKind::Print { access } => write!(f, "print {}", self.access(access)),
            StatementKind::Assign {
                target: lhs,
                left,
                right,
                operator,
            } => {
                write!(f, "{} = {}", self.access(lhs), self.access(left))?;
                if let Some(operator) = operator {
                    write!(f, " {} {}", operator.symbol(), self.access(right))?;
                }
                Ok(())
            }
            StatementKind::If {
                left,
                right,
                relation,
                on_true,
                on_false,
            } => write!(
                f,
                "if {} {} {} then {} else {}",
                self.access(left),
                relation.map(Relation::symbol).unwrap_or("?"),
                self.access(right),
                target(on_true),
                target(on_false)
            ),
            StatementKind::Goto { target: goto } => write!(f, "goto {}", target(goto)),
            StatementKind::Call { function, argument } => {
                write!(f, "call {function}({})", self.access(argument))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_statements_in_order() {
        let mut program = Program::default();
        let a = program.push(StatementKind::NoOp);
        let b = program.push(StatementKind::NoOp);
        let c = program.push(StatementKind::Goto { target: Some(a) });
        program.link(&[a, b, c]);

        assert_eq!(program.entry, Some(a));
        assert_eq!(program.get(a).and_then(|s| s.next), Some(b));
        assert_eq!(program.get(c).and_then(|s| s.next), None);
    }

    #[test]
    fn relations_compare_orderings() {
        use std::cmp::Ordering;
        assert!(Relation::from_symbol("!=").is_some_and(|r| r.holds(Ordering::Less)));
        assert!(Relation::from_symbol("<=").is_some_and(|r| r.holds(Ordering::Equal)));
        assert!(!Relation::Greater.holds(Ordering::Equal));
        assert_eq!(Relation::from_symbol("=>"), None);
    }

    #[test]
    fn renders_listing() {
        let mut registry = Registry::new();
        registry.add_variable("x", None, 1);
        let x = registry.id_of("x").expect("x");

        let mut program = Program::default();
        let assign = program.push(StatementKind::Assign {
            target: Some(Access::variable(x)),
            left: Some(Access::variable(x)),
            right: Some(Access::constant(Value::Int(1))),
            operator: Some(ArithOp::Add),
        });
        let print = program.push(StatementKind::Print {
            access: Some(Access::variable(x)),
        });
        program.link(&[assign, print]);

        assert_eq!(
            program.render(&registry),
            "   0: x = x + 1 -> 1\n   1: print x\n"
        );
    }
}
