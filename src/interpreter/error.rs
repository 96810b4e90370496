use thiserror::Error;

/// Typed errors produced while executing a compiled statement graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    /// The statement graph is inconsistent. Execution cannot continue.
    #[error("Corrupt statement {statement}: {detail}")]
    Corrupt {
        statement: usize,
        detail: &'static str,
    },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Operation '{operation}' is not supported for type {type_name}")]
    UnsupportedOperation {
        operation: String,
        type_name: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in '{operation}'")]
    Overflow { operation: String },
    #[error("Cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },
    #[error("Invalid index {index}")]
    InvalidIndex { index: String },
    #[error("Index out of range: '{name}' has no element {index}")]
    IndexOutOfRange { name: String, index: usize },
    #[error("Cannot store '{value}' into '{name}'")]
    AssignmentRejected { name: String, value: String },
    #[error("Step limit of {limit} statements exceeded")]
    StepLimitExceeded { limit: usize },
}

impl InterpreterError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

pub type InterpreterResult<T> = Result<T, InterpreterError>;
