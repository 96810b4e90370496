use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("'{symbol}' at line {line} has no {part}")]
    MissingPart {
        symbol: String,
        part: &'static str,
        line: usize,
    },
    #[error(
        "Malformed expression at line {line}: {operands} operands for {operators} operators"
    )]
    MalformedExpression {
        line: usize,
        operands: usize,
        operators: usize,
    },
    #[error("Cannot assign to a constant at line {line}")]
    ConstantTarget { line: usize },
    #[error("Variable '{name}' could not be declared")]
    UndeclarableVariable { name: String },
}

pub type CompileResult<T> = Result<T, CompileError>;
