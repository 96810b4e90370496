pub mod builtins;
pub mod compiler;
pub mod config;
pub mod declarations;
pub mod grammar;
pub mod interpreter;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod session;
pub mod token;

#[cfg(test)]
mod fixtures;

pub use config::SessionConfig;
pub use session::{Session, SessionError, SessionResult, SessionStage};
