//! Shared setup for unit tests that need a parsed program.

use crate::config::SessionConfig;
use crate::session::{Session, SessionResult};

pub const STATEMENTS_GRAMMAR: &str = include_str!("../grammars/statements.grammar");

pub fn session_with(config: SessionConfig, source: &str) -> Session {
    let mut session = Session::new(config);
    session
        .load_grammar(STATEMENTS_GRAMMAR)
        .unwrap_or_else(|err| panic!("statements grammar should load: {err}"));
    session
        .load_program(source)
        .unwrap_or_else(|err| panic!("program should parse: {err}\n{source}"));
    session
}

pub fn session(source: &str) -> Session {
    session_with(SessionConfig::default(), source)
}

pub fn run(source: &str) -> SessionResult<Vec<String>> {
    session(source).run()
}
