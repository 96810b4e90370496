#![allow(dead_code)]
use std::path::Path;

use incparse::{Session, SessionConfig};
use test_support::{Case, load_cases};

/// Bench-enabled fixture cases as (label, case) pairs.
pub fn workloads() -> Vec<(String, Case)> {
    let cases = load_cases(Path::new("tests/programs"))
        .unwrap_or_else(|err| panic!("load cases: {err}"));
    cases
        .into_iter()
        .filter(|case| case.spec.bench.enabled)
        .map(|case| (format!("{}_{}", case.spec.bench.tags.join("_"), case.name), case))
        .collect()
}

pub fn load_grammar(case: &Case) -> String {
    case.grammar(Path::new("."))
        .unwrap_or_else(|err| panic!("grammar for {}: {err}", case.name))
}

pub fn load_source(case: &Case) -> String {
    case.program()
        .unwrap_or_else(|err| panic!("program for {}: {err}", case.name))
}

/// Session with the grammar loaded, ready for program text.
pub fn grammar_session(grammar: &str) -> Session {
    let mut session = Session::new(SessionConfig::default());
    session
        .load_grammar(grammar)
        .unwrap_or_else(|err| panic!("load grammar: {err}"));
    session
}

pub fn parsed_session(case: &Case) -> Session {
    let mut session = grammar_session(&load_grammar(case));
    session
        .load_program(&load_source(case))
        .unwrap_or_else(|err| panic!("parse {}: {err}", case.name));
    session
}
