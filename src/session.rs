use thiserror::Error;
use tracing::{debug, info};

use crate::compiler::{self, CompileError};
use crate::config::SessionConfig;
use crate::declarations::{DeclarationError, DeclarationWalker, WalkStatus};
use crate::grammar::{Grammar, GrammarBuilder, GrammarError};
use crate::interpreter::{self, InterpreterError};
use crate::ir::Program;
use crate::lexer::{LexError, tokenize_line};
use crate::parser::{ParseError, Parser, SyntaxNode};
use crate::registry::Registry;
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Interpreter(#[from] InterpreterError),
    #[error("No program has been parsed")]
    NoProgram,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Which kind of text the session expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Grammar,
    Program,
}

/// One grammar, one program and the registry they run against.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    builder: GrammarBuilder,
    parser: Parser,
    registry: Registry,
    walker: DeclarationWalker,
    /// Program tokens waiting for a terminator.
    pending: Vec<Token>,
    source_line: usize,
    program: Option<Program>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            builder: GrammarBuilder::new(config.markers.clone()),
            config,
            parser: Parser::new(),
            registry: Registry::new(),
            walker: DeclarationWalker::new(),
            pending: Vec::new(),
            source_line: 0,
            program: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stage(&self) -> SessionStage {
        if self.builder.is_finished() {
            SessionStage::Program
        } else {
            SessionStage::Grammar
        }
    }

    /// Routes a line of input to the grammar builder or to the parser.
    pub fn feed_line(&mut self, line: &str) -> SessionResult<()> {
        match self.stage() {
            SessionStage::Grammar => self.feed_grammar_line(line),
            SessionStage::Program => self.feed_program_line(line).map(|_| ()),
        }
    }

    pub fn feed_grammar_line(&mut self, line: &str) -> SessionResult<()> {
        self.builder.feed_text(line)?;
        if self.builder.is_finished() {
            debug!("grammar frozen, expecting program text");
        }
        Ok(())
    }

    pub fn load_grammar(&mut self, text: &str) -> SessionResult<()> {
        for line in text.lines() {
            self.feed_grammar_line(line)?;
        }
        Ok(())
    }

    /// Tokenizes `line` and hands every terminated statement to the parser.
    /// Returns whether the parser expects more input.
    pub fn feed_program_line(&mut self, line: &str) -> SessionResult<bool> {
        self.source_line += 1;
        let grammar = self.builder.grammar()?;
        let tokens = tokenize_line(line, self.source_line)?;
        self.program = None;

        for token in tokens {
            let terminates = token
                .literal_text()
                .is_some_and(|text| self.config.is_terminator(text));
            self.pending.push(token);
            if terminates {
                flush(grammar, &mut self.parser, &mut self.pending)?;
            }
        }
        Ok(!self.parser.is_complete())
    }

    /// Feeds whatever is left over after the last terminator.
    pub fn finish_program(&mut self) -> SessionResult<bool> {
        let grammar = self.builder.grammar()?;
        flush(grammar, &mut self.parser, &mut self.pending)?;
        Ok(!self.parser.is_complete())
    }

    pub fn load_program(&mut self, text: &str) -> SessionResult<()> {
        for line in text.lines() {
            self.feed_program_line(line)?;
        }
        self.finish_program().map(|_| ())
    }

    pub fn grammar(&self) -> SessionResult<&Grammar> {
        Ok(self.builder.grammar()?)
    }

    pub fn tree(&self) -> Option<&SyntaxNode> {
        self.parser.root()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// `P_ERROR CODE n` lines for the recorded grammar errors.
    pub fn error_report(&self) -> Vec<String> {
        self.builder.errors().report()
    }

    pub fn first_sets(&self) -> SessionResult<Vec<String>> {
        Ok(self.grammar()?.describe_first())
    }

    pub fn follow_sets(&self) -> SessionResult<Vec<String>> {
        Ok(self.grammar()?.describe_follow())
    }

    /// Rebuilds the registry from the declarations in the current tree.
    /// Returns how many times the walk suspended at a loop.
    pub fn declare(&mut self) -> SessionResult<usize> {
        let tree = self.parser.root().ok_or(SessionError::NoProgram)?;
        self.registry.clear();
        let mut suspensions = 0;
        let mut status = self.walker.walk(tree, &mut self.registry, &self.config)?;
        while status == WalkStatus::Suspended {
            suspensions += 1;
            status = self.walker.resume(tree, &mut self.registry, &self.config)?;
        }
        debug!(suspensions, "declarations applied");
        Ok(suspensions)
    }

    /// Declares and compiles the current tree. A critical grammar error
    /// blocks compilation.
    pub fn compile(&mut self) -> SessionResult<&Program> {
        self.builder.grammar()?;
        self.declare()?;
        let tree = self.parser.root().ok_or(SessionError::NoProgram)?;
        let program = compiler::compile(tree, &mut self.registry, &self.config.statements)?;
        Ok(self.program.insert(program))
    }

    /// Compiles and executes the current tree from a fresh registry.
    pub fn run(&mut self) -> SessionResult<Vec<String>> {
        self.compile()?;
        let program = self.program.as_ref().ok_or(SessionError::NoProgram)?;
        let output = interpreter::execute(program, &mut self.registry, self.config.step_limit)?;
        info!(lines = output.len(), "program executed");
        Ok(output)
    }

    /// Statement listing of the last compiled program.
    pub fn listing(&self) -> Option<String> {
        self.program
            .as_ref()
            .map(|program| program.render(&self.registry))
    }

    /// Discards the program: tree, pending tokens, registry and IR.
    pub fn clear_program(&mut self) {
        self.parser.clear();
        self.pending.clear();
        self.registry.clear();
        self.walker.clear();
        self.program = None;
        self.source_line = 0;
    }

    /// Discards the program and the grammar.
    pub fn clear(&mut self) {
        self.clear_program();
        self.builder.clear();
        debug!("session cleared");
    }
}

fn flush(grammar: &Grammar, parser: &mut Parser, pending: &mut Vec<Token>) -> SessionResult<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let tokens = std::mem::take(pending);
    parser.feed_line(grammar, &tokens)?;
    Ok(())
}
