use tracing::debug;

use super::error::{GrammarError, GrammarErrorCode, GrammarErrors, GrammarResult};
use super::{END_OF_INPUT, EPSILON, Grammar, SymbolKind};
use crate::config::GrammarMarkers;
use crate::lexer::grammar_words;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Stage {
    #[default]
    CollectingNonTerminals,
    CollectingTerminals,
    CollectingRules,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RulePhase {
    ExpectKey,
    ExpectSeparator,
    Body,
}

/// Ingestion state machine that turns grammar words into a frozen
/// [`Grammar`].
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    markers: GrammarMarkers,
    grammar: Grammar,
    stage: Stage,
    phase: RulePhase,
    pending_key: Option<String>,
    /// `None` while the body of a rejected rule key is being skipped.
    key: Option<String>,
    body: Vec<String>,
    errors: GrammarErrors,
    position: usize,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new(GrammarMarkers::default())
    }
}

impl GrammarBuilder {
    pub fn new(markers: GrammarMarkers) -> Self {
        Self {
            markers,
            grammar: Grammar::default(),
            stage: Stage::default(),
            phase: RulePhase::ExpectKey,
            pending_key: None,
            key: None,
            body: Vec::new(),
            errors: GrammarErrors::default(),
            position: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn errors(&self) -> &GrammarErrors {
        &self.errors
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished && !self.errors.is_critical()
    }

    /// The frozen grammar, once ingestion finished without a critical error.
    pub fn grammar(&self) -> GrammarResult<&Grammar> {
        if self.errors.is_critical() {
            return Err(GrammarError::Halted);
        }
        if self.stage != Stage::Finished {
            return Err(GrammarError::NotFinished);
        }
        Ok(&self.grammar)
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.markers.clone());
    }

    pub fn feed_text(&mut self, text: &str) -> GrammarResult<()> {
        for word in grammar_words(text) {
            self.feed_token(word)?;
        }
        Ok(())
    }

    pub fn feed_token(&mut self, word: &str) -> GrammarResult<()> {
        if self.errors.is_critical() {
            return Err(GrammarError::Halted);
        }
        self.position += 1;

        if self.stage == Stage::Finished {
            debug!(word, "ignoring grammar text after end marker");
            return Ok(());
        }
        if word == self.markers.end_grammar {
            return self.freeze().map(|_| ());
        }

        let is_end_group = word == self.markers.end_group;
        let is_separator = word == self.markers.separator;
        match self.stage {
            Stage::CollectingNonTerminals if is_end_group => {
                self.advance_stage(Stage::CollectingTerminals);
                Ok(())
            }
            Stage::CollectingNonTerminals => {
                self.declare_symbol(SymbolKind::NonTerminal, word)
            }
            Stage::CollectingTerminals if is_end_group => self.enter_rules(),
            Stage::CollectingTerminals => self.declare_symbol(SymbolKind::Terminal, word),
            Stage::CollectingRules => match self.phase {
                RulePhase::ExpectKey if is_end_group => Ok(()),
                RulePhase::ExpectKey if is_separator => {
                    self.syntax_error("separator without a rule key")
                }
                RulePhase::ExpectKey => {
                    self.pending_key = Some(word.to_string());
                    self.phase = RulePhase::ExpectSeparator;
                    Ok(())
                }
                RulePhase::ExpectSeparator if is_separator => {
                    let key = self.pending_key.take().unwrap_or_default();
                    self.begin_rule(&key)
                }
                RulePhase::ExpectSeparator => {
                    self.syntax_error(&format!("expected '{}' after rule key", self.markers.separator))
                }
                RulePhase::Body if is_end_group => {
                    self.end_alternative();
                    Ok(())
                }
                RulePhase::Body if is_separator => {
                    self.syntax_error("separator inside a rule body")
                }
                RulePhase::Body => self.append_symbol(word),
            },
            Stage::Finished => Ok(()),
        }
    }

    pub fn declare_symbol(&mut self, kind: SymbolKind, name: &str) -> GrammarResult<()> {
        if self.stage >= Stage::CollectingRules {
            return self.syntax_error("symbol declared after rules started");
        }
        if !self.grammar.declare(kind, name) {
            debug!(name, "duplicate declaration ignored");
        }
        Ok(())
    }

    pub fn begin_rule(&mut self, key: &str) -> GrammarResult<()> {
        if self.stage != Stage::CollectingRules {
            return self.syntax_error("rule outside the rule section");
        }
        self.key = match self.grammar.kind_of(key) {
            Some(SymbolKind::NonTerminal) => Some(key.to_string()),
            Some(SymbolKind::Terminal) => {
                self.errors.record(GrammarErrorCode::NonModifiable);
                None
            }
            None => {
                self.errors.record(GrammarErrorCode::UndeclaredSymbol);
                None
            }
        };
        self.body.clear();
        self.phase = RulePhase::Body;
        Ok(())
    }

    pub fn append_symbol(&mut self, name: &str) -> GrammarResult<()> {
        if self.phase != RulePhase::Body {
            return self.syntax_error("symbol outside a rule body");
        }
        if self.grammar.kind_of(name).is_none() {
            self.errors.record(GrammarErrorCode::UndeclaredSymbol);
        }
        self.body.push(name.to_string());
        Ok(())
    }

    /// Closes the current alternative. An empty one derives EPSILON.
    pub fn end_alternative(&mut self) {
        let mut body = std::mem::take(&mut self.body);
        if let Some(key) = self.key.take() {
            if body.is_empty() {
                body.push(EPSILON.to_string());
            }
            debug!(key = %key, symbols = ?body, "rule alternative registered");
            self.grammar.push_alternative(&key, body);
        }
        self.phase = RulePhase::ExpectKey;
    }

    /// Closes ingestion and computes FIRST/FOLLOW.
    pub fn freeze(&mut self) -> GrammarResult<&Grammar> {
        if self.stage == Stage::Finished {
            return self.grammar();
        }
        if self.stage != Stage::CollectingRules {
            return self.syntax_error("grammar ended before the rule section");
        }
        if self.phase != RulePhase::ExpectKey {
            return self.syntax_error("grammar ended inside a rule");
        }

        self.grammar.terminate_start_alternatives();
        let start = self.grammar.start_symbol().map(str::to_string);
        for symbol in self.grammar.non_terminals() {
            if !self.grammar.has_rules(symbol) {
                self.errors.record(GrammarErrorCode::UnreachableNonterminal);
                if start.as_deref() == Some(symbol.as_str()) {
                    self.errors.record(GrammarErrorCode::NonModifiable);
                }
            }
        }
        self.grammar.compute_sets();
        self.advance_stage(Stage::Finished);
        Ok(&self.grammar)
    }

    fn enter_rules(&mut self) -> GrammarResult<()> {
        if self.grammar.terminals().is_empty() || self.grammar.non_terminals().is_empty() {
            return self.syntax_error("rules need declared terminals and non-terminals");
        }
        self.grammar.declare(SymbolKind::Terminal, END_OF_INPUT);
        self.grammar.declare(SymbolKind::Terminal, EPSILON);
        self.advance_stage(Stage::CollectingRules);
        Ok(())
    }

    fn advance_stage(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "grammar stage advanced");
        self.stage = stage;
    }

    fn syntax_error<T>(&mut self, detail: &str) -> GrammarResult<T> {
        self.errors.record(GrammarErrorCode::Syntax);
        tracing::warn!(position = self.position, detail, "critical grammar error");
        Err(GrammarError::Syntax {
            position: self.position,
            detail: detail.to_string(),
        })
    }
}
