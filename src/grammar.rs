use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

mod builder;
mod error;
mod sets;

pub use builder::{GrammarBuilder, Stage};
pub use error::{GrammarError, GrammarErrorCode, GrammarErrors, GrammarResult};
pub use sets::{FirstStatus, first_of, follow_of};

/// Synthetic terminal for the empty derivation. Shares its spelling with the
/// default end-of-group marker.
pub const EPSILON: &str = "#";
/// Synthetic terminal appended to every alternative of the start symbol.
pub const END_OF_INPUT: &str = "$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Terminal,
    NonTerminal,
}

pub type Alternative = Vec<String>;
pub type SymbolSet = BTreeSet<String>;

/// Rule table plus the FIRST/FOLLOW sets computed when ingestion freezes it.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    non_terminals: Vec<String>,
    terminals: Vec<String>,
    kinds: FxHashMap<String, SymbolKind>,
    rules: Vec<(String, Vec<Alternative>)>,
    rule_index: FxHashMap<String, usize>,
    first: FxHashMap<String, SymbolSet>,
    follow: FxHashMap<String, SymbolSet>,
}

impl Grammar {
    /// Declares `name`; returns false when it was already declared.
    pub fn declare(&mut self, kind: SymbolKind, name: &str) -> bool {
        if self.kinds.contains_key(name) {
            return false;
        }
        self.kinds.insert(name.to_string(), kind);
        match kind {
            SymbolKind::Terminal => self.terminals.push(name.to_string()),
            SymbolKind::NonTerminal => self.non_terminals.push(name.to_string()),
        }
        true
    }

    pub fn kind_of(&self, symbol: &str) -> Option<SymbolKind> {
        self.kinds.get(symbol).copied()
    }

    pub fn is_terminal(&self, symbol: &str) -> bool {
        self.kind_of(symbol) == Some(SymbolKind::Terminal)
    }

    pub fn is_non_terminal(&self, symbol: &str) -> bool {
        self.kind_of(symbol) == Some(SymbolKind::NonTerminal)
    }

    pub fn terminals(&self) -> &[String] {
        &self.terminals
    }

    pub fn non_terminals(&self) -> &[String] {
        &self.non_terminals
    }

    /// The first declared non-terminal.
    pub fn start_symbol(&self) -> Option<&str> {
        self.non_terminals.first().map(String::as_str)
    }

    pub fn alternatives(&self, symbol: &str) -> &[Alternative] {
        self.rule_index
            .get(symbol)
            .map(|&index| self.rules[index].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_rules(&self, symbol: &str) -> bool {
        self.rule_index.contains_key(symbol)
    }

    /// Rule keys in the order they were first seen.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &[Alternative])> {
        self.rules
            .iter()
            .map(|(key, alternatives)| (key.as_str(), alternatives.as_slice()))
    }

    pub(crate) fn push_alternative(&mut self, key: &str, alternative: Alternative) {
        let index = match self.rule_index.get(key) {
            Some(&index) => index,
            None => {
                self.rules.push((key.to_string(), Vec::new()));
                let index = self.rules.len() - 1;
                self.rule_index.insert(key.to_string(), index);
                index
            }
        };
        self.rules[index].1.push(alternative);
    }

    pub(crate) fn terminate_start_alternatives(&mut self) {
        let Some(start) = self.start_symbol().map(str::to_string) else {
            return;
        };
        if let Some(&index) = self.rule_index.get(&start) {
            for alternative in &mut self.rules[index].1 {
                if alternative.last().map(String::as_str) != Some(END_OF_INPUT) {
                    alternative.push(END_OF_INPUT.to_string());
                }
            }
        }
    }

    pub(crate) fn compute_sets(&mut self) {
        let mut first = FxHashMap::default();
        let mut follow = FxHashMap::default();
        for symbol in &self.non_terminals {
            first.insert(symbol.clone(), first_of(self, symbol).0);
            follow.insert(symbol.clone(), follow_of(self, symbol));
        }
        self.first = first;
        self.follow = follow;
    }

    pub fn first_set(&self, symbol: &str) -> Option<&SymbolSet> {
        self.first.get(symbol)
    }

    pub fn follow_set(&self, symbol: &str) -> Option<&SymbolSet> {
        self.follow.get(symbol)
    }

    /// FIRST of any symbol: a terminal is its own FIRST set.
    pub fn first_of_symbol(&self, symbol: &str) -> SymbolSet {
        if self.is_terminal(symbol) {
            return SymbolSet::from([symbol.to_string()]);
        }
        self.first.get(symbol).cloned().unwrap_or_default()
    }

    pub fn describe_first(&self) -> Vec<String> {
        self.describe("FIRST", &self.first)
    }

    pub fn describe_follow(&self) -> Vec<String> {
        self.describe("FOLLOW", &self.follow)
    }

    fn describe(&self, label: &str, sets: &FxHashMap<String, SymbolSet>) -> Vec<String> {
        self.non_terminals
            .iter()
            .filter_map(|symbol| {
                let set = sets.get(symbol)?;
                if set.is_empty() {
                    return Some(format!("{label}({symbol}) = {{ }}"));
                }
                let members = set.iter().map(String::as_str).collect::<Vec<_>>();
                Some(format!("{label}({symbol}) = {{ {} }}", members.join(", ")))
            })
            .collect()
    }
}
