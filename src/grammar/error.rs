use std::collections::BTreeSet;

use thiserror::Error;

/// Recorded grammar problems. Ordering follows the reported code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrammarErrorCode {
    /// Malformed grammar text. Critical: ingestion stops.
    Syntax,
    /// A declared non-terminal never appears as a rule key.
    UnreachableNonterminal,
    /// A rule references a symbol that was never declared.
    UndeclaredSymbol,
    /// A terminal was used as a rule key, or the start symbol has no rules.
    NonModifiable,
}

impl GrammarErrorCode {
    pub fn code(self) -> u8 {
        match self {
            Self::Syntax => 0,
            Self::UnreachableNonterminal => 1,
            Self::UndeclaredSymbol => 2,
            Self::NonModifiable => 3,
        }
    }

    pub fn is_critical(self) -> bool {
        self == Self::Syntax
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Grammar syntax error at word {position}: {detail}")]
    Syntax { position: usize, detail: String },
    #[error("Grammar ingestion stopped after a critical error")]
    Halted,
    #[error("Grammar is still being ingested")]
    NotFinished,
}

pub type GrammarResult<T> = Result<T, GrammarError>;

/// Deduplicated, sorted set of recorded error codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrammarErrors {
    codes: BTreeSet<GrammarErrorCode>,
}

impl GrammarErrors {
    pub fn record(&mut self, code: GrammarErrorCode) {
        if self.codes.insert(code) && !code.is_critical() {
            tracing::warn!(code = code.code(), ?code, "grammar error recorded");
        }
    }

    pub fn contains(&self, code: GrammarErrorCode) -> bool {
        self.codes.contains(&code)
    }

    pub fn is_critical(&self) -> bool {
        self.codes.iter().any(|code| code.is_critical())
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = GrammarErrorCode> + '_ {
        self.codes.iter().copied()
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }

    /// One `P_ERROR CODE n` line per code; a critical error hides the rest.
    pub fn report(&self) -> Vec<String> {
        if self.is_critical() {
            return vec![format!("P_ERROR CODE {}", GrammarErrorCode::Syntax.code())];
        }
        self.codes
            .iter()
            .map(|code| format!("P_ERROR CODE {}", code.code()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_and_sorts_codes() {
        let mut errors = GrammarErrors::default();
        errors.record(GrammarErrorCode::NonModifiable);
        errors.record(GrammarErrorCode::UndeclaredSymbol);
        errors.record(GrammarErrorCode::NonModifiable);

        assert_eq!(errors.report(), vec!["P_ERROR CODE 2", "P_ERROR CODE 3"]);
        assert!(!errors.is_critical());
    }

    #[test]
    fn critical_error_hides_other_codes() {
        let mut errors = GrammarErrors::default();
        errors.record(GrammarErrorCode::UndeclaredSymbol);
        errors.record(GrammarErrorCode::Syntax);

        assert!(errors.is_critical());
        assert_eq!(errors.report(), vec!["P_ERROR CODE 0"]);
    }
}
