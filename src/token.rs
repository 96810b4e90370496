use std::fmt;

/// Terminal names that stand for a token class instead of literal text.
pub const CLASS_IDENTIFIER: &str = "ID";
pub const CLASS_NUMBER: &str = "NUM";
pub const CLASS_INTEGER: &str = "PRIM_INT";
pub const CLASS_REAL: &str = "PRIM_REAL";
pub const CLASS_STRING: &str = "PRIM_STRING";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier-shaped word. Whether it is a keyword depends on the grammar.
    Word(String),
    Integer(i64),
    Real(f64),
    Str(String),
    Punct(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Text compared against literal terminals. String literals never match
    /// a literal terminal, so they have none.
    pub fn literal_text(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(text) | TokenKind::Punct(text) => Some(text),
            _ => None,
        }
    }

    /// Does this token belong to `terminal`? `is_keyword` reports whether a
    /// word is a declared terminal of the active grammar.
    pub fn matches_terminal(&self, terminal: &str, is_keyword: impl Fn(&str) -> bool) -> bool {
        match terminal {
            CLASS_IDENTIFIER => matches!(&self.kind, TokenKind::Word(word) if !is_keyword(word)),
            CLASS_NUMBER => matches!(self.kind, TokenKind::Integer(_) | TokenKind::Real(_)),
            CLASS_INTEGER => matches!(self.kind, TokenKind::Integer(_)),
            CLASS_REAL => matches!(self.kind, TokenKind::Real(_)),
            CLASS_STRING => matches!(self.kind, TokenKind::Str(_)),
            literal => self.literal_text() == Some(literal),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Word(text) | TokenKind::Punct(text) => write!(f, "{text}"),
            TokenKind::Integer(value) => write!(f, "{value}"),
            TokenKind::Real(value) => write!(f, "{value}"),
            TokenKind::Str(value) => write!(f, "\"{value}\""),
        }
    }
}
