use std::{iter::Peekable, str::CharIndices};

pub mod error;

pub use error::{LexError, LexResult};

use crate::token::{Span, Token, TokenKind};

/// Operators made of two characters. Checked before single characters.
const COMPOUND_PUNCTUATION: [&str; 5] = ["<=", ">=", "<>", "!=", ":="];
const PUNCTUATION: &str = "+-*/=<>(){}[];:,.";

/// Program text lexer. It knows nothing about the grammar: keywords are
/// words until the parser compares them with declared terminals.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::starting_at(input, 1)
    }

    /// Lexer whose spans start at `line`, for text fed one line at a time.
    pub fn starting_at(input: &'a str, line: usize) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Option<Token>> {
        self.skip_trivia();

        let Some(&(start, ch)) = self.chars.peek() else {
            return Ok(None);
        };
        let span = Span {
            line: self.line,
            column: self.column,
        };

        let token = match ch {
            '"' => self.read_string(span)?,
            c if c.is_alphabetic() || c == '_' => self.read_word(start, span),
            c if c.is_ascii_digit() => self.read_number(start, span)?,
            _ => self.read_punctuation(start, ch, span)?,
        };
        Ok(Some(token))
    }

    fn skip_trivia(&mut self) {
        while let Some(&(index, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance_char();
            } else if self.input[index..].starts_with("//") {
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance_char();
                }
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self, start: usize, span: Span) -> Token {
        self.advance_char();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
        let end = self.current_index();
        Token::new(TokenKind::Word(self.input[start..end].to_string()), span)
    }

    fn read_number(&mut self, start: usize, span: Span) -> LexResult<Token> {
        self.consume_digits();

        let mut is_real = false;
        let mut lookahead = self.chars.clone();
        if let Some((_, '.')) = lookahead.next()
            && let Some((_, next)) = lookahead.next()
            && next.is_ascii_digit()
        {
            is_real = true;
            self.advance_char();
            self.consume_digits();
        }

        let end = self.current_index();
        let literal = &self.input[start..end];
        let invalid = || LexError::InvalidNumberLiteral {
            literal: literal.to_string(),
            line: span.line,
            column: span.column,
        };
        let kind = if is_real {
            TokenKind::Real(literal.parse::<f64>().map_err(|_| invalid())?)
        } else {
            TokenKind::Integer(literal.parse::<i64>().map_err(|_| invalid())?)
        };
        Ok(Token::new(kind, span))
    }

    fn read_string(&mut self, span: Span) -> LexResult<Token> {
        self.advance_char(); // opening quote
        let mut value = String::new();
        while let Some((_, c)) = self.advance_char() {
            match c {
                '"' => return Ok(Token::new(TokenKind::Str(value), span)),
                '\n' => break,
                _ => value.push(c),
            }
        }
        Err(LexError::UnterminatedString {
            line: span.line,
            column: span.column,
        })
    }

    fn read_punctuation(&mut self, start: usize, ch: char, span: Span) -> LexResult<Token> {
        let rest = &self.input[start..];
        if let Some(compound) = COMPOUND_PUNCTUATION
            .iter()
            .find(|candidate| rest.starts_with(**candidate))
        {
            self.advance_char();
            self.advance_char();
            return Ok(Token::new(TokenKind::Punct((*compound).to_string()), span));
        }
        if PUNCTUATION.contains(ch) {
            self.advance_char();
            return Ok(Token::new(TokenKind::Punct(ch.to_string()), span));
        }
        Err(LexError::UnexpectedCharacter {
            character: ch,
            line: span.line,
            column: span.column,
        })
    }

    fn consume_digits(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

impl Iterator for Lexer<'_> {
    type Item = LexResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    Lexer::new(input).collect()
}

pub fn tokenize_line(input: &str, line: usize) -> LexResult<Vec<Token>> {
    Lexer::starting_at(input, line).collect()
}

/// Grammar text is whitespace separated: every word is a symbol or a marker.
pub fn grammar_words(input: &str) -> impl Iterator<Item = &str> {
    input.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn word(text: &str) -> TokenKind {
        TokenKind::Word(text.to_string())
    }

    fn punct(text: &str) -> TokenKind {
        TokenKind::Punct(text.to_string())
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            i = 0;
            while (i <> 3) {
                print i;
            }
        "};
        let expected = vec![
            word("i"),
            punct("="),
            TokenKind::Integer(0),
            punct(";"),
            word("while"),
            punct("("),
            word("i"),
            punct("<>"),
            TokenKind::Integer(3),
            punct(")"),
            punct("{"),
            word("print"),
            word("i"),
            punct(";"),
            punct("}"),
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn reads_reals_strings_and_comments() {
        let input = "x = 1.5 + 2; // trailing note\ns = \"a b\";";
        assert_eq!(
            kinds(input),
            vec![
                word("x"),
                punct("="),
                TokenKind::Real(1.5),
                punct("+"),
                TokenKind::Integer(2),
                punct(";"),
                word("s"),
                punct("="),
                TokenKind::Str("a b".to_string()),
                punct(";"),
            ]
        );
    }

    #[test]
    fn dot_without_digits_stays_punctuation() {
        assert_eq!(
            kinds("a[3]."),
            vec![
                word("a"),
                punct("["),
                TokenKind::Integer(3),
                punct("]"),
                punct(".")
            ]
        );
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = tokenize_line("a\n  b", 7).expect("tokenize");
        assert_eq!(tokens[0].span(), Span { line: 7, column: 0 });
        assert_eq!(tokens[1].span(), Span { line: 8, column: 2 });
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '@'"));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999999999;").expect_err("expected overflow");
        assert!(matches!(err, LexError::InvalidNumberLiteral { .. }));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("s = \"open").expect_err("expected failure");
        assert_eq!(err, LexError::UnterminatedString { line: 1, column: 4 });
    }

    #[test]
    fn splits_grammar_words() {
        let words: Vec<_> = grammar_words("expr -> expr + term #\n##").collect();
        assert_eq!(words, vec!["expr", "->", "expr", "+", "term", "#", "##"]);
    }
}
