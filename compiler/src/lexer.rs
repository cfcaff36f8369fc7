// lexer.rs — Lexer for textual network descriptions (.nl)
//
// Uses the `logos` crate for DFA-based lexing. Whitespace (newlines
// included) and `//` line comments are skipped; statements end with `;`.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Network description tokens.
///
/// Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("network")]
    Network,
    #[token("instance")]
    Instance,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ── Symbols ──
    #[token("->")]
    Arrow,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // ── Literals ──
    /// Integer literal, optionally negative.
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    /// String literal with `\"` and `\\` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Network => write!(f, "network"),
            Token::Instance => write!(f, "instance"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Arrow => write!(f, "->"),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Semi => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

// ── Public API ──

/// Lex a network description into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_vs_identifiers() {
        let tokens = lex_ok("network networks instance true falsey");
        assert_eq!(
            tokens,
            vec![Token::Network, Token::Ident, Token::Instance, Token::True, Token::Ident]
        );
    }

    #[test]
    fn connection_statement() {
        let tokens = lex_ok("src.out -> dst.in { bufferSize = 64 };");
        assert_eq!(
            tokens,
            vec![
                Token::Ident,
                Token::Dot,
                Token::Ident,
                Token::Arrow,
                Token::Ident,
                Token::Dot,
                Token::Ident,
                Token::LBrace,
                Token::Ident,
                Token::Equals,
                Token::Int(64),
                Token::RBrace,
                Token::Semi,
            ]
        );
    }

    #[test]
    fn negative_integers_and_strings() {
        let tokens = lex_ok(r#"-12 "a \"q\" \\ b""#);
        assert_eq!(
            tokens,
            vec![Token::Int(-12), Token::StringLit(r#"a "q" \ b"#.into())]
        );
    }

    #[test]
    fn comments_and_newlines_are_skipped() {
        let tokens = lex_ok("a // trailing comment\n\n  b");
        assert_eq!(tokens, vec![Token::Ident, Token::Ident]);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let result = lex("  abc");
        assert_eq!(result.tokens[0].1, Span { start: 2, end: 5 });
    }

    #[test]
    fn bad_character_is_reported_and_skipped() {
        let result = lex("a $ b");
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 2, end: 3 });
    }

    #[test]
    fn unknown_escape_is_an_error() {
        let result = lex(r#""a\nb""#);
        assert!(!result.errors.is_empty());
    }
}
