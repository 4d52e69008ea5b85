//! Tokenizer for the pipeline query language.
//!
//! Produces a flat token stream with byte-offset spans. Newlines and `|` are
//! significant (they separate transforms) and survive as tokens; comments
//! (`# ...`) and other whitespace do not.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Span};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// `@2011-02-01`
    Date(String),
    /// Raw body of an interpolated string: `f"..."` or `s"..."`. The body is
    /// re-parsed for `{expr}` fragments by the parser; `body_offset` is the
    /// byte offset of the body within the source, for span adjustment.
    Interp {
        prefix: char,
        body: String,
        body_offset: usize,
    },
    // operators
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    Coalesce,
    Assign,
    Arrow,
    Dot,
    DotDot,
    // punctuation
    Comma,
    Colon,
    Pipe,
    NewLine,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

/// Tokenize source text. Fails on unterminated strings, malformed dates and
/// characters outside the grammar.
pub fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer {
        src: source.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), CompileError> {
        while let Some(&c) = self.src.get(self.pos) {
            match c {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.push_single(TokenKind::NewLine);
                }
                b'#' => {
                    while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'|' => self.push_single(TokenKind::Pipe),
                b',' => self.push_single(TokenKind::Comma),
                b'(' => self.push_single(TokenKind::LParen),
                b')' => self.push_single(TokenKind::RParen),
                b'{' => self.push_single(TokenKind::LBrace),
                b'}' => self.push_single(TokenKind::RBrace),
                b':' => self.push_single(TokenKind::Colon),
                b'+' => self.push_single(TokenKind::Plus),
                b'*' => self.push_single(TokenKind::Star),
                b'/' => self.push_single(TokenKind::Slash),
                b'%' => self.push_single(TokenKind::Percent),
                b'-' => {
                    if self.peek_at(1) == Some(b'>') {
                        self.push_wide(TokenKind::Arrow, 2);
                    } else {
                        self.push_single(TokenKind::Minus);
                    }
                }
                b'=' => {
                    if self.peek_at(1) == Some(b'=') {
                        self.push_wide(TokenKind::Eq, 2);
                    } else {
                        self.push_single(TokenKind::Assign);
                    }
                }
                b'!' => {
                    if self.peek_at(1) == Some(b'=') {
                        self.push_wide(TokenKind::NotEq, 2);
                    } else {
                        self.push_single(TokenKind::Not);
                    }
                }
                b'<' => {
                    if self.peek_at(1) == Some(b'=') {
                        self.push_wide(TokenKind::LtEq, 2);
                    } else {
                        self.push_single(TokenKind::Lt);
                    }
                }
                b'>' => {
                    if self.peek_at(1) == Some(b'=') {
                        self.push_wide(TokenKind::GtEq, 2);
                    } else {
                        self.push_single(TokenKind::Gt);
                    }
                }
                b'?' => {
                    if self.peek_at(1) == Some(b'?') {
                        self.push_wide(TokenKind::Coalesce, 2);
                    } else {
                        return Err(self.unexpected(c));
                    }
                }
                b'.' => {
                    if self.peek_at(1) == Some(b'.') {
                        self.push_wide(TokenKind::DotDot, 2);
                    } else {
                        self.push_single(TokenKind::Dot);
                    }
                }
                b'\'' | b'"' => self.lex_string(c)?,
                b'`' => self.lex_backtick_ident()?,
                b'@' => self.lex_date()?,
                b'0'..=b'9' => self.lex_number()?,
                c if c == b'_' || c.is_ascii_alphabetic() => self.lex_word()?,
                other => return Err(self.unexpected(other)),
            }
        }
        Ok(())
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn push_single(&mut self, kind: TokenKind) {
        self.push_wide(kind, 1);
    }

    fn push_wide(&mut self, kind: TokenKind, width: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(self.pos, self.pos + width),
        });
        self.pos += width;
    }

    fn unexpected(&self, c: u8) -> CompileError {
        CompileError::parse(
            format!("unexpected character `{}`", c as char),
            Some(Span::new(self.pos, self.pos + 1)),
        )
    }

    fn lex_word(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        while let Some(&c) = self.src.get(self.pos) {
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.src[start..self.pos])
            .expect("identifier bytes are ascii")
            .to_string();

        // `f"..."` / `s"..."` interpolated strings
        if (word == "f" || word == "s")
            && matches!(self.src.get(self.pos), Some(&b'\'') | Some(&b'"'))
        {
            let prefix = word.as_bytes()[0] as char;
            let quote = self.src[self.pos];
            self.pos += 1;
            let body_offset = self.pos;
            let body = self.read_until_quote(quote, start)?;
            self.tokens.push(Token {
                kind: TokenKind::Interp {
                    prefix,
                    body,
                    body_offset,
                },
                span: Span::new(start, self.pos),
            });
            return Ok(());
        }

        self.tokens.push(Token {
            kind: TokenKind::Ident(word),
            span: Span::new(start, self.pos),
        });
        Ok(())
    }

    fn lex_backtick_ident(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        self.pos += 1;
        let mut name = String::new();
        loop {
            match self.src.get(self.pos) {
                Some(b'`') => {
                    self.pos += 1;
                    break;
                }
                Some(&c) => {
                    name.push(c as char);
                    self.pos += 1;
                }
                None => {
                    return Err(CompileError::parse(
                        "unterminated quoted identifier",
                        Some(Span::new(start, self.pos)),
                    ))
                }
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Ident(name),
            span: Span::new(start, self.pos),
        });
        Ok(())
    }

    fn lex_string(&mut self, quote: u8) -> Result<(), CompileError> {
        let start = self.pos;
        self.pos += 1;
        let value = self.read_until_quote(quote, start)?;
        self.tokens.push(Token {
            kind: TokenKind::Str(value),
            span: Span::new(start, self.pos),
        });
        Ok(())
    }

    /// Read to the closing `quote`, handling backslash escapes. Leaves `pos`
    /// just past the closing quote.
    fn read_until_quote(&mut self, quote: u8, start: usize) -> Result<String, CompileError> {
        let mut value = String::new();
        loop {
            match self.src.get(self.pos) {
                Some(&c) if c == quote => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some(b'\\') => {
                    let escaped = self.peek_at(1).ok_or_else(|| {
                        CompileError::parse(
                            "unterminated string literal",
                            Some(Span::new(start, self.pos)),
                        )
                    })?;
                    value.push(match escaped {
                        b'n' => '\n',
                        b't' => '\t',
                        other => other as char,
                    });
                    self.pos += 2;
                }
                Some(&c) => {
                    // multi-byte UTF-8 sequences pass through unchanged
                    let ch_start = self.pos;
                    let mut len = 1;
                    while self
                        .src
                        .get(ch_start + len)
                        .is_some_and(|b| b & 0xC0 == 0x80)
                    {
                        len += 1;
                    }
                    if c < 0x80 {
                        value.push(c as char);
                        self.pos += 1;
                    } else {
                        let s = std::str::from_utf8(&self.src[ch_start..ch_start + len])
                            .map_err(|_| {
                                CompileError::parse(
                                    "invalid UTF-8 in string literal",
                                    Some(Span::new(ch_start, ch_start + len)),
                                )
                            })?;
                        value.push_str(s);
                        self.pos += len;
                    }
                }
                None => {
                    return Err(CompileError::parse(
                        "unterminated string literal",
                        Some(Span::new(start, self.pos)),
                    ))
                }
            }
        }
    }

    fn lex_date(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        self.pos += 1;
        let digits_start = self.pos;
        while let Some(&c) = self.src.get(self.pos) {
            if c.is_ascii_digit() || c == b'-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[digits_start..self.pos])
            .expect("date bytes are ascii")
            .to_string();
        NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|_| {
            CompileError::parse(
                format!("invalid date literal `@{text}`"),
                Some(Span::new(start, self.pos)),
            )
        })?;
        self.tokens.push(Token {
            kind: TokenKind::Date(text),
            span: Span::new(start, self.pos),
        });
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(&c) = self.src.get(self.pos) {
            if c.is_ascii_digit() || c == b'_' {
                self.pos += 1;
            } else if c == b'.' && !is_float {
                // `3..5` keeps the dots for the range operator
                if self.peek_at(1) == Some(b'.') {
                    break;
                }
                if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                    is_float = true;
                    self.pos += 1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        let text: String = std::str::from_utf8(&self.src[start..self.pos])
            .expect("number bytes are ascii")
            .chars()
            .filter(|&c| c != '_')
            .collect();
        let span = Span::new(start, self.pos);
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| {
                CompileError::parse(format!("invalid number `{text}`"), Some(span))
            })?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| {
                CompileError::parse(format!("invalid number `{text}`"), Some(span))
            })?)
        };
        self.tokens.push(Token { kind, span });
        Ok(())
    }
}
