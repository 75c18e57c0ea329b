//! Lexer for set and map notation.
//!
//! The lexer converts text such as `[N] -> { S[i] : 0 <= i < N }` into a
//! stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::location::{Span, SourceLocation};
use crate::utils::errors::{LexError, LexErrorKind};
use unicode_xid::UnicodeXID;
use std::iter::Peekable;
use std::str::Chars;

/// A lexer for tokenizing notation.
pub struct Lexer<'a> {
    /// The source text
    source: &'a str,
    /// Character iterator
    chars: Peekable<Chars<'a>>,
    /// Current byte offset
    offset: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start of current token
    token_start: SourceLocation,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
        }
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset)
    }

    fn make_span(&self) -> Span {
        Span::from_locations(self.token_start, self.current_location())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        let span = self.make_span();
        let lexeme = self.source[span.start_offset..span.end_offset].to_string();
        Token::new(kind, span, lexeme)
    }

    fn make_error(&self, message: String, kind: LexErrorKind) -> LexError {
        LexError {
            message,
            span: self.make_span(),
            kind,
        }
    }

    fn scan_number(&mut self) -> Result<Token, LexError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let token = self.make_token(TokenKind::Integer);
        if token.lexeme.parse::<i64>().is_err() {
            return Err(self.make_error(
                format!("Integer literal {} out of range", token.lexeme),
                LexErrorKind::InvalidNumber,
            ));
        }
        Ok(token)
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_xid_continue() || c == '_' || c == '\'') {
            self.advance();
        }
        let span = self.make_span();
        let lexeme = &self.source[span.start_offset..span.end_offset];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, span, lexeme.to_string())
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        self.token_start = self.current_location();

        let Some(c) = self.advance() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        let kind = match c {
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '-' => {
                if self.match_char('>') { TokenKind::Arrow } else { TokenKind::Minus }
            }
            '<' => {
                if self.match_char('=') { TokenKind::LessEqual } else { TokenKind::Less }
            }
            '>' => {
                if self.match_char('=') { TokenKind::GreaterEqual } else { TokenKind::Greater }
            }
            '=' => {
                self.match_char('=');
                TokenKind::Equal
            }
            c if c.is_ascii_digit() => return self.scan_number(),
            c if c.is_xid_start() || c == '_' => return Ok(self.scan_identifier()),
            c => {
                return Err(self.make_error(
                    format!("Unexpected character '{}'", c),
                    LexErrorKind::UnexpectedChar,
                ))
            }
        };
        Ok(self.make_token(kind))
    }

    /// Tokenize the whole input, ending with an EOF token.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.is_eof();
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}

/// Tokenize a string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}
