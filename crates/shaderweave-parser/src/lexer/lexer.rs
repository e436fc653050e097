//! Main lexer implementation for the fragment language.
//!
//! The [`Lexer`] converts source text into a stream of [`Token`]s using
//! direct dispatch on the first character. Lexemes are copied into the
//! arena so the source string can be freed after lexing completes.

use std::collections::VecDeque;

use bumpalo::Bump;
use shaderweave_core::{LexError, Span};

use super::cursor::{Cursor, is_ident_continue, is_ident_start};
use super::token::{Token, TokenKind, lookup_keyword};

/// Lexer for fragment source code.
///
/// Provides lookahead via [`peek`](Self::peek) and [`peek_nth`](Self::peek_nth).
///
/// The `'src` lifetime is the source string being lexed (temporary).
/// The `'ast` lifetime is the arena where token lexemes are allocated (persists).
pub struct Lexer<'src, 'ast> {
    /// Low-level character cursor.
    cursor: Cursor<'src>,
    /// Arena for allocating token lexemes.
    arena: &'ast Bump,
    /// Lookahead buffer for peeking.
    lookahead: VecDeque<Token<'ast>>,
    /// Accumulated errors.
    errors: Vec<LexError>,
}

impl<'src, 'ast> Lexer<'src, 'ast> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'src str, arena: &'ast Bump) -> Self {
        Self {
            cursor: Cursor::new(source),
            arena,
            lookahead: VecDeque::with_capacity(4),
            errors: Vec::new(),
        }
    }

    /// Take accumulated errors, leaving an empty vec.
    pub fn take_errors(&mut self) -> Vec<LexError> {
        std::mem::take(&mut self.errors)
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Consume and return the next token.
    pub fn next_token(&mut self) -> Token<'ast> {
        if let Some(token) = self.lookahead.pop_front() {
            return token;
        }
        self.scan_token()
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Token<'ast> {
        self.peek_nth(0)
    }

    /// Peek `n` tokens ahead (0 = next token).
    pub fn peek_nth(&mut self, n: usize) -> Token<'ast> {
        while self.lookahead.len() <= n {
            let token = self.scan_token();
            self.lookahead.push_back(token);
        }
        self.lookahead[n]
    }

    // =========================================
    // Internal: Token scanning
    // =========================================

    /// Scan the next token from source.
    fn scan_token(&mut self) -> Token<'ast> {
        self.skip_whitespace();

        let Some(first) = self.cursor.peek() else {
            return self.make_eof();
        };

        let start_line = self.cursor.line();
        let start_col = self.cursor.column();
        let start_offset = self.cursor.offset();

        match first {
            '/' => self.scan_slash(start_line, start_col, start_offset),
            '"' => self.scan_string(start_line, start_col, start_offset),
            c if c.is_ascii_digit() => self.scan_number(start_line, start_col, start_offset),
            '.' if self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.scan_number(start_line, start_col, start_offset)
            }
            c if is_ident_start(c) => self.scan_identifier(start_line, start_col, start_offset),
            _ => self.scan_operator(start_line, start_col, start_offset),
        }
    }

    /// Skip whitespace and BOM.
    fn skip_whitespace(&mut self) {
        if self.cursor.check_str("\u{FEFF}") {
            self.cursor.advance_bytes(3);
        }
        self.cursor.eat_while(|c| c.is_ascii_whitespace());
    }

    /// Create an EOF token.
    fn make_eof(&self) -> Token<'ast> {
        let span = Span::point(self.cursor.line(), self.cursor.column(), self.cursor.offset());
        Token::new(TokenKind::Eof, self.arena.alloc_str(""), span)
    }

    /// Create a token from start position to current position.
    /// Copies the lexeme into the arena.
    fn make_token(&self, kind: TokenKind, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        let len = self.cursor.offset() - start_offset;
        let span = Span::new(start_line, start_col, start_offset, len);
        let lexeme = self.arena.alloc_str(self.cursor.slice_from(start_offset));
        Token::new(kind, lexeme, span)
    }

    /// Span from a start position to the current position.
    fn span_from(&self, start_line: u32, start_col: u32, start_offset: u32) -> Span {
        Span::new(start_line, start_col, start_offset, self.cursor.offset() - start_offset)
    }

    /// Create an error token and record the error.
    fn make_error(&mut self, error: LexError) -> Token<'ast> {
        let span = error.span();
        self.errors.push(error);
        Token::new(TokenKind::Error, self.arena.alloc_str(""), span)
    }

    // =========================================
    // Scanning: Comments and slash
    // =========================================

    /// Scan a slash, which could be `/`, `//`, `/*`, `/=`.
    fn scan_slash(&mut self, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        self.cursor.advance();

        match self.cursor.peek() {
            Some('/') => {
                self.cursor.eat_while(|c| c != '\n');
                self.scan_token()
            }
            Some('*') => {
                self.cursor.advance();
                self.scan_block_comment(start_line, start_col, start_offset)
            }
            Some('=') => {
                self.cursor.advance();
                self.make_token(TokenKind::SlashEqual, start_line, start_col, start_offset)
            }
            _ => self.make_token(TokenKind::Slash, start_line, start_col, start_offset),
        }
    }

    /// Scan a block comment `/* ... */`.
    fn scan_block_comment(&mut self, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        loop {
            match self.cursor.advance() {
                None => {
                    let span = self.span_from(start_line, start_col, start_offset);
                    return self.make_error(LexError::UnterminatedComment { span });
                }
                Some('*') if self.cursor.eat('/') => return self.scan_token(),
                Some(_) => {}
            }
        }
    }

    // =========================================
    // Scanning: Strings
    // =========================================

    /// Scan a double-quoted string literal. Strings do not span lines.
    fn scan_string(&mut self, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        self.cursor.advance();

        loop {
            match self.cursor.peek() {
                None | Some('\n') | Some('\r') => {
                    let span = self.span_from(start_line, start_col, start_offset);
                    return self.make_error(LexError::UnterminatedString { span });
                }
                Some('\\') => {
                    self.cursor.advance();
                    if self.cursor.peek().is_some() {
                        self.cursor.advance();
                    }
                }
                Some('"') => {
                    self.cursor.advance();
                    return self.make_token(TokenKind::StringLiteral, start_line, start_col, start_offset);
                }
                Some(_) => {
                    self.cursor.advance();
                }
            }
        }
    }

    // =========================================
    // Scanning: Numbers
    // =========================================

    /// Scan a number literal.
    fn scan_number(&mut self, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        if self.cursor.check_str("0x") || self.cursor.check_str("0X") {
            self.cursor.advance_bytes(2);
            let digits = self.cursor.eat_while(|c| c.is_ascii_hexdigit() || c == '_');
            if digits.is_empty() {
                let span = self.span_from(start_line, start_col, start_offset);
                return self.make_error(LexError::InvalidNumber {
                    span,
                    detail: "expected digits after hex prefix".to_string(),
                });
            }
            return self.make_token(TokenKind::HexLiteral, start_line, start_col, start_offset);
        }

        self.consume_decimal_digits();
        let mut is_real = false;

        // Fractional part; `1.Foo` stays a member access on an integer.
        if self.cursor.peek() == Some('.') && self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.cursor.advance();
            self.consume_decimal_digits();
            is_real = true;
        }

        if let Some('e' | 'E') = self.cursor.peek() {
            self.cursor.advance();
            if matches!(self.cursor.peek(), Some('+' | '-')) {
                self.cursor.advance();
            }
            if self.consume_decimal_digits().is_empty() {
                let span = self.span_from(start_line, start_col, start_offset);
                return self.make_error(LexError::InvalidNumber {
                    span,
                    detail: "expected exponent digits".to_string(),
                });
            }
            is_real = true;
        }

        if let Some('f' | 'F') = self.cursor.peek() {
            self.cursor.advance();
            is_real = true;
        }

        let kind = if is_real {
            TokenKind::RealLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.make_token(kind, start_line, start_col, start_offset)
    }

    /// Consume decimal digits (including underscores as separators).
    fn consume_decimal_digits(&mut self) -> &'src str {
        self.cursor.eat_while(|c| c.is_ascii_digit() || c == '_')
    }

    // =========================================
    // Scanning: Identifiers and keywords
    // =========================================

    /// Scan an identifier or keyword.
    fn scan_identifier(&mut self, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        let lexeme = self.cursor.eat_while(is_ident_continue);
        let kind = lookup_keyword(lexeme).unwrap_or(TokenKind::Identifier);
        self.make_token(kind, start_line, start_col, start_offset)
    }

    // =========================================
    // Scanning: Operators
    // =========================================

    /// Scan an operator or punctuation token.
    fn scan_operator(&mut self, start_line: u32, start_col: u32, start_offset: u32) -> Token<'ast> {
        let Some(c) = self.cursor.advance() else {
            return self.make_eof();
        };
        let next = self.cursor.peek();

        let kind = match (c, next) {
            ('(', _) => TokenKind::LeftParen,
            (')', _) => TokenKind::RightParen,
            ('[', _) => TokenKind::LeftBracket,
            (']', _) => TokenKind::RightBracket,
            ('{', _) => TokenKind::LeftBrace,
            ('}', _) => TokenKind::RightBrace,
            (';', _) => TokenKind::Semicolon,
            (',', _) => TokenKind::Comma,
            (':', _) => TokenKind::Colon,
            ('.', _) => TokenKind::Dot,

            ('~', Some('>')) => { self.cursor.advance(); TokenKind::TildeArrow }
            ('~', _) => TokenKind::Tilde,

            ('+', Some('+')) => { self.cursor.advance(); TokenKind::PlusPlus }
            ('+', Some('=')) => { self.cursor.advance(); TokenKind::PlusEqual }
            ('+', _) => TokenKind::Plus,

            ('-', Some('-')) => { self.cursor.advance(); TokenKind::MinusMinus }
            ('-', Some('=')) => { self.cursor.advance(); TokenKind::MinusEqual }
            ('-', Some('>')) => { self.cursor.advance(); TokenKind::Arrow }
            ('-', _) => TokenKind::Minus,

            ('*', Some('=')) => { self.cursor.advance(); TokenKind::StarEqual }
            ('*', _) => TokenKind::Star,

            ('%', Some('=')) => { self.cursor.advance(); TokenKind::PercentEqual }
            ('%', _) => TokenKind::Percent,

            ('=', Some('=')) => { self.cursor.advance(); TokenKind::EqualEqual }
            ('=', _) => TokenKind::Equal,

            ('!', Some('=')) => { self.cursor.advance(); TokenKind::BangEqual }
            ('!', _) => TokenKind::Bang,

            ('<', Some('=')) => { self.cursor.advance(); TokenKind::LessEqual }
            ('<', Some('<')) => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    TokenKind::LessLessEqual
                } else {
                    TokenKind::LessLess
                }
            }
            ('<', _) => TokenKind::Less,

            ('>', Some('=')) => { self.cursor.advance(); TokenKind::GreaterEqual }
            ('>', Some('>')) => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    TokenKind::GreaterGreaterEqual
                } else {
                    TokenKind::GreaterGreater
                }
            }
            ('>', _) => TokenKind::Greater,

            ('&', Some('=')) => { self.cursor.advance(); TokenKind::AmpEqual }
            ('&', Some('&')) => { self.cursor.advance(); TokenKind::AmpAmp }
            ('&', _) => TokenKind::Amp,

            ('|', Some('=')) => { self.cursor.advance(); TokenKind::PipeEqual }
            ('|', Some('|')) => { self.cursor.advance(); TokenKind::PipePipe }
            ('|', _) => TokenKind::Pipe,

            ('^', Some('=')) => { self.cursor.advance(); TokenKind::CaretEqual }
            ('^', _) => TokenKind::Caret,

            _ => {
                let span = self.span_from(start_line, start_col, start_offset);
                return self.make_error(LexError::UnexpectedChar { ch: c, span });
            }
        };

        self.make_token(kind, start_line, start_col, start_offset)
    }
}

impl<'src, 'ast> Iterator for Lexer<'src, 'ast> {
    type Item = Token<'ast>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let arena = Bump::new();
        Lexer::new(source, &arena).map(|t| t.kind).collect()
    }

    #[test]
    fn lex_field_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("[Output] var Normal : Real3;"),
            vec![LeftBracket, Identifier, RightBracket, Var, Identifier, Colon, Identifier, Semicolon]
        );
    }

    #[test]
    fn lex_numbers() {
        use TokenKind::*;
        assert_eq!(kinds("1 1.5 2e3 0xFF .5 3f"), vec![IntLiteral, RealLiteral, RealLiteral, HexLiteral, RealLiteral, RealLiteral]);
    }

    #[test]
    fn lex_member_operators() {
        use TokenKind::*;
        assert_eq!(kinds("a.b a->b a~>b"), vec![Identifier, Dot, Identifier, Identifier, Arrow, Identifier, Identifier, TildeArrow, Identifier]);
    }

    #[test]
    fn lex_compound_operators() {
        use TokenKind::*;
        assert_eq!(kinds("<<= >>= && || != <="), vec![LessLessEqual, GreaterGreaterEqual, AmpAmp, PipePipe, BangEqual, LessEqual]);
    }

    #[test]
    fn skips_comments() {
        use TokenKind::*;
        assert_eq!(kinds("a // line\n /* block\n */ b"), vec![Identifier, Identifier]);
    }

    #[test]
    fn spans_carry_offsets() {
        let arena = Bump::new();
        let mut lexer = Lexer::new("var\n  Foo", &arena);
        lexer.next_token();
        let foo = lexer.next_token();
        assert_eq!(foo.lexeme, "Foo");
        assert_eq!(foo.span.line, 2);
        assert_eq!(foo.span.col, 3);
        assert_eq!(foo.span.offset, 6);
        assert_eq!(foo.span.len, 3);
    }

    #[test]
    fn unterminated_comment_is_error() {
        let arena = Bump::new();
        let mut lexer = Lexer::new("/* open", &arena);
        assert_eq!(lexer.next_token().kind, TokenKind::Error);
        let errors = lexer.take_errors();
        assert!(matches!(errors[0], LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn unexpected_character() {
        let arena = Bump::new();
        let mut lexer = Lexer::new("$", &arena);
        assert_eq!(lexer.next_token().kind, TokenKind::Error);
        assert!(lexer.has_errors());
    }

    #[test]
    fn peek_does_not_consume() {
        let arena = Bump::new();
        let mut lexer = Lexer::new("a b", &arena);
        assert_eq!(lexer.peek_nth(1).lexeme, "b");
        assert_eq!(lexer.next_token().lexeme, "a");
        assert_eq!(lexer.next_token().lexeme, "b");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }
}
