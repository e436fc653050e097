//! Parser state and token navigation.
//!
//! The source is tokenized up front into a buffer of arena-backed tokens,
//! so the parser only carries the `'ast` lifetime and can look ahead
//! arbitrarily far when disambiguating generic constructor calls.

use bumpalo::Bump;
use bumpalo::collections::Vec as BVec;
use shaderweave_core::{ParseError, ParseErrorKind, ParseErrors, Span};

use crate::ast::decl::TypeDecl;
use crate::ast::expr::Expr;
use crate::ast::stmt::Stmt;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::Script;

/// Recursive-descent parser for fragment source.
pub struct Parser<'ast> {
    /// Buffered tokens, always terminated by an EOF token.
    pub(crate) buffer: Vec<Token<'ast>>,
    /// Index of the current token.
    pub(crate) position: usize,
    /// Errors recorded during recovery.
    pub(crate) errors: ParseErrors,
    /// Arena for AST nodes.
    pub(crate) arena: &'ast Bump,
}

impl<'ast> Parser<'ast> {
    /// Parse a complete source unit.
    ///
    /// Lexer errors and every recoverable parse error are reported
    /// together.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn parse(source: &str, arena: &'ast Bump) -> Result<Script<'ast>, ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let script = parser.parse_script();
        if parser.errors.is_empty() {
            Ok(script)
        } else {
            Err(parser.errors)
        }
    }

    /// Parse a source unit, returning whatever was recovered along with
    /// every error.
    pub fn parse_lenient(source: &str, arena: &'ast Bump) -> (Script<'ast>, ParseErrors) {
        let mut parser = Parser::new(source, arena);
        let script = parser.parse_script();
        (script, parser.errors)
    }

    /// Parse a standalone expression.
    pub fn expression(source: &str, arena: &'ast Bump) -> Result<&'ast Expr<'ast>, ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_expr(0);
        parser.finish(result)
    }

    /// Parse a standalone statement.
    pub fn statement(source: &str, arena: &'ast Bump) -> Result<Stmt<'ast>, ParseErrors> {
        let mut parser = Parser::new(source, arena);
        let result = parser.parse_statement();
        parser.finish(result)
    }

    /// Fold a single-item result with the recorded errors and any
    /// trailing input.
    fn finish<T>(mut self, result: Result<T, ParseError>) -> Result<T, ParseErrors> {
        match result {
            Ok(value) => {
                if !self.is_eof() {
                    let error = self.unexpected(ParseErrorKind::UnexpectedToken, "end of input");
                    self.errors.push(error);
                }
                if self.errors.is_empty() {
                    Ok(value)
                } else {
                    Err(self.errors)
                }
            }
            Err(error) => {
                self.errors.push(error);
                Err(self.errors)
            }
        }
    }

    /// Create a parser over the given source.
    pub fn new(source: &str, arena: &'ast Bump) -> Self {
        let mut lexer = Lexer::new(source, arena);
        let mut buffer = Vec::new();
        loop {
            let token = lexer.next_token();
            let eof = token.kind == TokenKind::Eof;
            buffer.push(token);
            if eof {
                break;
            }
        }

        let mut errors = ParseErrors::new();
        for error in lexer.take_errors() {
            errors.push(error.into());
        }

        Self {
            buffer,
            position: 0,
            errors,
            arena,
        }
    }

    /// Parse every type declaration until EOF, recovering at declaration
    /// boundaries.
    fn parse_script(&mut self) -> Script<'ast> {
        let start = self.peek().span;
        let mut types: BVec<'ast, TypeDecl<'ast>> = BVec::new_in(self.arena);

        while !self.is_eof() {
            match self.parse_type_decl() {
                Ok(decl) => types.push(decl),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize_declaration();
                }
            }
        }

        let end = self.peek().span;
        Script::new(types.into_bump_slice(), start.merge(end))
    }

    // =========================================
    // Token navigation
    // =========================================

    /// The current token.
    #[inline]
    pub(crate) fn peek(&self) -> &Token<'ast> {
        self.peek_nth(0)
    }

    /// The token `n` positions ahead, clamped to EOF.
    #[inline]
    pub(crate) fn peek_nth(&self, n: usize) -> &Token<'ast> {
        let last = self.buffer.len() - 1;
        &self.buffer[(self.position + n).min(last)]
    }

    /// Consume and return the current token. EOF is never consumed.
    pub(crate) fn advance(&mut self) -> Token<'ast> {
        let token = *self.peek();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    /// Whether the current token has the given kind.
    #[inline]
    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// Whether the current token is an identifier with the given text.
    #[inline]
    pub(crate) fn check_contextual(&self, text: &str) -> bool {
        self.peek().is_ident(text)
    }

    /// Consume the current token if it has the given kind.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token<'ast>> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Consume the current token if it is the given contextual keyword.
    pub(crate) fn eat_contextual(&mut self, text: &str) -> Option<Token<'ast>> {
        if self.check_contextual(text) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Consume a token of the given kind or fail.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token<'ast>, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let token = *self.peek();
        if token.kind == TokenKind::Eof {
            Err(ParseError::unexpected_eof(token.span))
        } else {
            Err(ParseError::expected_token(
                token.span,
                kind.description(),
                token.kind.description(),
            ))
        }
    }

    /// Whether all tokens have been consumed.
    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    /// Record an error without aborting.
    pub(crate) fn report(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    /// Span of the most recently consumed token.
    pub(crate) fn previous_span(&self) -> Span {
        self.position
            .checked_sub(1)
            .map(|i| self.buffer[i].span)
            .unwrap_or_default()
    }

    // =========================================
    // Error recovery
    // =========================================

    /// Skip tokens until a statement boundary.
    pub(crate) fn synchronize(&mut self) {
        while !self.is_eof() {
            if self.eat(TokenKind::Semicolon).is_some() {
                return;
            }
            match self.peek().kind {
                TokenKind::RightBrace
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Foreach
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip tokens until the next member boundary inside a type body.
    pub(crate) fn synchronize_member(&mut self) {
        let mut depth = 0usize;
        while !self.is_eof() {
            match self.peek().kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth == 0 => return,
                TokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::Var | TokenKind::Function | TokenKind::Constructor | TokenKind::LeftBracket
                    if depth == 0 =>
                {
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip tokens until the next top-level declaration.
    pub(crate) fn synchronize_declaration(&mut self) {
        let mut depth = 0usize;
        let start = self.position;
        while !self.is_eof() {
            match self.peek().kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Struct | TokenKind::Class | TokenKind::LeftBracket
                    if depth == 0 && self.position > start =>
                {
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Build an error for an unexpected current token.
    pub(crate) fn unexpected(&self, kind: ParseErrorKind, what: &str) -> ParseError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::unexpected_eof(token.span)
        } else {
            ParseError::new(
                kind,
                token.span,
                format!("expected {what}, found {}", token.kind.description()),
            )
        }
    }
}
