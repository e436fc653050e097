//! Type expression parsing.

use bumpalo::collections::Vec as BVec;
use shaderweave_core::{ParseError, ParseErrorKind};

use super::parser::Parser;
use crate::ast::types::{TypeArg, TypeExpr};
use crate::ast::Ident;
use crate::lexer::TokenKind;

impl<'ast> Parser<'ast> {
    /// Parse a type.
    ///
    /// Grammar: `IDENTIFIER ('[' TYPEARG (',' TYPEARG)* ']')?`
    pub fn parse_type(&mut self) -> Result<TypeExpr<'ast>, ParseError> {
        let token = *self.peek();
        if token.kind != TokenKind::Identifier {
            return Err(ParseError::expected_type(token.span, token.kind.description()));
        }
        self.advance();
        let name = Ident::new(token.lexeme, token.span);

        let args = if self.check(TokenKind::LeftBracket) {
            self.parse_type_args()?
        } else {
            &[]
        };

        let span = name.span.merge(self.previous_span());
        Ok(TypeExpr { name, args, span })
    }

    /// Parse bracketed generic arguments, including the brackets.
    pub(crate) fn parse_type_args(&mut self) -> Result<&'ast [TypeArg<'ast>], ParseError> {
        self.expect(TokenKind::LeftBracket)?;
        let mut args = BVec::new_in(self.arena);

        loop {
            let token = *self.peek();
            match token.kind {
                TokenKind::IntLiteral => {
                    self.advance();
                    let value = parse_int(token.lexeme).ok_or_else(|| {
                        ParseError::new(ParseErrorKind::InvalidLiteral, token.span, "invalid integer argument")
                    })?;
                    args.push(TypeArg::Int(value, token.span));
                }
                TokenKind::Identifier => args.push(TypeArg::Type(self.parse_type()?)),
                _ => return Err(ParseError::expected_type(token.span, token.kind.description())),
            }

            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }

        self.expect(TokenKind::RightBracket)?;
        Ok(args.into_bump_slice())
    }

    /// Whether the tokens starting at `offset` (which must be `[`) form a
    /// generic argument list followed by `(`.
    ///
    /// Used to tell `FixedArray[Real, 4]()` apart from `values[i]`.
    pub(crate) fn looks_like_generic_call(&self, offset: usize) -> bool {
        if self.peek_nth(offset).kind != TokenKind::LeftBracket {
            return false;
        }
        let mut depth = 0usize;
        let mut i = offset;
        loop {
            match self.peek_nth(i).kind {
                TokenKind::LeftBracket => depth += 1,
                TokenKind::RightBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_nth(i + 1).kind == TokenKind::LeftParen;
                    }
                }
                TokenKind::Identifier | TokenKind::IntLiteral | TokenKind::Comma => {}
                _ => return false,
            }
            i += 1;
        }
    }
}

/// Parse a decimal or hex integer lexeme, ignoring `_` separators.
pub(crate) fn parse_int(lexeme: &str) -> Option<i64> {
    let cleaned: String = lexeme.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok().map(|v| v as i64)
    } else {
        cleaned.parse().ok()
    }
}

/// Parse a real lexeme, ignoring `_` separators and a trailing `f`.
pub(crate) fn parse_real(lexeme: &str) -> Option<f64> {
    let cleaned: String = lexeme
        .chars()
        .filter(|c| *c != '_')
        .collect();
    cleaned
        .trim_end_matches(['f', 'F'])
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn parse_plain_type() {
        let arena = Bump::new();
        let mut parser = Parser::new("Real3", &arena);
        let ty = parser.parse_type().unwrap();
        assert_eq!(ty.name.name, "Real3");
        assert!(!ty.is_generic());
    }

    #[test]
    fn parse_generic_type() {
        let arena = Bump::new();
        let mut parser = Parser::new("FixedArray[Real4, 3]", &arena);
        let ty = parser.parse_type().unwrap();
        assert_eq!(ty.display_name(), "FixedArray[Real4, 3]");
        assert!(matches!(ty.args[1], TypeArg::Int(3, _)));
    }

    #[test]
    fn literal_helpers() {
        assert_eq!(parse_int("0xFF"), Some(255));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_real("2.5f"), Some(2.5));
        assert_eq!(parse_real("1e2"), Some(100.0));
    }

    #[test]
    fn generic_call_lookahead() {
        let arena = Bump::new();
        let parser = Parser::new("FixedArray[Real, 4]()", &arena);
        assert!(parser.looks_like_generic_call(1));
        let parser = Parser::new("values[i] = 1", &arena);
        assert!(!parser.looks_like_generic_call(1));
    }
}
