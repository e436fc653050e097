//! Expression parsing using Pratt parsing (precedence climbing).

use bumpalo::collections::Vec as BVec;
use shaderweave_core::{ParseError, ParseErrorKind};

use super::parser::Parser;
use super::type_parser::{parse_int, parse_real};
use crate::ast::expr::*;
use crate::ast::{AssignOp, BinaryOp, Ident, PostfixOp, UnaryOp};
use crate::lexer::TokenKind;

impl<'ast> Parser<'ast> {
    /// Parse a full expression, including assignment.
    pub fn parse_expression(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        self.parse_expr(0)
    }

    /// Parse an expression with a minimum binding power.
    ///
    /// This is the core of the Pratt parser. It handles operator precedence
    /// by only consuming operators with sufficient binding power.
    pub fn parse_expr(&mut self, min_bp: u8) -> Result<&'ast Expr<'ast>, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let kind = self.peek().kind;

            if let Some(op) = PostfixOp::from_token(kind) {
                if PostfixOp::BINDING_POWER < min_bp {
                    break;
                }
                let op_token = self.advance();
                let span = lhs.span().merge(op_token.span);
                lhs = self.arena.alloc(Expr::Postfix(self.arena.alloc(PostfixExpr {
                    operand: lhs,
                    op,
                    span,
                })));
                continue;
            }

            match kind {
                TokenKind::Dot | TokenKind::Arrow | TokenKind::TildeArrow => {
                    if PostfixOp::BINDING_POWER < min_bp {
                        break;
                    }
                    lhs = self.parse_member_access(lhs)?;
                    continue;
                }
                TokenKind::LeftParen => {
                    if PostfixOp::BINDING_POWER < min_bp {
                        break;
                    }
                    lhs = self.parse_call(lhs)?;
                    continue;
                }
                TokenKind::LeftBracket => {
                    if PostfixOp::BINDING_POWER < min_bp {
                        break;
                    }
                    lhs = self.parse_index(lhs)?;
                    continue;
                }
                _ => {}
            }

            if let Some(op) = AssignOp::from_token(kind) {
                let (l_bp, r_bp) = op.binding_power();
                if l_bp < min_bp {
                    break;
                }
                let op_token = self.advance();
                if !lhs.is_lvalue() {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidExpression,
                        op_token.span,
                        "left side of assignment is not assignable",
                    ));
                }
                let value = self.parse_expr(r_bp)?;
                let span = lhs.span().merge(value.span());
                lhs = self.arena.alloc(Expr::Assign(self.arena.alloc(AssignExpr {
                    target: lhs,
                    op,
                    value,
                    span,
                })));
                continue;
            }

            if let Some(op) = BinaryOp::from_token(kind) {
                let (l_bp, r_bp) = op.binding_power();
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let right = self.parse_expr(r_bp)?;
                let span = lhs.span().merge(right.span());
                lhs = self.arena.alloc(Expr::Binary(self.arena.alloc(BinaryExpr {
                    left: lhs,
                    op,
                    right,
                    span,
                })));
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    /// Parse a prefix expression: unary operators or a primary.
    fn parse_prefix(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        if let Some(op) = UnaryOp::from_token(self.peek().kind) {
            let op_token = self.advance();
            let operand = self.parse_expr(op.binding_power())?;
            let span = op_token.span.merge(operand.span());
            return Ok(self.arena.alloc(Expr::Unary(self.arena.alloc(UnaryExpr {
                op,
                operand,
                span,
            }))));
        }
        self.parse_primary()
    }

    /// Parse a primary expression.
    fn parse_primary(&mut self) -> Result<&'ast Expr<'ast>, ParseError> {
        let token = *self.peek();
        let expr = match token.kind {
            TokenKind::IntLiteral | TokenKind::HexLiteral => {
                self.advance();
                let value = parse_int(token.lexeme).ok_or_else(|| {
                    ParseError::new(ParseErrorKind::InvalidLiteral, token.span, "invalid integer literal")
                })?;
                Expr::Literal(LiteralExpr {
                    kind: LiteralKind::Int(value),
                    span: token.span,
                })
            }
            TokenKind::RealLiteral => {
                self.advance();
                let value = parse_real(token.lexeme).ok_or_else(|| {
                    ParseError::new(ParseErrorKind::InvalidLiteral, token.span, "invalid real literal")
                })?;
                Expr::Literal(LiteralExpr {
                    kind: LiteralKind::Real(value),
                    span: token.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Expr::Literal(LiteralExpr {
                    kind: LiteralKind::Bool(token.kind == TokenKind::True),
                    span: token.span,
                })
            }
            TokenKind::StringLiteral => {
                self.advance();
                let inner = &token.lexeme[1..token.lexeme.len() - 1];
                Expr::Literal(LiteralExpr {
                    kind: LiteralKind::String(inner),
                    span: token.span,
                })
            }
            TokenKind::This => {
                self.advance();
                Expr::This(token.span)
            }
            TokenKind::Identifier => {
                self.advance();
                let ident = Ident::new(token.lexeme, token.span);
                let type_args = if self.looks_like_generic_call(0) {
                    self.parse_type_args()?
                } else {
                    &[]
                };
                let span = token.span.merge(self.previous_span());
                Expr::Ident(IdentExpr { ident, type_args, span })
            }
            TokenKind::LeftParen => {
                let open = self.advance();
                let inner = self.parse_expr(0)?;
                let close = self.expect(TokenKind::RightParen)?;
                Expr::Paren(self.arena.alloc(ParenExpr {
                    expr: inner,
                    span: open.span.merge(close.span),
                }))
            }
            _ => {
                return Err(self.unexpected(ParseErrorKind::ExpectedExpression, "expression"));
            }
        };
        Ok(self.arena.alloc(expr))
    }

    /// Parse `.member`, `->member` or `~>member`.
    fn parse_member_access(&mut self, object: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        let op_token = self.advance();
        let access = match op_token.kind {
            TokenKind::Arrow => MemberAccess::Arrow,
            TokenKind::TildeArrow => MemberAccess::TildeArrow,
            _ => MemberAccess::Dot,
        };
        let name_token = *self.peek();
        if name_token.kind != TokenKind::Identifier {
            return Err(ParseError::expected_identifier(
                name_token.span,
                name_token.kind.description(),
            ));
        }
        self.advance();
        let member = Ident::new(name_token.lexeme, name_token.span);
        let span = object.span().merge(member.span);
        Ok(self.arena.alloc(Expr::Member(self.arena.alloc(MemberExpr {
            object,
            member,
            access,
            span,
        }))))
    }

    /// Parse a call argument list.
    fn parse_call(&mut self, callee: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut args = BVec::new_in(self.arena);
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RightParen)?;
        let span = callee.span().merge(close.span);
        Ok(self.arena.alloc(Expr::Call(self.arena.alloc(CallExpr {
            callee,
            args: args.into_bump_slice(),
            span,
        }))))
    }

    /// Parse `[index]`.
    fn parse_index(&mut self, object: &'ast Expr<'ast>) -> Result<&'ast Expr<'ast>, ParseError> {
        self.expect(TokenKind::LeftBracket)?;
        let index = self.parse_expr(0)?;
        let close = self.expect(TokenKind::RightBracket)?;
        let span = object.span().merge(close.span);
        Ok(self.arena.alloc(Expr::Index(self.arena.alloc(IndexExpr {
            object,
            index,
            span,
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn parse<'a>(arena: &'a Bump, source: &str) -> &'a Expr<'a> {
        let mut parser = Parser::new(source, arena);
        parser.parse_expression().unwrap()
    }

    #[test]
    fn precedence_mul_over_add() {
        let arena = Bump::new();
        let expr = parse(&arena, "a + b * c");
        let Expr::Binary(add) = expr else { panic!("expected binary") };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(add.right, Expr::Binary(m) if m.op == BinaryOp::Mul));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let arena = Bump::new();
        let expr = parse(&arena, "a - b - c");
        let Expr::Binary(outer) = expr else { panic!("expected binary") };
        assert!(matches!(outer.left, Expr::Binary(inner) if inner.op == BinaryOp::Sub));
        assert!(matches!(outer.right, Expr::Ident(_)));
    }

    #[test]
    fn parenthesized_right_operand() {
        let arena = Bump::new();
        let expr = parse(&arena, "a - (b - c)");
        let Expr::Binary(outer) = expr else { panic!("expected binary") };
        assert!(matches!(outer.right, Expr::Paren(_)));
    }

    #[test]
    fn assignment_is_right_associative() {
        let arena = Bump::new();
        let expr = parse(&arena, "a = b = 1");
        let Expr::Assign(outer) = expr else { panic!("expected assignment") };
        assert!(matches!(outer.value, Expr::Assign(_)));
    }

    #[test]
    fn logical_and_binds_tighter_than_or() {
        let arena = Bump::new();
        let expr = parse(&arena, "a || b && c");
        let Expr::Binary(or) = expr else { panic!("expected binary") };
        assert_eq!(or.op, BinaryOp::LogicalOr);
        assert!(matches!(or.right, Expr::Binary(and) if and.op == BinaryOp::LogicalAnd));
    }

    #[test]
    fn member_call_chain() {
        let arena = Bump::new();
        let expr = parse(&arena, "this.Normal.Normalized().X");
        let Expr::Member(x) = expr else { panic!("expected member") };
        assert_eq!(x.member.name, "X");
        assert!(matches!(x.object, Expr::Call(_)));
    }

    #[test]
    fn arrow_member_parses() {
        let arena = Bump::new();
        let expr = parse(&arena, "a->b");
        assert!(matches!(expr, Expr::Member(m) if m.access == MemberAccess::Arrow));
    }

    #[test]
    fn generic_constructor_call() {
        let arena = Bump::new();
        let expr = parse(&arena, "FixedArray[Real, 2]()");
        let Expr::Call(call) = expr else { panic!("expected call") };
        let Expr::Ident(ident) = call.callee else { panic!("expected ident") };
        assert_eq!(ident.type_args.len(), 2);
    }

    #[test]
    fn index_then_compound_assign() {
        let arena = Bump::new();
        let expr = parse(&arena, "values[i] += 2");
        let Expr::Assign(assign) = expr else { panic!("expected assignment") };
        assert_eq!(assign.op, AssignOp::AddAssign);
        assert!(matches!(assign.target, Expr::Index(_)));
    }

    #[test]
    fn unary_and_postfix() {
        let arena = Bump::new();
        let expr = parse(&arena, "-x++");
        let Expr::Unary(neg) = expr else { panic!("expected unary") };
        assert!(matches!(neg.operand, Expr::Postfix(_)));
    }

    #[test]
    fn literal_values() {
        let arena = Bump::new();
        assert!(matches!(parse(&arena, "0x10"), Expr::Literal(LiteralExpr { kind: LiteralKind::Int(16), .. })));
        assert!(matches!(parse(&arena, "true"), Expr::Literal(LiteralExpr { kind: LiteralKind::Bool(true), .. })));
    }

    #[test]
    fn invalid_assignment_target() {
        let arena = Bump::new();
        let mut parser = Parser::new("1 = a", &arena);
        let err = parser.parse_expression().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidExpression);
    }
}
