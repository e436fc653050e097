//! Statement parsing.

use bumpalo::collections::Vec as BVec;
use shaderweave_core::{ParseError, ParseErrorKind};

use super::parser::Parser;
use crate::ast::stmt::*;
use crate::ast::Ident;
use crate::lexer::TokenKind;

impl<'ast> Parser<'ast> {
    /// Parse a statement.
    pub fn parse_statement(&mut self) -> Result<Stmt<'ast>, ParseError> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let start = self.advance().span;
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Stmt::Break(start.merge(end)))
            }
            TokenKind::Continue => {
                let start = self.advance().span;
                let end = self.expect(TokenKind::Semicolon)?.span;
                Ok(Stmt::Continue(start.merge(end)))
            }
            TokenKind::LeftBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Var => {
                let decl = self.parse_var_decl()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(decl)
            }
            _ => self.parse_expr_stmt(),
        }
    }

    /// Parse a braced block, recovering from statement errors inside it.
    pub fn parse_block(&mut self) -> Result<Block<'ast>, ParseError> {
        let open = self.expect(TokenKind::LeftBrace)?;
        let mut stmts = BVec::new_in(self.arena);

        while !self.check(TokenKind::RightBrace) && !self.is_eof() {
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(error) => {
                    self.report(error);
                    self.synchronize();
                }
            }
        }

        let close = self.expect(TokenKind::RightBrace)?;
        Ok(Block {
            stmts: stmts.into_bump_slice(),
            span: open.span.merge(close.span),
        })
    }

    /// Parse a statement and move it into the arena.
    fn parse_nested_statement(&mut self) -> Result<&'ast Stmt<'ast>, ParseError> {
        let stmt = self.parse_statement()?;
        Ok(self.arena.alloc(stmt))
    }

    /// Parse an expression statement.
    fn parse_expr_stmt(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let expr = self.parse_expr(0)?;
        let end = self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Expr(ExprStmt {
            expr,
            span: expr.span().merge(end.span),
        }))
    }

    /// Parse `var name (: Type)? (= init)?` without the trailing semicolon.
    fn parse_var_decl(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::Var)?.span;
        let name = self.parse_ident()?;

        let ty = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Equal).is_some() {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        if ty.is_none() && init.is_none() {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedType,
                name.span,
                format!("variable '{}' needs a type or an initializer", name.name),
            ));
        }

        Ok(Stmt::VarDecl(VarDeclStmt {
            name,
            ty,
            init,
            span: start.merge(self.previous_span()),
        }))
    }

    /// Parse `return value?;`.
    fn parse_return(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::Return)?.span;
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        let end = self.expect(TokenKind::Semicolon)?.span;
        Ok(Stmt::Return(ReturnStmt {
            value,
            span: start.merge(end),
        }))
    }

    /// Parse `if (cond) stmt (else stmt)?`.
    fn parse_if(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::If)?.span;
        self.expect(TokenKind::LeftParen)?;
        let condition = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen)?;
        let then_stmt = self.parse_nested_statement()?;
        let else_stmt = if self.eat(TokenKind::Else).is_some() {
            Some(self.parse_nested_statement()?)
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Ok(Stmt::If(self.arena.alloc(IfStmt {
            condition,
            then_stmt,
            else_stmt,
            span,
        })))
    }

    /// Parse `while (cond) stmt`.
    fn parse_while(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::While)?.span;
        self.expect(TokenKind::LeftParen)?;
        let condition = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_nested_statement()?;
        let span = start.merge(self.previous_span());
        Ok(Stmt::While(self.arena.alloc(WhileStmt { condition, body, span })))
    }

    /// Parse `do stmt while (cond);`.
    fn parse_do_while(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::Do)?.span;
        let body = self.parse_nested_statement()?;
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LeftParen)?;
        let condition = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen)?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Ok(Stmt::DoWhile(self.arena.alloc(DoWhileStmt {
            body,
            condition,
            span: start.merge(end),
        })))
    }

    /// Parse `for (init?; cond?; update,*) stmt`.
    fn parse_for(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::For)?.span;
        self.expect(TokenKind::LeftParen)?;

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            let decl = self.parse_var_decl()?;
            Some(&*self.arena.alloc(decl))
        } else {
            let expr = self.parse_expr(0)?;
            Some(&*self.arena.alloc(Stmt::Expr(ExprStmt {
                expr,
                span: expr.span(),
            })))
        };
        self.expect(TokenKind::Semicolon)?;

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        self.expect(TokenKind::Semicolon)?;

        let mut update = BVec::new_in(self.arena);
        if !self.check(TokenKind::RightParen) {
            loop {
                update.push(self.parse_expr(0)?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;

        let body = self.parse_nested_statement()?;
        let span = start.merge(self.previous_span());
        Ok(Stmt::For(self.arena.alloc(ForStmt {
            init,
            condition,
            update: update.into_bump_slice(),
            body,
            span,
        })))
    }

    /// Parse `foreach (var x (: T)? in collection) stmt`.
    fn parse_foreach(&mut self) -> Result<Stmt<'ast>, ParseError> {
        let start = self.expect(TokenKind::Foreach)?.span;
        self.expect(TokenKind::LeftParen)?;
        self.expect(TokenKind::Var)?;
        let variable = self.parse_ident()?;
        let ty = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::In)?;
        let collection = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_nested_statement()?;
        let span = start.merge(self.previous_span());
        Ok(Stmt::Foreach(self.arena.alloc(ForeachStmt {
            variable,
            ty,
            collection,
            body,
            span,
        })))
    }

    /// Parse an identifier.
    pub(crate) fn parse_ident(&mut self) -> Result<Ident<'ast>, ParseError> {
        let token = *self.peek();
        if token.kind != TokenKind::Identifier {
            return Err(ParseError::expected_identifier(token.span, token.kind.description()));
        }
        self.advance();
        Ok(Ident::new(token.lexeme, token.span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn parse<'a>(arena: &'a Bump, source: &str) -> Stmt<'a> {
        let mut parser = Parser::new(source, arena);
        parser.parse_statement().unwrap()
    }

    #[test]
    fn var_with_type_and_init() {
        let arena = Bump::new();
        let Stmt::VarDecl(decl) = parse(&arena, "var x : Real = 1.0;") else {
            panic!("expected var decl")
        };
        assert_eq!(decl.name.name, "x");
        assert_eq!(decl.ty.map(|t| t.name.name), Some("Real"));
        assert!(decl.init.is_some());
    }

    #[test]
    fn var_without_type_or_init_fails() {
        let arena = Bump::new();
        let mut parser = Parser::new("var x;", &arena);
        assert!(parser.parse_statement().is_err());
    }

    #[test]
    fn if_else_chain() {
        let arena = Bump::new();
        let Stmt::If(stmt) = parse(&arena, "if (a) { b = 1; } else if (c) { b = 2; } else { b = 3; }") else {
            panic!("expected if")
        };
        assert!(matches!(stmt.else_stmt, Some(Stmt::If(_))));
    }

    #[test]
    fn for_loop_parts() {
        let arena = Bump::new();
        let Stmt::For(stmt) = parse(&arena, "for (var i = 0; i < 4; ++i) { total += i; }") else {
            panic!("expected for")
        };
        assert!(matches!(stmt.init, Some(Stmt::VarDecl(_))));
        assert!(stmt.condition.is_some());
        assert_eq!(stmt.update.len(), 1);
    }

    #[test]
    fn foreach_parses() {
        let arena = Bump::new();
        let Stmt::Foreach(stmt) = parse(&arena, "foreach (var v in values) { sum += v; }") else {
            panic!("expected foreach")
        };
        assert_eq!(stmt.variable.name, "v");
    }

    #[test]
    fn do_while_parses() {
        let arena = Bump::new();
        assert!(matches!(parse(&arena, "do { i += 1; } while (i < 3);"), Stmt::DoWhile(_)));
    }

    #[test]
    fn block_recovers_after_error() {
        let arena = Bump::new();
        let mut parser = Parser::new("{ var = ; x = 1; }", &arena);
        let block = parser.parse_block().unwrap();
        assert_eq!(block.stmts.len(), 1);
        assert_eq!(parser.errors.len(), 1);
    }
}
