//! Declaration parsing: attributes, types and their members.

use bumpalo::collections::Vec as BVec;
use shaderweave_core::{ParseError, ParseErrorKind, Span};

use super::parser::Parser;
use super::type_parser::{parse_int, parse_real};
use crate::ast::decl::*;
use crate::ast::{Attribute, AttributeArg, AttributeValue, Ident};
use crate::lexer::TokenKind;

impl<'ast> Parser<'ast> {
    /// Parse a `struct` or `class` declaration with its attributes.
    pub fn parse_type_decl(&mut self) -> Result<TypeDecl<'ast>, ParseError> {
        let start = self.peek().span;
        let attributes = self.parse_attributes()?;

        let kind = match self.peek().kind {
            TokenKind::Struct => TypeDeclKind::Struct,
            TokenKind::Class => TypeDeclKind::Class,
            _ => {
                return Err(self.unexpected(ParseErrorKind::ExpectedDeclaration, "'struct' or 'class'"));
            }
        };
        self.advance();
        let name = self.parse_ident()?;

        self.expect(TokenKind::LeftBrace)?;
        let mut members = BVec::new_in(self.arena);
        while !self.check(TokenKind::RightBrace) && !self.is_eof() {
            match self.parse_member() {
                Ok(member) => members.push(member),
                Err(error) => {
                    self.report(error);
                    self.synchronize_member();
                }
            }
        }
        let close = self.expect(TokenKind::RightBrace)?;

        Ok(TypeDecl {
            attributes,
            kind,
            name,
            members: members.into_bump_slice(),
            span: start.merge(close.span),
        })
    }

    /// Parse zero or more `[Name(args)]` attributes.
    pub fn parse_attributes(&mut self) -> Result<&'ast [Attribute<'ast>], ParseError> {
        let mut attributes = BVec::new_in(self.arena);
        while self.check(TokenKind::LeftBracket) {
            attributes.push(self.parse_attribute()?);
        }
        Ok(attributes.into_bump_slice())
    }

    /// Parse a single attribute.
    fn parse_attribute(&mut self) -> Result<Attribute<'ast>, ParseError> {
        let open = self.expect(TokenKind::LeftBracket)?;
        let name = self.parse_ident()?;

        let mut args = BVec::new_in(self.arena);
        if self.eat(TokenKind::LeftParen).is_some() && !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_attribute_arg()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::RightParen)?;
        } else if self.previous_is(TokenKind::LeftParen) {
            self.expect(TokenKind::RightParen)?;
        }

        let close = self.expect(TokenKind::RightBracket)?;
        Ok(Attribute {
            name,
            args: args.into_bump_slice(),
            span: open.span.merge(close.span),
        })
    }

    /// Parse `value` or `name : value`.
    fn parse_attribute_arg(&mut self) -> Result<AttributeArg<'ast>, ParseError> {
        let start = self.peek().span;
        let name = if self.check(TokenKind::Identifier) && self.peek_nth(1).kind == TokenKind::Colon {
            let ident = self.parse_ident()?;
            self.advance();
            Some(ident)
        } else {
            None
        };

        let negative = self.eat(TokenKind::Minus).is_some();
        let token = self.advance();
        let invalid = || {
            ParseError::new(
                ParseErrorKind::InvalidAttribute,
                token.span,
                format!("invalid attribute argument {}", token.kind.description()),
            )
        };
        let value = match token.kind {
            TokenKind::IntLiteral | TokenKind::HexLiteral => {
                let v = parse_int(token.lexeme).ok_or_else(invalid)?;
                AttributeValue::Int(if negative { -v } else { v })
            }
            TokenKind::RealLiteral => {
                let v = parse_real(token.lexeme).ok_or_else(invalid)?;
                AttributeValue::Real(if negative { -v } else { v })
            }
            TokenKind::True if !negative => AttributeValue::Bool(true),
            TokenKind::False if !negative => AttributeValue::Bool(false),
            TokenKind::StringLiteral if !negative => {
                AttributeValue::String(&token.lexeme[1..token.lexeme.len() - 1])
            }
            TokenKind::Identifier if !negative => AttributeValue::Ident(token.lexeme),
            _ => return Err(invalid()),
        };

        Ok(AttributeArg {
            name,
            value,
            span: start.merge(token.span),
        })
    }

    /// Parse one member of a type body.
    fn parse_member(&mut self) -> Result<Member<'ast>, ParseError> {
        let start = self.peek().span;
        let attributes = self.parse_attributes()?;

        match self.peek().kind {
            TokenKind::Var => self.parse_field_or_property(attributes, start),
            TokenKind::Function => self.parse_function(attributes, start).map(Member::Function),
            TokenKind::Constructor => {
                self.advance();
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                Ok(Member::Constructor(ConstructorDecl {
                    attributes,
                    params,
                    body,
                    span: start.merge(body.span),
                }))
            }
            _ => Err(self.unexpected(ParseErrorKind::ExpectedMember, "'var', 'function' or 'constructor'")),
        }
    }

    /// Parse `var N : T (= e)?;` or `var N : T { get {...} set {...} }`.
    fn parse_field_or_property(
        &mut self,
        attributes: &'ast [Attribute<'ast>],
        start: Span,
    ) -> Result<Member<'ast>, ParseError> {
        self.expect(TokenKind::Var)?;
        let name = self.parse_ident()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        if self.eat(TokenKind::LeftBrace).is_some() {
            let mut getter = None;
            let mut setter = None;
            while !self.check(TokenKind::RightBrace) && !self.is_eof() {
                if self.eat_contextual("get").is_some() {
                    getter = Some(self.parse_block()?);
                } else if self.eat_contextual("set").is_some() {
                    setter = Some(self.parse_block()?);
                } else {
                    return Err(self.unexpected(ParseErrorKind::ExpectedMember, "'get' or 'set'"));
                }
            }
            let close = self.expect(TokenKind::RightBrace)?;
            return Ok(Member::Property(PropertyDecl {
                attributes,
                name,
                ty,
                getter,
                setter,
                span: start.merge(close.span),
            }));
        }

        let default = if self.eat(TokenKind::Equal).is_some() {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let end = self.expect(TokenKind::Semicolon)?;
        Ok(Member::Field(FieldDecl {
            attributes,
            name,
            ty,
            default,
            span: start.merge(end.span),
        }))
    }

    /// Parse `function Name(params) (: Ret)? { body }`.
    fn parse_function(
        &mut self,
        attributes: &'ast [Attribute<'ast>],
        start: Span,
    ) -> Result<FunctionDecl<'ast>, ParseError> {
        self.expect(TokenKind::Function)?;
        let name = self.parse_ident()?;
        let params = self.parse_params()?;
        let return_type = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            attributes,
            name,
            params,
            return_type,
            body,
            span: start.merge(body.span),
        })
    }

    /// Parse `(name : (ref)? Type, ...)`.
    fn parse_params(&mut self) -> Result<&'ast [Param<'ast>], ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut params = BVec::new_in(self.arena);
        if !self.check(TokenKind::RightParen) {
            loop {
                let name: Ident<'ast> = self.parse_ident()?;
                self.expect(TokenKind::Colon)?;
                let is_ref = self.eat(TokenKind::Ref).is_some();
                let ty = self.parse_type()?;
                params.push(Param {
                    name,
                    ty,
                    is_ref,
                    span: name.span.merge(ty.span),
                });
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;
        Ok(params.into_bump_slice())
    }

    /// Whether the most recently consumed token has the given kind.
    fn previous_is(&self, kind: TokenKind) -> bool {
        self.position
            .checked_sub(1)
            .is_some_and(|i| self.buffer[i].kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;
    use bumpalo::Bump;

    #[test]
    fn parse_fragment_struct() {
        let arena = Bump::new();
        let source = r#"
            [Pixel]
            struct Lighting
            {
              [StageInput] var Normal : Real3;
              [Output] var Color : Real4 = Real4(1.0);
              var Scale : Real { get { return 2.0; } }

              function Main()
              {
                this.Color = Real4(this.Normal, 1.0);
              }
            }
        "#;
        let script = Parser::parse(source, &arena).unwrap();
        let decl = &script.types()[0];
        assert_eq!(decl.name.name, "Lighting");
        assert_eq!(decl.kind, TypeDeclKind::Struct);
        assert!(decl.has_attribute("Pixel"));
        assert_eq!(decl.members.len(), 4);
        assert!(matches!(decl.members[1], Member::Field(f) if f.default.is_some()));
        assert!(matches!(decl.members[2], Member::Property(p) if p.getter.is_some() && p.setter.is_none()));
    }

    #[test]
    fn parse_attribute_arguments() {
        let arena = Bump::new();
        let source = "[Geometry(maxVertices : 3, input : TriangleInput)] struct G { }";
        let script = Parser::parse(source, &arena).unwrap();
        let attr = &script.types()[0].attributes[0];
        assert_eq!(attr.name.name, "Geometry");
        assert_eq!(attr.args.len(), 2);
        assert_eq!(attr.arg("maxVertices").map(|a| a.value), Some(AttributeValue::Int(3)));
        assert_eq!(attr.arg("input").map(|a| a.value), Some(AttributeValue::Ident("TriangleInput")));
    }

    #[test]
    fn parse_empty_attribute_parens() {
        let arena = Bump::new();
        let script = Parser::parse("[Vertex()] struct V { }", &arena).unwrap();
        assert!(script.types()[0].attributes[0].args.is_empty());
    }

    #[test]
    fn parse_function_with_ref_param() {
        let arena = Bump::new();
        let source = "struct S { [Static] function Scale(v : ref Real3, s : Real) : Real3 { return v * s; } }";
        let script = Parser::parse(source, &arena).unwrap();
        let Member::Function(func) = script.types()[0].members[0] else {
            panic!("expected function")
        };
        assert!(func.params[0].is_ref);
        assert!(!func.params[1].is_ref);
        assert_eq!(func.return_type.map(|t| t.name.name), Some("Real3"));
        assert!(func.has_attribute("Static"));
    }

    #[test]
    fn class_declaration_parses() {
        let arena = Bump::new();
        let script = Parser::parse("class C { }", &arena).unwrap();
        assert_eq!(script.types()[0].kind, TypeDeclKind::Class);
    }

    #[test]
    fn recovers_between_members() {
        let arena = Bump::new();
        let source = "struct S { var a : ; var b : Real; }";
        let errors = Parser::parse(source, &arena).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn recovers_between_declarations() {
        let arena = Bump::new();
        let source = "struct A { var x : Real = ; } struct B { }";
        let errors = Parser::parse(source, &arena).unwrap_err();
        assert!(!errors.is_empty());
    }
}
