//! Abstract syntax tree for fragment source.
//!
//! Every node is allocated in a [`bumpalo::Bump`] arena and borrows from
//! it, so a whole library of fragments can share one arena and be dropped
//! together.
//!
//! # Example
//!
//! ```
//! use shaderweave_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let source = r#"
//!     [Pixel]
//!     struct Tint {
//!         [Output] var Color : Real4;
//!         function Main() { this.Color = Real4(1.0, 0.0, 0.0, 1.0); }
//!     }
//! "#;
//!
//! let script = Parser::parse(source, &arena).unwrap();
//! assert_eq!(script.types().len(), 1);
//! ```

// Core types
pub mod node;
pub mod ops;

mod parser;
mod type_parser;
pub mod types;

pub mod expr;
mod expr_parser;

pub mod stmt;
mod stmt_parser;

pub mod decl;
mod decl_parser;

pub use shaderweave_core::{ParseError, ParseErrorKind, ParseErrors};

pub use decl::*;
pub use expr::*;
pub use node::*;
pub use ops::*;
pub use parser::Parser;
pub use stmt::*;
pub use types::*;

use shaderweave_core::Span;

/// A parsed source unit: the type declarations of one fragment file.
#[derive(Debug, Clone, Copy)]
pub struct Script<'ast> {
    types: &'ast [TypeDecl<'ast>],
    span: Span,
}

impl<'ast> Script<'ast> {
    pub(crate) fn new(types: &'ast [TypeDecl<'ast>], span: Span) -> Self {
        Self { types, span }
    }

    /// Top-level type declarations in source order.
    pub fn types(&self) -> &'ast [TypeDecl<'ast>] {
        self.types
    }

    /// Span covering the whole unit.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Find a declaration by name.
    pub fn find_type(&self, name: &str) -> Option<&'ast TypeDecl<'ast>> {
        self.types.iter().find(|t| t.name.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn parse_multiple_types() {
        let arena = Bump::new();
        let source = r#"
            struct A { var X : Real; }
            [Vertex] struct B { function Main() { } }
        "#;
        let script = Parser::parse(source, &arena).unwrap();
        assert_eq!(script.types().len(), 2);
        assert!(script.find_type("B").is_some_and(|t| t.has_attribute("Vertex")));
        assert!(script.find_type("C").is_none());
    }

    #[test]
    fn parse_with_errors() {
        let arena = Bump::new();
        let result = Parser::parse("struct A { var X : Real = ; }", &arena);
        assert!(result.is_err());
    }

    #[test]
    fn parse_lenient_recovers() {
        let arena = Bump::new();
        let source = r#"
            struct A { var X : Real = ; }
            struct B { var Y : Real; }
        "#;
        let (script, errors) = Parser::parse_lenient(source, &arena);
        assert!(!errors.is_empty());
        assert!(script.find_type("B").is_some());
    }

    #[test]
    fn lexer_errors_are_reported() {
        let arena = Bump::new();
        let errors = Parser::parse("struct A { var X : Real = 1 $ 2; }", &arena).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ParseErrorKind::Lexical));
    }

    #[test]
    fn standalone_expression() {
        let arena = Bump::new();
        assert!(Parser::expression("a.b(1)[0].c", &arena).is_ok());
        assert!(Parser::expression("1 +", &arena).is_err());
        assert!(Parser::expression("1 2", &arena).is_err());
    }

    #[test]
    fn standalone_statement() {
        let arena = Bump::new();
        assert!(Parser::statement("if (x > 0) { return x; }", &arena).is_ok());
        assert!(Parser::statement("for (var i = 0; i < 10; i++) { }", &arena).is_ok());
    }
}
