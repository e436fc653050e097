//! Fragment language parser.
//!
//! This crate provides the lexer and parser for shader fragment source:
//! - Lexical analysis (tokenization)
//! - Abstract Syntax Tree (AST) definitions
//! - A recursive-descent parser with a Pratt expression core
//!
//! # Example
//!
//! ```
//! use shaderweave_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let source = r#"
//!     [Vertex]
//!     struct Transform {
//!         [StageInput] var Position : Real3;
//!         [Output] var PerspectivePosition : Real4;
//!
//!         function Main() {
//!             this.PerspectivePosition = Real4(this.Position, 1.0);
//!         }
//!     }
//! "#;
//!
//! match Parser::parse(source, &arena) {
//!     Ok(script) => println!("parsed {} types", script.types().len()),
//!     Err(errors) => eprintln!("parse errors: {}", errors),
//! }
//! ```

// Lexer module
pub mod lexer;

// AST module
pub mod ast;

// Re-export commonly used types at crate root
pub use ast::{Parser, Script};
pub use lexer::{Lexer, Token, TokenKind};
pub use shaderweave_core::Span;
