//! Core types shared by every shaderweave crate.
//!
//! - [`Span`]: source locations
//! - error types for each compilation phase, wrapped by [`ShaderError`]
//! - [`Diagnostic`]: the structured diagnostic channel
//! - [`ContentHash`]: source content hashing for invalidation

mod diagnostic;
mod error;
mod hash;
mod span;

pub use diagnostic::{Diagnostic, DiagnosticSink, Diagnostics, Severity};
pub use error::{
    CompileError, ErrorCategory, LexError, ParseError, ParseErrorKind, ParseErrors, PassError,
    ShaderError,
};
pub use hash::ContentHash;
pub use span::Span;
