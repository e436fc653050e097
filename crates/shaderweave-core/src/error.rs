//! Unified error types for the shader compiler.
//!
//! Each phase of compilation has its own error type so callers can handle
//! them at the granularity they need, and every one of them converts into
//! [`ShaderError`] for unified handling.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ShaderError (top-level wrapper)
//! ├── LexError      - tokenization errors
//! ├── ParseError    - syntax errors (with ParseErrorKind)
//! ├── CompileError  - structural, attribute, resolution and translation errors
//! └── PassError     - translation pass pipeline failures
//! ```

use thiserror::Error;

use crate::Span;

// ============================================================================
// Error Categories
// ============================================================================

/// Broad classification of a failure, used by diagnostics consumers to
/// group and filter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Tokenization failure.
    Lexical,
    /// Malformed syntax.
    Syntax,
    /// Malformed fragment declarations and duplicate definitions.
    Structural,
    /// Unknown attributes, bad parameters, conflicting stage markers.
    Attribute,
    /// Inputs, implements targets and entry points that could not be resolved.
    Resolution,
    /// Constructs with no target-language representation.
    Translation,
    /// A translation pass failed to produce a valid result.
    Pipeline,
}

impl ErrorCategory {
    /// Short lowercase name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Lexical => "lexical",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Structural => "structural",
            ErrorCategory::Attribute => "attribute",
            ErrorCategory::Resolution => "resolution",
            ErrorCategory::Translation => "translation",
            ErrorCategory::Pipeline => "pipeline",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lexer Errors
// ============================================================================

/// Errors that occur during lexical analysis (tokenization).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// An unexpected character was encountered.
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedChar { ch: char, span: Span },

    /// A string literal was not properly terminated.
    #[error("unterminated string at {span}")]
    UnterminatedString { span: Span },

    /// A block comment was not properly terminated.
    #[error("unterminated comment at {span}")]
    UnterminatedComment { span: Span },

    /// A numeric literal could not be parsed.
    #[error("invalid number at {span}: {detail}")]
    InvalidNumber { span: Span, detail: String },
}

impl LexError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::UnterminatedComment { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
        }
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// Categories of parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// A specific token was expected but not found.
    ExpectedToken,
    /// An unexpected token was encountered.
    UnexpectedToken,
    /// Unexpected end of file.
    UnexpectedEof,
    /// An expression was expected.
    ExpectedExpression,
    /// A type was expected.
    ExpectedType,
    /// A statement was expected.
    ExpectedStatement,
    /// A declaration was expected.
    ExpectedDeclaration,
    /// A struct member was expected.
    ExpectedMember,
    /// An identifier was expected.
    ExpectedIdentifier,
    /// An attribute argument was malformed.
    InvalidAttribute,
    /// The expression is not assignable or otherwise invalid.
    InvalidExpression,
    /// A literal value could not be parsed.
    InvalidLiteral,
    /// Error reported by the lexer.
    Lexical,
}

impl ParseErrorKind {
    /// Returns a human-readable name for this error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::ExpectedToken => "expected token",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnexpectedEof => "unexpected end of file",
            ParseErrorKind::ExpectedExpression => "expected expression",
            ParseErrorKind::ExpectedType => "expected type",
            ParseErrorKind::ExpectedStatement => "expected statement",
            ParseErrorKind::ExpectedDeclaration => "expected declaration",
            ParseErrorKind::ExpectedMember => "expected struct member",
            ParseErrorKind::ExpectedIdentifier => "expected identifier",
            ParseErrorKind::InvalidAttribute => "invalid attribute",
            ParseErrorKind::InvalidExpression => "invalid expression",
            ParseErrorKind::InvalidLiteral => "invalid literal",
            ParseErrorKind::Lexical => "lexical error",
        }
    }
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parse error with location and context.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {span}: {message}")]
pub struct ParseError {
    /// The category of this error.
    pub kind: ParseErrorKind,
    /// The source location where the error occurred.
    pub span: Span,
    /// A detailed error message.
    pub message: String,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(kind: ParseErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }

    /// Create an "expected token" error.
    pub fn expected_token(span: Span, expected: &str, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedToken,
            span,
            format!("expected {expected}, found {found}"),
        )
    }

    /// Create an "unexpected EOF" error.
    pub fn unexpected_eof(span: Span) -> Self {
        Self::new(ParseErrorKind::UnexpectedEof, span, "unexpected end of file")
    }

    /// Create an "expected identifier" error.
    pub fn expected_identifier(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedIdentifier,
            span,
            format!("expected identifier, found {found}"),
        )
    }

    /// Create an "expected expression" error.
    pub fn expected_expression(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedExpression,
            span,
            format!("expected expression, found {found}"),
        )
    }

    /// Create an "expected type" error.
    pub fn expected_type(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedType,
            span,
            format!("expected type, found {found}"),
        )
    }

    /// Format the error with source context for display.
    pub fn display_with_source(&self, source: &str) -> String {
        render_with_source(source, self.span, &self.kind.to_string(), &self.message)
    }
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        ParseError::new(ParseErrorKind::Lexical, error.span(), error.to_string())
    }
}

/// A collection of parse errors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseErrors {
    errors: Vec<ParseError>,
}

impl ParseErrors {
    /// Create a new empty error collection.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error to the collection.
    pub fn push(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    /// Check if there are any errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterate over the errors.
    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.errors.iter()
    }

    /// Convert to a Vec of errors.
    pub fn into_vec(self) -> Vec<ParseError> {
        self.errors
    }
}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParseErrors {
    type Item = &'a ParseError;
    type IntoIter = std::slice::Iter<'a, ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl From<ParseError> for ParseErrors {
    fn from(error: ParseError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

// ============================================================================
// Compile Errors
// ============================================================================

/// Errors raised while collecting, validating, composing, translating or
/// lowering fragments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    // --- Structural ---
    /// Only value-type structs may declare fragments.
    #[error("at {span}: Cannot declare class types in fragments. Use struct instead.")]
    ClassNotAllowed {
        /// The offending type name.
        name: String,
        /// Where the class was declared.
        span: Span,
    },

    /// A type with this name already exists in the library.
    #[error("at {span}: duplicate definition '{name}'")]
    DuplicateDefinition {
        /// The duplicated name.
        name: String,
        /// Where the duplicate was defined.
        span: Span,
    },

    /// Property setters have no shader representation.
    #[error("at {span}: Field setters are not supported in shaders ('{name}')")]
    SetterNotSupported {
        /// The property name.
        name: String,
        /// Where the setter was declared.
        span: Span,
    },

    // --- Attribute ---
    /// The attribute name is not registered.
    #[error("at {span}: Unknown attribute {name}")]
    UnknownAttribute {
        /// The attribute name.
        name: String,
        /// Where the attribute was used.
        span: Span,
    },

    /// An attribute was given a parameter it does not accept.
    #[error("at {span}: Unknown attribute parameter '{parameter}'")]
    UnknownAttributeParameter {
        /// The attribute name.
        attribute: String,
        /// The unexpected parameter name.
        parameter: String,
        /// Where the parameter was written.
        span: Span,
    },

    /// A required attribute parameter is missing.
    #[error("at {span}: Attribute parameter '{parameter}' is required for [{attribute}]")]
    MissingAttributeParameter {
        /// The attribute name.
        attribute: String,
        /// The missing parameter name.
        parameter: String,
        /// Where the attribute was used.
        span: Span,
    },

    /// An attribute parameter has the wrong literal type.
    #[error("at {span}: Parameter '{parameter}' must be of type {expected}")]
    InvalidAttributeParameter {
        /// The parameter name.
        parameter: String,
        /// The expected literal type.
        expected: String,
        /// Where the parameter was written.
        span: Span,
    },

    /// More than one stage marker on a single type.
    #[error("at {span}: Only one copy of {names} is allowed per type ('{type_name}')")]
    DuplicateStageAttribute {
        /// The type carrying the markers.
        type_name: String,
        /// The stage attribute names, for the message.
        names: String,
        /// Where the type was declared.
        span: Span,
    },

    /// The attribute may not be placed on this kind of declaration.
    #[error("at {span}: Attribute '{attribute}' is not allowed on {target}")]
    AttributeNotAllowed {
        /// The attribute name.
        attribute: String,
        /// Description of the declaration.
        target: String,
        /// Where the attribute was used.
        span: Span,
    },

    /// The attribute appears more often than permitted.
    #[error("at {span}: Only {max} attribute(s) of name '{attribute}' is allowed on {target}")]
    AttributeCountExceeded {
        /// The attribute name.
        attribute: String,
        /// Description of the declaration.
        target: String,
        /// Maximum allowed count.
        max: usize,
        /// Where the declaration is.
        span: Span,
    },

    /// `[Implements]` used without `[Extension]`.
    #[error("at {span}: It's illegal to use the [{implements}] attribute without also using the [{extension}] attribute.")]
    ImplementsWithoutExtension {
        /// Name of the implements attribute.
        implements: String,
        /// Name of the extension attribute.
        extension: String,
        /// Where the function was declared.
        span: Span,
    },

    /// `[Extension]` names a type that does not exist.
    #[error("at {span}: Cannot add [Extension] attribute on type '{type_name}'")]
    InvalidExtensionTarget {
        /// The named type.
        type_name: String,
        /// Where the attribute was used.
        span: Span,
    },

    // --- Resolution ---
    /// An input-marked field matched none of the resolution rules.
    #[error("at {span}: input '{field}' on fragment '{fragment}' could not be resolved")]
    UnresolvedInput {
        /// The fragment declaring the field.
        fragment: String,
        /// The field name.
        field: String,
        /// Where the field was declared.
        span: Span,
    },

    /// A `[BuiltInInput]` field that is not a registered built-in.
    #[error("at {span}: Property '{name} : {type_name}' is not a valid built-in input.")]
    InvalidBuiltIn {
        /// The field name.
        name: String,
        /// The field type.
        type_name: String,
        /// Where the field was declared.
        span: Span,
    },

    /// An `[Implements]` function whose signature matches nothing.
    #[error("at {span}: The signature of '{function}' must match an existing function on '{type_name}'. {candidates}")]
    ImplementsTargetMissing {
        /// The implementing function.
        function: String,
        /// The extended type.
        type_name: String,
        /// Candidate overloads, for the message.
        candidates: String,
        /// Where the function was declared.
        span: Span,
    },

    /// A fragment `Main` with the wrong shape for its stage.
    #[error("at {span}: invalid Main on '{fragment}': {message}")]
    InvalidMainSignature {
        /// The fragment name.
        fragment: String,
        /// What is wrong.
        message: String,
        /// Where Main was declared.
        span: Span,
    },

    /// A composition request named a fragment that is not in the library.
    #[error("at {span}: unknown fragment '{name}'")]
    UnknownFragment {
        /// The requested name.
        name: String,
        /// Location (usually a point span for requests).
        span: Span,
    },

    /// A referenced type could not be found.
    #[error("at {span}: unknown type '{name}'")]
    UnknownType {
        /// The type name.
        name: String,
        /// Where it was referenced.
        span: Span,
    },

    /// A referenced variable, member or function could not be found.
    #[error("at {span}: unknown symbol '{name}'")]
    UnknownSymbol {
        /// The symbol name.
        name: String,
        /// Where it was referenced.
        span: Span,
    },

    /// Operand or argument types do not fit.
    #[error("at {span}: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
        /// Where the mismatch occurred.
        span: Span,
    },

    // --- Translation ---
    /// A construct with no faithful target representation.
    #[error("at {span}: cannot translate {construct}")]
    Untranslatable {
        /// Description of the construct.
        construct: String,
        /// Where it was written.
        span: Span,
    },

    /// A member access operator other than `.`.
    #[error("at {span}: member access operator '{op}' is not supported in shaders")]
    InvalidMemberOperator {
        /// The operator text.
        op: String,
        /// Where it was written.
        span: Span,
    },

    /// Lowered code broke a structural rule of the IR.
    #[error("at {span}: could not lower to IR: {message}")]
    Lowering {
        /// What the IR builder rejected.
        message: String,
        /// Construct being lowered.
        span: Span,
    },

    /// Compound assignment with an indexed left-hand side.
    #[error("at {span}: compound assignment to an indexed expression would evaluate the index twice")]
    CompoundIndexedAssignment {
        /// Where the assignment was written.
        span: Span,
    },
}

impl CompileError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompileError::ClassNotAllowed { span, .. }
            | CompileError::DuplicateDefinition { span, .. }
            | CompileError::SetterNotSupported { span, .. }
            | CompileError::UnknownAttribute { span, .. }
            | CompileError::UnknownAttributeParameter { span, .. }
            | CompileError::MissingAttributeParameter { span, .. }
            | CompileError::InvalidAttributeParameter { span, .. }
            | CompileError::DuplicateStageAttribute { span, .. }
            | CompileError::AttributeNotAllowed { span, .. }
            | CompileError::AttributeCountExceeded { span, .. }
            | CompileError::ImplementsWithoutExtension { span, .. }
            | CompileError::InvalidExtensionTarget { span, .. }
            | CompileError::UnresolvedInput { span, .. }
            | CompileError::InvalidBuiltIn { span, .. }
            | CompileError::ImplementsTargetMissing { span, .. }
            | CompileError::InvalidMainSignature { span, .. }
            | CompileError::UnknownFragment { span, .. }
            | CompileError::UnknownType { span, .. }
            | CompileError::UnknownSymbol { span, .. }
            | CompileError::TypeMismatch { span, .. }
            | CompileError::Untranslatable { span, .. }
            | CompileError::InvalidMemberOperator { span, .. }
            | CompileError::Lowering { span, .. }
            | CompileError::CompoundIndexedAssignment { span } => *span,
        }
    }

    /// Which part of the error taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CompileError::ClassNotAllowed { .. }
            | CompileError::DuplicateDefinition { .. }
            | CompileError::SetterNotSupported { .. } => ErrorCategory::Structural,
            CompileError::UnknownAttribute { .. }
            | CompileError::UnknownAttributeParameter { .. }
            | CompileError::MissingAttributeParameter { .. }
            | CompileError::InvalidAttributeParameter { .. }
            | CompileError::DuplicateStageAttribute { .. }
            | CompileError::AttributeNotAllowed { .. }
            | CompileError::AttributeCountExceeded { .. }
            | CompileError::ImplementsWithoutExtension { .. }
            | CompileError::InvalidExtensionTarget { .. } => ErrorCategory::Attribute,
            CompileError::UnresolvedInput { .. }
            | CompileError::InvalidBuiltIn { .. }
            | CompileError::ImplementsTargetMissing { .. }
            | CompileError::InvalidMainSignature { .. }
            | CompileError::UnknownFragment { .. }
            | CompileError::UnknownType { .. }
            | CompileError::UnknownSymbol { .. }
            | CompileError::TypeMismatch { .. } => ErrorCategory::Resolution,
            CompileError::Untranslatable { .. }
            | CompileError::InvalidMemberOperator { .. }
            | CompileError::Lowering { .. }
            | CompileError::CompoundIndexedAssignment { .. } => ErrorCategory::Translation,
        }
    }

    /// The message without the leading location prefix.
    pub fn short_message(&self) -> String {
        let full = self.to_string();
        let prefix = format!("at {}: ", self.span());
        match full.strip_prefix(&prefix) {
            Some(rest) => rest.to_string(),
            None => full,
        }
    }
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors raised by translation passes.
///
/// A pass failure aborts the remaining pipeline for one stage only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PassError {
    /// The input byte stream could not be decoded.
    #[error("pass '{pass}': malformed input at word {offset}: {detail}")]
    Malformed {
        /// The pass that rejected the input.
        pass: String,
        /// Word offset of the failure.
        offset: usize,
        /// What was wrong.
        detail: String,
    },

    /// The pass decoded its input but could not produce a result.
    #[error("pass '{pass}' failed: {message}")]
    Failed {
        /// The failing pass.
        pass: String,
        /// What went wrong.
        message: String,
    },

    /// The worker running the pipeline went away before answering.
    #[error("pipeline worker disconnected")]
    WorkerDisconnected,
}

impl PassError {
    /// Create a generic failure for a named pass.
    pub fn failed(pass: impl Into<String>, message: impl Into<String>) -> Self {
        PassError::Failed {
            pass: pass.into(),
            message: message.into(),
        }
    }

    /// Name of the pass that failed, if known.
    pub fn pass_name(&self) -> Option<&str> {
        match self {
            PassError::Malformed { pass, .. } | PassError::Failed { pass, .. } => Some(pass),
            PassError::WorkerDisconnected => None,
        }
    }
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error wrapping every phase-specific error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShaderError {
    /// A lexer error.
    #[error(transparent)]
    Lex(#[from] LexError),

    /// A parse error.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A compile error.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A pipeline error.
    #[error(transparent)]
    Pass(#[from] PassError),
}

impl ShaderError {
    /// Check if this is a lexer error.
    pub fn is_lex(&self) -> bool {
        matches!(self, ShaderError::Lex(_))
    }

    /// Check if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self, ShaderError::Parse(_))
    }

    /// Check if this is a compile error.
    pub fn is_compile(&self) -> bool {
        matches!(self, ShaderError::Compile(_))
    }

    /// Check if this is a pipeline error.
    pub fn is_pass(&self) -> bool {
        matches!(self, ShaderError::Pass(_))
    }

    /// Source span, when the error points at source text.
    pub fn span(&self) -> Option<Span> {
        match self {
            ShaderError::Lex(e) => Some(e.span()),
            ShaderError::Parse(e) => Some(e.span),
            ShaderError::Compile(e) => Some(e.span()),
            ShaderError::Pass(_) => None,
        }
    }

    /// Taxonomy category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ShaderError::Lex(_) => ErrorCategory::Lexical,
            ShaderError::Parse(_) => ErrorCategory::Syntax,
            ShaderError::Compile(e) => e.category(),
            ShaderError::Pass(_) => ErrorCategory::Pipeline,
        }
    }

    /// Message without a location prefix.
    pub fn short_message(&self) -> String {
        match self {
            ShaderError::Lex(e) => e.to_string(),
            ShaderError::Parse(e) => e.message.clone(),
            ShaderError::Compile(e) => e.short_message(),
            ShaderError::Pass(e) => e.to_string(),
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Render a header, message, offending line and caret marker.
pub(crate) fn render_with_source(source: &str, span: Span, header: &str, message: &str) -> String {
    let mut output = String::new();
    output.push_str(&format!("Error at {}:{}: {}\n", span.line, span.col, header));
    if !message.is_empty() {
        output.push_str(&format!("  {}\n", message));
    }

    if let Some(line_text) = span
        .line
        .checked_sub(1)
        .and_then(|idx| source.lines().nth(idx as usize))
    {
        output.push_str("  |\n");
        output.push_str(&format!("{:>3} | {}\n", span.line, line_text));
        let indent = " ".repeat(span.col.saturating_sub(1) as usize);
        let pointer = if span.len <= 1 {
            "^".to_string()
        } else {
            "^".to_string() + &"~".repeat((span.len - 1) as usize)
        };
        output.push_str(&format!("  | {}{}\n", indent, pointer));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_error_display() {
        let err = LexError::UnexpectedChar {
            ch: '@',
            span: Span::new(1, 5, 4, 1),
        };
        assert_eq!(err.to_string(), "unexpected character '@' at 1:5");
        assert_eq!(err.span(), Span::new(1, 5, 4, 1));
    }

    #[test]
    fn parse_error_with_source() {
        let source = "struct A\n{\n  var x : ;\n}";
        let err = ParseError::expected_type(Span::new(3, 11, 21, 1), ";");
        let rendered = err.display_with_source(source);
        assert!(rendered.contains("Error at 3:11: expected type"));
        assert!(rendered.contains("  3 |   var x : ;"));
        assert!(rendered.contains("^"));
    }

    #[test]
    fn compile_error_categories() {
        let class = CompileError::ClassNotAllowed {
            name: "A".into(),
            span: Span::default(),
        };
        assert_eq!(class.category(), ErrorCategory::Structural);

        let attr = CompileError::UnknownAttribute {
            name: "Bogus".into(),
            span: Span::default(),
        };
        assert_eq!(attr.category(), ErrorCategory::Attribute);

        let unresolved = CompileError::UnresolvedInput {
            fragment: "A".into(),
            field: "x".into(),
            span: Span::default(),
        };
        assert_eq!(unresolved.category(), ErrorCategory::Resolution);

        let untranslatable = CompileError::CompoundIndexedAssignment { span: Span::default() };
        assert_eq!(untranslatable.category(), ErrorCategory::Translation);
    }

    #[test]
    fn short_message_strips_location() {
        let err = CompileError::UnknownAttribute {
            name: "Bogus".into(),
            span: Span::new(2, 3, 10, 5),
        };
        assert_eq!(err.to_string(), "at 2:3: Unknown attribute Bogus");
        assert_eq!(err.short_message(), "Unknown attribute Bogus");
    }

    #[test]
    fn shader_error_conversion() {
        let err: ShaderError = PassError::failed("validate", "bad block").into();
        assert!(err.is_pass());
        assert_eq!(err.category(), ErrorCategory::Pipeline);
        assert!(err.span().is_none());

        let err: ShaderError = CompileError::CompoundIndexedAssignment { span: Span::point(4, 2, 30) }.into();
        assert!(err.is_compile());
        assert_eq!(err.span(), Some(Span::point(4, 2, 30)));
    }
}
