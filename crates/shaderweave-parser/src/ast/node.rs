//! Small nodes shared across declarations, statements and expressions.

use shaderweave_core::Span;

/// An identifier with its location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ident<'ast> {
    /// The identifier text (arena allocated).
    pub name: &'ast str,
    /// Source location.
    pub span: Span,
}

impl<'ast> Ident<'ast> {
    /// Create a new identifier.
    pub fn new(name: &'ast str, span: Span) -> Self {
        Self { name, span }
    }
}

/// An attribute such as `[Output]` or `[Geometry(maxVertices : 3)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribute<'ast> {
    /// Attribute name.
    pub name: Ident<'ast>,
    /// Arguments in source order.
    pub args: &'ast [AttributeArg<'ast>],
    /// Source location covering the brackets.
    pub span: Span,
}

impl<'ast> Attribute<'ast> {
    /// Find a named argument.
    pub fn arg(&self, name: &str) -> Option<&AttributeArg<'ast>> {
        self.args
            .iter()
            .find(|a| a.name.is_some_and(|n| n.name == name))
    }
}

/// One attribute argument, optionally named.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeArg<'ast> {
    /// Parameter name for `name : value` arguments.
    pub name: Option<Ident<'ast>>,
    /// The argument value.
    pub value: AttributeValue<'ast>,
    /// Source location.
    pub span: Span,
}

/// Literal or identifier value of an attribute argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue<'ast> {
    /// Integer literal.
    Int(i64),
    /// Real literal.
    Real(f64),
    /// Boolean literal.
    Bool(bool),
    /// String literal without quotes.
    String(&'ast str),
    /// Bare identifier (type names, enum-like values).
    Ident(&'ast str),
}

impl AttributeValue<'_> {
    /// Name of the literal type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Int(_) => "Integer",
            AttributeValue::Real(_) => "Real",
            AttributeValue::Bool(_) => "Boolean",
            AttributeValue::String(_) => "String",
            AttributeValue::Ident(_) => "Identifier",
        }
    }
}
