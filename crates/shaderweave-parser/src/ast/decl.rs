//! Declaration AST nodes: types and their members.

use crate::ast::expr::Expr;
use crate::ast::stmt::Block;
use crate::ast::types::TypeExpr;
use crate::ast::{Attribute, Ident};
use shaderweave_core::Span;

/// Whether a type was declared as a value type or a reference type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDeclKind {
    /// `struct`
    Struct,
    /// `class`
    Class,
}

/// A `struct` or `class` declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeDecl<'ast> {
    /// Attributes preceding the declaration
    pub attributes: &'ast [Attribute<'ast>],
    /// `struct` or `class`
    pub kind: TypeDeclKind,
    /// Type name
    pub name: Ident<'ast>,
    /// Members in declaration order
    pub members: &'ast [Member<'ast>],
    /// Source location
    pub span: Span,
}

impl<'ast> TypeDecl<'ast> {
    /// Whether an attribute with the given name is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name.name == name)
    }
}

/// A member of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member<'ast> {
    /// `var Name : Type = default;`
    Field(FieldDecl<'ast>),
    /// `var Name : Type { get {} set {} }`
    Property(PropertyDecl<'ast>),
    /// `function Name(...) : Ret { }`
    Function(FunctionDecl<'ast>),
    /// `constructor(...) { }`
    Constructor(ConstructorDecl<'ast>),
}

impl<'ast> Member<'ast> {
    /// Get the span of this member.
    pub fn span(&self) -> Span {
        match self {
            Member::Field(f) => f.span,
            Member::Property(p) => p.span,
            Member::Function(f) => f.span,
            Member::Constructor(c) => c.span,
        }
    }
}

/// A data field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDecl<'ast> {
    /// Attributes
    pub attributes: &'ast [Attribute<'ast>],
    /// Field name
    pub name: Ident<'ast>,
    /// Field type
    pub ty: TypeExpr<'ast>,
    /// Default value
    pub default: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// A property with accessor blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyDecl<'ast> {
    /// Attributes
    pub attributes: &'ast [Attribute<'ast>],
    /// Property name
    pub name: Ident<'ast>,
    /// Property type
    pub ty: TypeExpr<'ast>,
    /// `get` body
    pub getter: Option<Block<'ast>>,
    /// `set` body, kept so it can be reported
    pub setter: Option<Block<'ast>>,
    /// Source location
    pub span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param<'ast> {
    /// Parameter name
    pub name: Ident<'ast>,
    /// Parameter type
    pub ty: TypeExpr<'ast>,
    /// Whether passed by `ref`
    pub is_ref: bool,
    /// Source location
    pub span: Span,
}

/// A member function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionDecl<'ast> {
    /// Attributes
    pub attributes: &'ast [Attribute<'ast>],
    /// Function name
    pub name: Ident<'ast>,
    /// Parameters
    pub params: &'ast [Param<'ast>],
    /// Return type; `None` for functions returning nothing
    pub return_type: Option<TypeExpr<'ast>>,
    /// Body
    pub body: Block<'ast>,
    /// Source location
    pub span: Span,
}

impl<'ast> FunctionDecl<'ast> {
    /// Whether an attribute with the given name is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name.name == name)
    }
}

/// A constructor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstructorDecl<'ast> {
    /// Attributes
    pub attributes: &'ast [Attribute<'ast>],
    /// Parameters
    pub params: &'ast [Param<'ast>],
    /// Body
    pub body: Block<'ast>,
    /// Source location
    pub span: Span,
}
