//! Expression AST nodes.
//!
//! # Expression Precedence
//!
//! Levels, tightest first (see [`BinaryOp::precedence`]):
//! 1. Postfix (call, index, member, ++, --)
//! 2. Prefix unary (-, +, !, ~, ++, --)
//! 3. Multiplicative (*, /, %)
//! 4. Additive (+, -)
//! 5. Shift (<<, >>)
//! 6. Relational (<, <=, >, >=)
//! 7. Equality (==, !=)
//! 8. Bitwise AND (&)
//! 9. Bitwise XOR (^)
//! 10. Bitwise OR (|)
//! 11. Logical AND (&&)
//! 12. Logical OR (||)
//! 14. Assignment (=, +=, ...) - right associative

use crate::ast::types::TypeArg;
use crate::ast::{AssignOp, BinaryOp, Ident, PostfixOp, UnaryOp};
use shaderweave_core::Span;

/// An expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    /// Literal value
    Literal(LiteralExpr<'ast>),
    /// Identifier reference, optionally with generic arguments
    Ident(IdentExpr<'ast>),
    /// `this`
    This(Span),
    /// Binary operation
    Binary(&'ast BinaryExpr<'ast>),
    /// Unary prefix operation
    Unary(&'ast UnaryExpr<'ast>),
    /// Assignment
    Assign(&'ast AssignExpr<'ast>),
    /// Function call or construction
    Call(&'ast CallExpr<'ast>),
    /// Indexing
    Index(&'ast IndexExpr<'ast>),
    /// Member access
    Member(&'ast MemberExpr<'ast>),
    /// Postfix operation (++ or --)
    Postfix(&'ast PostfixExpr<'ast>),
    /// Parenthesized expression
    Paren(&'ast ParenExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Self::Literal(e) => e.span,
            Self::Ident(e) => e.span,
            Self::This(span) => *span,
            Self::Binary(e) => e.span,
            Self::Unary(e) => e.span,
            Self::Assign(e) => e.span,
            Self::Call(e) => e.span,
            Self::Index(e) => e.span,
            Self::Member(e) => e.span,
            Self::Postfix(e) => e.span,
            Self::Paren(e) => e.span,
        }
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr<'ast> {
        let mut expr = self;
        while let Expr::Paren(p) = expr {
            expr = p.expr;
        }
        expr
    }

    /// Whether this expression may appear on the left of an assignment.
    pub fn is_lvalue(&self) -> bool {
        match self.unparen() {
            Expr::Ident(_) | Expr::Index(_) => true,
            Expr::Member(m) => m.object.is_lvalue() || matches!(m.object.unparen(), Expr::This(_)),
            _ => false,
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiteralExpr<'ast> {
    /// The literal kind
    pub kind: LiteralKind<'ast>,
    /// Source location
    pub span: Span,
}

/// The kind of literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralKind<'ast> {
    /// Integer literal
    Int(i64),
    /// Real literal
    Real(f64),
    /// Boolean literal
    Bool(bool),
    /// String literal without quotes
    String(&'ast str),
}

/// An identifier expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentExpr<'ast> {
    /// The identifier
    pub ident: Ident<'ast>,
    /// Generic arguments (e.g. `FixedArray[Real, 4]` in a constructor call)
    pub type_args: &'ast [TypeArg<'ast>],
    /// Source location
    pub span: Span,
}

/// A binary operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    /// Left operand
    pub left: &'ast Expr<'ast>,
    /// Operator
    pub op: BinaryOp,
    /// Right operand
    pub right: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A unary prefix operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryExpr<'ast> {
    /// Operator
    pub op: UnaryOp,
    /// Operand
    pub operand: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// An assignment expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignExpr<'ast> {
    /// Target
    pub target: &'ast Expr<'ast>,
    /// Operator
    pub op: AssignOp,
    /// Assigned value
    pub value: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// A call. The callee is an identifier (free function or constructor),
/// a member access (method) or a generic identifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    /// Called expression
    pub callee: &'ast Expr<'ast>,
    /// Arguments
    pub args: &'ast [&'ast Expr<'ast>],
    /// Source location
    pub span: Span,
}

/// An indexing expression `object[index]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexExpr<'ast> {
    /// Indexed expression
    pub object: &'ast Expr<'ast>,
    /// Index
    pub index: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// Which token introduced a member access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberAccess {
    /// `.`
    Dot,
    /// `->`
    Arrow,
    /// `~>`
    TildeArrow,
}

impl MemberAccess {
    /// Source text of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberAccess::Dot => ".",
            MemberAccess::Arrow => "->",
            MemberAccess::TildeArrow => "~>",
        }
    }
}

/// A member access expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberExpr<'ast> {
    /// Object expression
    pub object: &'ast Expr<'ast>,
    /// Member name
    pub member: Ident<'ast>,
    /// Access operator
    pub access: MemberAccess,
    /// Source location
    pub span: Span,
}

/// A postfix increment/decrement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostfixExpr<'ast> {
    /// Operand
    pub operand: &'ast Expr<'ast>,
    /// Operator
    pub op: PostfixOp,
    /// Source location
    pub span: Span,
}

/// A parenthesized expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParenExpr<'ast> {
    /// Inner expression
    pub expr: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}
