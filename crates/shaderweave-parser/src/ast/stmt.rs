//! Statement AST nodes.

use crate::ast::expr::Expr;
use crate::ast::types::TypeExpr;
use crate::ast::Ident;
use shaderweave_core::Span;

/// A statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    /// Expression statement
    Expr(ExprStmt<'ast>),
    /// Local variable declaration
    VarDecl(VarDeclStmt<'ast>),
    /// `return`
    Return(ReturnStmt<'ast>),
    /// `break`
    Break(Span),
    /// `continue`
    Continue(Span),
    /// `{ ... }`
    Block(Block<'ast>),
    /// `if`
    If(&'ast IfStmt<'ast>),
    /// `while`
    While(&'ast WhileStmt<'ast>),
    /// `do ... while`
    DoWhile(&'ast DoWhileStmt<'ast>),
    /// `for`
    For(&'ast ForStmt<'ast>),
    /// `foreach`
    Foreach(&'ast ForeachStmt<'ast>),
}

impl<'ast> Stmt<'ast> {
    /// Get the span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(s) => s.span,
            Stmt::VarDecl(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Break(span) | Stmt::Continue(span) => *span,
            Stmt::Block(b) => b.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::DoWhile(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Foreach(s) => s.span,
        }
    }
}

/// A braced statement list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'ast> {
    /// Statements in order
    pub stmts: &'ast [Stmt<'ast>],
    /// Source location
    pub span: Span,
}

/// An expression used as a statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExprStmt<'ast> {
    /// The expression
    pub expr: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// `var name : Type = init;`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDeclStmt<'ast> {
    /// Variable name
    pub name: Ident<'ast>,
    /// Declared type; inferred from the initializer when absent
    pub ty: Option<TypeExpr<'ast>>,
    /// Initializer
    pub init: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// `return value;`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnStmt<'ast> {
    /// Returned value
    pub value: Option<&'ast Expr<'ast>>,
    /// Source location
    pub span: Span,
}

/// `if (cond) then else otherwise`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfStmt<'ast> {
    /// Condition
    pub condition: &'ast Expr<'ast>,
    /// Then branch
    pub then_stmt: &'ast Stmt<'ast>,
    /// Else branch
    pub else_stmt: Option<&'ast Stmt<'ast>>,
    /// Source location
    pub span: Span,
}

/// `while (cond) body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhileStmt<'ast> {
    /// Condition
    pub condition: &'ast Expr<'ast>,
    /// Loop body
    pub body: &'ast Stmt<'ast>,
    /// Source location
    pub span: Span,
}

/// `do body while (cond);`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoWhileStmt<'ast> {
    /// Loop body
    pub body: &'ast Stmt<'ast>,
    /// Condition
    pub condition: &'ast Expr<'ast>,
    /// Source location
    pub span: Span,
}

/// `for (init; cond; update) body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForStmt<'ast> {
    /// Initializer statement (declaration or expression)
    pub init: Option<&'ast Stmt<'ast>>,
    /// Condition; an absent condition loops forever
    pub condition: Option<&'ast Expr<'ast>>,
    /// Update expressions
    pub update: &'ast [&'ast Expr<'ast>],
    /// Loop body
    pub body: &'ast Stmt<'ast>,
    /// Source location
    pub span: Span,
}

/// `foreach (var item in collection) body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForeachStmt<'ast> {
    /// Loop variable
    pub variable: Ident<'ast>,
    /// Declared loop variable type
    pub ty: Option<TypeExpr<'ast>>,
    /// Iterated collection
    pub collection: &'ast Expr<'ast>,
    /// Loop body
    pub body: &'ast Stmt<'ast>,
    /// Source location
    pub span: Span,
}
