//! Expression translation.
//!
//! Expressions are translated bottom-up into [`ExprText`] values that
//! carry their own relative range mappings and the precedence level of
//! their outermost operator. Parent operators compare levels to decide
//! where grouping parentheses go, so the emitted text always evaluates in
//! source order whatever the source parenthesization was.

use std::sync::Arc;

use shaderweave_core::{CompileError, Span};
use shaderweave_parser::ast::{
    AssignExpr, Associativity, BinaryExpr, CallExpr, Expr, LiteralKind, MemberExpr,
    PostfixOp, UnaryExpr, UnaryOp,
};

use crate::code_builder::RangeMapping;
use crate::core_types::{MATH_TYPE, ScalarType, ShaderType, methods};
use crate::typing::{CallResolution, GlobalKind, MemberResolution, SelfArg};

use super::{FunctionKey, FunctionTranslator, Result, SymbolKey, mangle};

/// Level of literals, names and calls.
pub(crate) const ATOM: u8 = 0;
/// Postfix operators, member access and indexing.
pub(crate) const POSTFIX: u8 = 1;
/// Prefix operators.
pub(crate) const UNARY: u8 = 2;
/// Assignment and compound assignment.
pub(crate) const ASSIGN: u8 = 14;

/// Translated expression text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExprText {
    pub text: String,
    /// Precedence level of the outermost operator; lower binds tighter.
    pub level: u8,
    /// Mappings relative to the start of `text`.
    pub mappings: Vec<RangeMapping>,
}

impl ExprText {
    pub fn atom(text: String) -> Self {
        Self {
            text,
            level: ATOM,
            mappings: Vec::new(),
        }
    }
}

/// Which operand of an operator a child sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Whether a child at `child` level needs grouping under an operator at
/// `parent` level.
fn needs_group(child: u8, parent: u8, side: Side, associativity: Associativity) -> bool {
    if child == ATOM {
        return false;
    }
    child > parent
        || (child == parent
            && match associativity {
                Associativity::Left => side == Side::Right,
                Associativity::Right => side == Side::Left,
            })
}

/// Concatenates text pieces while shifting child mappings.
struct Join {
    text: String,
    mappings: Vec<RangeMapping>,
}

impl Join {
    fn new() -> Self {
        Self {
            text: String::new(),
            mappings: Vec::new(),
        }
    }

    fn str(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    fn expr(&mut self, child: ExprText) -> &mut Self {
        let offset = self.text.len();
        self.text.push_str(&child.text);
        for mut mapping in child.mappings {
            mapping.shift(offset);
            self.mappings.push(mapping);
        }
        self
    }

    fn list(&mut self, children: Vec<ExprText>) -> &mut Self {
        for (i, child) in children.into_iter().enumerate() {
            if i > 0 {
                self.str(", ");
            }
            self.expr(child);
        }
        self
    }

    fn finish(self, origin: &Arc<str>, span: Span, level: u8) -> ExprText {
        let mapping = RangeMapping {
            origin: origin.clone(),
            source: span,
            dest: 0..self.text.len(),
            children: self.mappings,
        };
        ExprText {
            text: self.text,
            level,
            mappings: vec![mapping],
        }
    }
}

/// Wrap `child` in parentheses when its level requires it.
fn group(child: ExprText, parent: u8, side: Side, associativity: Associativity) -> ExprText {
    if !needs_group(child.level, parent, side, associativity) {
        return child;
    }
    let mut join = Join::new();
    join.str("(").expr(child).str(")");
    ExprText {
        text: join.text,
        level: ATOM,
        mappings: join.mappings,
    }
}

/// A real literal; the debug form always carries a decimal point or an
/// exponent.
fn real_literal(value: f64) -> String {
    format!("{value:?}")
}

impl<'t, 'a> FunctionTranslator<'t, 'a> {
    /// Translate an expression.
    pub(crate) fn expr(&mut self, expr: &Expr<'_>) -> Result<ExprText> {
        let origin = self.origin.clone();
        match expr {
            Expr::Literal(literal) => {
                let text = match literal.kind {
                    LiteralKind::Int(value) => value.to_string(),
                    LiteralKind::Real(value) => real_literal(value),
                    LiteralKind::Bool(value) => value.to_string(),
                    LiteralKind::String(_) => {
                        return Err(CompileError::Untranslatable {
                            construct: "string literal".into(),
                            span: literal.span,
                        });
                    }
                };
                let mut join = Join::new();
                join.str(&text);
                Ok(join.finish(&origin, literal.span, ATOM))
            }
            Expr::Ident(ident) => {
                let name = ident.ident.name;
                let local = self.scope.lookup(name).map(|(_, local)| local.clone());
                match local {
                    Some(local) => {
                        let mut join = Join::new();
                        join.str(&local);
                        Ok(join.finish(&origin, ident.span, ATOM))
                    }
                    None => Err(CompileError::UnknownSymbol {
                        name: name.to_string(),
                        span: ident.span,
                    }),
                }
            }
            Expr::This(span) => {
                self.typer.type_of(expr, &self.scope)?;
                let mut join = Join::new();
                join.str("self");
                Ok(join.finish(&origin, *span, ATOM))
            }
            Expr::Paren(paren) => self.expr(paren.expr),
            Expr::Binary(binary) => self.binary(binary),
            Expr::Unary(unary) => self.unary(unary),
            Expr::Postfix(postfix) => {
                self.typer.type_of(expr, &self.scope)?;
                let operand = self.expr(postfix.operand)?;
                let op = match postfix.op {
                    PostfixOp::PostInc => "++",
                    PostfixOp::PostDec => "--",
                };
                let mut join = Join::new();
                join.expr(group(operand, POSTFIX, Side::Left, Associativity::Left)).str(op);
                Ok(join.finish(&origin, postfix.span, POSTFIX))
            }
            Expr::Assign(assign) => self.assign(expr, assign),
            Expr::Index(index) => {
                let ty = self.typer.type_of(expr, &self.scope)?;
                self.deps.use_type(&ty);
                let object = self.expr(index.object)?;
                let subscript = self.expr(index.index)?;
                let mut join = Join::new();
                join.expr(group(object, POSTFIX, Side::Left, Associativity::Left))
                    .str("[")
                    .expr(subscript)
                    .str("]");
                Ok(join.finish(&origin, index.span, POSTFIX))
            }
            Expr::Member(member) => self.member(member),
            Expr::Call(call) => self.call(call),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn binary(&mut self, binary: &BinaryExpr<'_>) -> Result<ExprText> {
        let origin = self.origin.clone();
        let lhs_ty = self.typer.type_of(binary.left, &self.scope)?;
        let rhs_ty = self.typer.type_of(binary.right, &self.scope)?;
        crate::typing::binary_result(binary.op, &lhs_ty, &rhs_ty).ok_or_else(|| {
            CompileError::TypeMismatch {
                message: format!(
                    "operator '{}' is not defined for {lhs_ty} and {rhs_ty}",
                    binary.op.as_str()
                ),
                span: binary.span,
            }
        })?;

        let level = binary.op.precedence();
        let associativity = binary.op.associativity();
        let lhs = group(self.expr(binary.left)?, level, Side::Left, associativity);
        let rhs = group(self.expr(binary.right)?, level, Side::Right, associativity);

        let key = SymbolKey::Operator(lhs_ty.name(), binary.op, rhs_ty.name());
        if let Some(resolver) = self.ctx.resolvers().get(&key) {
            let text = resolver.apply(&[lhs.text, rhs.text]);
            let mut join = Join::new();
            join.str(&text);
            return Ok(join.finish(&origin, binary.span, level));
        }

        let mut join = Join::new();
        join.expr(lhs)
            .str(&format!(" {} ", binary.op.as_str()))
            .expr(rhs);
        Ok(join.finish(&origin, binary.span, level))
    }

    fn unary(&mut self, unary: &UnaryExpr<'_>) -> Result<ExprText> {
        let origin = self.origin.clone();
        let ty = self.typer.type_of(unary.operand, &self.scope)?;
        if unary.op == UnaryOp::LogicalNot && ty.scalar() != Some(ScalarType::Boolean) {
            return Err(CompileError::TypeMismatch {
                message: format!("operator '!' is not defined for {ty}"),
                span: unary.span,
            });
        }
        let operand = group(self.expr(unary.operand)?, UNARY, Side::Right, Associativity::Right);

        let key = SymbolKey::Unary(unary.op, ty.name());
        if let Some(resolver) = self.ctx.resolvers().get(&key) {
            let text = resolver.apply(&[operand.text]);
            let mut join = Join::new();
            join.str(&text);
            return Ok(join.finish(&origin, unary.span, UNARY));
        }

        let op = unary.op.as_str();
        // `- -x` must not read as a decrement
        let spaced = operand
            .text
            .starts_with(|c| (c == '-' || c == '+') && op.ends_with(c));
        let mut join = Join::new();
        join.str(op);
        if spaced {
            join.str(" ");
        }
        join.expr(operand);
        Ok(join.finish(&origin, unary.span, UNARY))
    }

    fn assign(&mut self, expr: &Expr<'_>, assign: &AssignExpr<'_>) -> Result<ExprText> {
        let origin = self.origin.clone();
        let target_ty = self.typer.type_of(assign.target, &self.scope)?;
        let value_ty = self.typer.type_of(assign.value, &self.scope)?;
        if !assign.target.is_lvalue() {
            return Err(CompileError::TypeMismatch {
                message: "left side of an assignment must be assignable".into(),
                span: assign.target.span(),
            });
        }
        if assign.op.is_compound() && crate::typing::is_indexed_target(assign.target) {
            return Err(CompileError::CompoundIndexedAssignment { span: assign.span });
        }
        self.typer.type_of(expr, &self.scope)?;

        let target = group(self.expr(assign.target)?, ASSIGN, Side::Left, Associativity::Right);
        let value = group(self.expr(assign.value)?, ASSIGN, Side::Right, Associativity::Right);

        let mut join = Join::new();
        match assign.op.binary_op() {
            Some(op) => {
                let key = SymbolKey::Operator(target_ty.name(), op, value_ty.name());
                match self.ctx.resolvers().get(&key) {
                    // Expanded so the operator goes through its resolver;
                    // the target is a plain name or member path, evaluated
                    // twice without side effects
                    Some(resolver) => {
                        let text = resolver.apply(&[target.text.clone(), value.text]);
                        join.expr(target).str(" = ").str(&text);
                    }
                    None => {
                        join.expr(target)
                            .str(&format!(" {} ", assign.op.as_str()))
                            .expr(value);
                    }
                }
            }
            None => {
                join.expr(target).str(" = ").expr(value);
            }
        }
        Ok(join.finish(&origin, assign.span, ASSIGN))
    }

    // ========================================================================
    // Members
    // ========================================================================

    fn member(&mut self, member: &MemberExpr<'_>) -> Result<ExprText> {
        let origin = self.origin.clone();
        let resolution = self.typer.resolve_member(member, &self.scope)?;
        let mut join = Join::new();
        match resolution {
            MemberResolution::Field { ty, .. } => {
                self.deps.use_type(&ty);
                let object = self.expr(member.object)?;
                join.expr(group(object, POSTFIX, Side::Left, Associativity::Left))
                    .str(".")
                    .str(member.member.name);
            }
            MemberResolution::Global { global, kind, ty } => {
                self.deps.use_type(&ty);
                match kind {
                    GlobalKind::StaticUniform => {
                        join.str(&format!("{}.{global}", self.ctx.names().uniform_block));
                    }
                    GlobalKind::Static => {
                        if let Some(owner) = self.static_owner(member.object) {
                            self.deps.use_static(&owner, member.member.name);
                        }
                        join.str(&global);
                    }
                    GlobalKind::Resource | GlobalKind::SpecConstant => {
                        join.str(&global);
                    }
                }
            }
            MemberResolution::Swizzle { components, .. } => {
                let object_ty = self.typer.type_of(member.object, &self.scope)?;
                let key = SymbolKey::Member(object_ty.name(), member.member.name.to_string());
                let object = self.expr(member.object)?;
                let object = group(object, POSTFIX, Side::Left, Associativity::Left);
                match self.ctx.resolvers().get(&key) {
                    Some(resolver) => {
                        join.str(&resolver.apply(&[object.text]));
                    }
                    None => {
                        let swizzle: String = components.iter().map(|&c| b"xyzw"[c as usize] as char).collect();
                        join.expr(object).str(".").str(&swizzle);
                    }
                }
            }
            MemberResolution::Getter { owner, function, ty } => {
                self.deps.use_type(&ty);
                self.deps.use_function(FunctionKey::new(&owner, &function, 0));
                let object = self.receiver(member.object)?;
                join.str(&mangle(self.ctx, &owner, &function))
                    .str("(")
                    .expr(object)
                    .str(")");
                return Ok(join.finish(&origin, member.span, ATOM));
            }
        }
        Ok(join.finish(&origin, member.span, POSTFIX))
    }

    /// Owner type of a static field access, from a type name object or the
    /// object's struct type.
    fn static_owner(&self, object: &Expr<'_>) -> Option<String> {
        if let Some(name) = self.typer.static_object(object, &self.scope) {
            return Some(name);
        }
        match self.typer.type_of(object, &self.scope).ok()? {
            ShaderType::Struct(name) => Some(name),
            _ => None,
        }
    }

    /// An instance passed by reference: must name storage.
    fn receiver(&mut self, object: &Expr<'_>) -> Result<ExprText> {
        if !(object.is_lvalue() || matches!(object.unparen(), Expr::This(_))) {
            return Err(CompileError::Untranslatable {
                construct: "instance call on a temporary value".into(),
                span: object.span(),
            });
        }
        self.expr(object)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn call(&mut self, call: &CallExpr<'_>) -> Result<ExprText> {
        let origin = self.origin.clone();
        let resolution = self.typer.resolve_call(call, &self.scope)?;
        let returns = self.typer.call_type(&resolution, call, &self.scope)?;
        self.deps.use_type(&returns);
        let arity = call.args.len();

        let mut args = Vec::with_capacity(arity + 1);
        let mut join = Join::new();
        match resolution {
            CallResolution::Construct(ty) => {
                if arity == 0 {
                    let value = self.default_value(&ty).ok_or_else(|| CompileError::Untranslatable {
                        construct: format!("construction of {ty}"),
                        span: call.span,
                    })?;
                    join.str(&value);
                    return Ok(join.finish(&origin, call.span, ATOM));
                }
                for arg in call.args {
                    args.push(self.expr(arg)?);
                }
                let key = SymbolKey::Constructor(ty.name(), arity);
                if let Some(resolver) = self.ctx.resolvers().get(&key) {
                    let texts: Vec<String> = args.into_iter().map(|a| a.text).collect();
                    join.str(&resolver.apply(&texts));
                    return Ok(join.finish(&origin, call.span, ATOM));
                }
                let callee = match &ty {
                    ShaderType::Array(element, length) => {
                        format!("{}[{length}]", self.ctx.resolvers().type_name(element))
                    }
                    _ => self.ctx.resolvers().type_name(&ty),
                };
                join.str(&callee).str("(").list(args).str(")");
            }
            CallResolution::Intrinsic(intrinsic) => {
                for arg in call.args {
                    args.push(self.expr(arg)?);
                }
                let key = SymbolKey::Function(MATH_TYPE.to_string(), intrinsic.name.to_string(), arity);
                match self.ctx.resolvers().get(&key) {
                    Some(resolver) => {
                        let texts: Vec<String> = args.into_iter().map(|a| a.text).collect();
                        join.str(&resolver.apply(&texts));
                    }
                    None => {
                        join.str(intrinsic.target).str("(").list(args).str(")");
                    }
                }
            }
            CallResolution::Function {
                owner,
                name,
                self_arg,
                ..
            } => {
                self.deps.use_function(FunctionKey::new(&owner, &name, arity));
                match self_arg {
                    SelfArg::None => {}
                    SelfArg::This => args.push(ExprText::atom("self".to_string())),
                    SelfArg::Object(object) => args.push(self.receiver(object)?),
                    SelfArg::Receiver(object) => args.push(self.expr(object)?),
                }
                for arg in call.args {
                    if self.is_output_stream(arg) {
                        continue;
                    }
                    args.push(self.expr(arg)?);
                }
                join.str(&mangle(self.ctx, &owner, &name))
                    .str("(")
                    .list(args)
                    .str(")");
            }
            CallResolution::Sample(object) => {
                let object_ty = self.typer.type_of(object, &self.scope)?;
                args.push(self.expr(object)?);
                for arg in call.args {
                    args.push(self.expr(arg)?);
                }
                let key = SymbolKey::Function(object_ty.name(), methods::SAMPLE.to_string(), arity);
                let texts: Vec<String> = args.into_iter().map(|a| a.text).collect();
                let text = match self.ctx.resolvers().get(&key) {
                    Some(resolver) => resolver.apply(&texts),
                    None => format!("texture({})", texts.join(", ")),
                };
                join.str(&text);
            }
            CallResolution::Append(_) => {
                let Some(helper) = self.stage.append_helper.clone() else {
                    return Err(CompileError::Untranslatable {
                        construct: "Append outside a geometry stage".into(),
                        span: call.span,
                    });
                };
                for arg in call.args {
                    args.push(self.expr(arg)?);
                }
                join.str(&helper).str("(").list(args).str(")");
            }
        }
        Ok(join.finish(&origin, call.span, ATOM))
    }

    /// Output streams have no value form; they are dropped from argument
    /// lists.
    pub(crate) fn is_output_stream(&self, expr: &Expr<'_>) -> bool {
        matches!(
            self.typer.type_of(expr, &self.scope),
            Ok(ShaderType::Stream(stream)) if stream.is_output
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_rules() {
        // a - (b - c): right child at equal level of a left operator
        assert!(needs_group(4, 4, Side::Right, Associativity::Left));
        // (a - b) - c
        assert!(!needs_group(4, 4, Side::Left, Associativity::Left));
        // a * (b + c)
        assert!(needs_group(4, 3, Side::Left, Associativity::Left));
        // a + b * c
        assert!(!needs_group(3, 4, Side::Right, Associativity::Left));
        // a = (b = c) needs nothing, (a = b) = c does
        assert!(!needs_group(ASSIGN, ASSIGN, Side::Right, Associativity::Right));
        assert!(needs_group(ASSIGN, ASSIGN, Side::Left, Associativity::Right));
        assert!(!needs_group(ATOM, POSTFIX, Side::Left, Associativity::Left));
    }

    #[test]
    fn real_literals_keep_a_decimal_point() {
        assert_eq!(real_literal(1.0), "1.0");
        assert_eq!(real_literal(0.25), "0.25");
        assert_eq!(real_literal(-3.0), "-3.0");
        assert_eq!(real_literal(1e20), "1e20");
    }
}
