//! Expression typing.
//!
//! Both backends walk the same function bodies. [`Typer`] answers the
//! questions they share: the type of an expression, what a member access
//! refers to and what a call binds to. Keeping the answers in one place
//! means the text and the IR always agree on name binding.

use shaderweave_core::{CompileError, Span};
use shaderweave_parser::ast::{
    AssignOp, BinaryOp, CallExpr, Expr, LiteralKind, MemberAccess, MemberExpr, UnaryOp,
};

use crate::context::CompilerContext;
use crate::core_types::{
    Intrinsic, MATH_TYPE, ScalarType, ShaderType, find_intrinsic, methods, resolve_generic,
};
use crate::library::{Field, FragmentLibrary, FragmentType, Function, FunctionFlags};
use crate::passes::{CONSTRUCTOR_NAME, GETTER_PREFIX};

// ============================================================================
// Scopes
// ============================================================================

/// Lexical scopes of local variables. `T` is whatever a backend tracks per
/// local, alongside its type.
#[derive(Debug, Clone)]
pub struct Scope<T> {
    frames: Vec<Vec<(String, ShaderType, T)>>,
}

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scope<T> {
    pub fn new() -> Self {
        Self {
            frames: vec![Vec::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Declare in the innermost frame, shadowing outer declarations.
    pub fn declare(&mut self, name: impl Into<String>, ty: ShaderType, data: T) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name.into(), ty, data));
        }
    }

    pub fn lookup(&self, name: &str) -> Option<(&ShaderType, &T)> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(n, _, _)| n == name)
            .map(|(_, ty, data)| (ty, data))
    }

    pub fn type_of(&self, name: &str) -> Option<ShaderType> {
        self.lookup(name).map(|(ty, _)| ty.clone())
    }
}

// ============================================================================
// Resolutions
// ============================================================================

/// How a field that lives outside instances is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    /// `[Static]` field: a private module global initialized from its
    /// default value.
    Static,
    /// `[Static][Uniform]` field on a composite: a member of the uniform
    /// block.
    StaticUniform,
    /// Sampler or image bound directly.
    Resource,
    /// `[SpecConstant]` field.
    SpecConstant,
}

/// What `object.member` refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberResolution {
    /// Instance field, by position among the owner's instance fields.
    Field {
        owner: String,
        index: u32,
        ty: ShaderType,
    },
    /// A field stored as a module global. `global` is the global's name, or
    /// the block member name for static uniforms.
    Global {
        global: String,
        kind: GlobalKind,
        ty: ShaderType,
    },
    /// Vector component selection.
    Swizzle { components: Vec<u32>, ty: ShaderType },
    /// Property read through its synthesized getter.
    Getter {
        owner: String,
        function: String,
        ty: ShaderType,
    },
}

impl MemberResolution {
    pub fn ty(&self) -> &ShaderType {
        match self {
            MemberResolution::Field { ty, .. }
            | MemberResolution::Global { ty, .. }
            | MemberResolution::Swizzle { ty, .. }
            | MemberResolution::Getter { ty, .. } => ty,
        }
    }
}

/// The implicit first argument of a resolved function call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelfArg<'ast> {
    /// Static function.
    None,
    /// Instance function called on the current instance.
    This,
    /// Instance function called on another value, passed by reference.
    Object(&'ast Expr<'ast>),
    /// Extension method: the value becomes the first parameter.
    Receiver(&'ast Expr<'ast>),
}

/// What a call binds to.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResolution<'ast> {
    /// Built-in construction or conversion, e.g. `Real4(v, 1.0)`.
    Construct(ShaderType),
    /// A `Math` function with a direct target counterpart.
    Intrinsic(&'static Intrinsic),
    /// A library function, struct constructors included.
    Function {
        owner: String,
        name: String,
        self_arg: SelfArg<'ast>,
        returns: ShaderType,
    },
    /// `image.Sample(uv)`.
    Sample(&'ast Expr<'ast>),
    /// `output.Append(vertex, index)` on a geometry output stream.
    Append(&'ast Expr<'ast>),
}

/// Swizzle letters, case-insensitive.
pub fn swizzle_components(member: &str, count: u32) -> Option<Vec<u32>> {
    if member.is_empty() || member.len() > 4 {
        return None;
    }
    member
        .chars()
        .map(|c| {
            let index = match c.to_ascii_lowercase() {
                'x' => 0,
                'y' => 1,
                'z' => 2,
                'w' => 3,
                _ => return None,
            };
            (index < count).then_some(index)
        })
        .collect()
}

// ============================================================================
// Typer
// ============================================================================

/// Types expressions inside the functions of one owner type.
pub struct Typer<'t, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
    owner: Option<&'t FragmentType<'a>>,
}

impl<'t, 'a> Typer<'t, 'a> {
    pub fn new(
        ctx: &'t CompilerContext,
        library: &'t FragmentLibrary<'a>,
        owner: Option<&'t FragmentType<'a>>,
    ) -> Self {
        Self {
            ctx,
            library,
            owner,
        }
    }

    pub fn owner(&self) -> Option<&'t FragmentType<'a>> {
        self.owner
    }

    pub fn library(&self) -> &'t FragmentLibrary<'a> {
        self.library
    }

    /// Whether `name` names a type usable as the object of a static member
    /// access, given that it is not shadowed by a local.
    pub fn is_type_name(&self, name: &str) -> bool {
        name == MATH_TYPE || self.library.contains_type(name) || ShaderType::from_name(name).is_some()
    }

    /// `Some(type name)` when `expr` is a bare type name used as an object.
    pub fn static_object<T>(&self, expr: &Expr<'_>, scope: &Scope<T>) -> Option<String> {
        match expr.unparen() {
            Expr::Ident(ident)
                if ident.type_args.is_empty()
                    && scope.lookup(ident.ident.name).is_none()
                    && self.is_type_name(ident.ident.name) =>
            {
                Some(ident.ident.name.to_string())
            }
            _ => None,
        }
    }

    fn this_type(&self, span: Span) -> Result<ShaderType, CompileError> {
        self.owner
            .map(|owner| ShaderType::Struct(owner.name.clone()))
            .ok_or_else(|| CompileError::UnknownSymbol {
                name: "this".into(),
                span,
            })
    }

    /// Type of `expr`.
    pub fn type_of<T>(&self, expr: &Expr<'_>, scope: &Scope<T>) -> Result<ShaderType, CompileError> {
        match expr {
            Expr::Literal(literal) => match literal.kind {
                LiteralKind::Int(_) => Ok(ShaderType::INTEGER),
                LiteralKind::Real(_) => Ok(ShaderType::REAL),
                LiteralKind::Bool(_) => Ok(ShaderType::BOOLEAN),
                LiteralKind::String(_) => Err(CompileError::Untranslatable {
                    construct: "string literal".into(),
                    span: literal.span,
                }),
            },
            Expr::Ident(ident) => scope.type_of(ident.ident.name).ok_or_else(|| {
                CompileError::UnknownSymbol {
                    name: ident.ident.name.to_string(),
                    span: ident.span,
                }
            }),
            Expr::This(span) => self.this_type(*span),
            Expr::Paren(paren) => self.type_of(paren.expr, scope),
            Expr::Binary(binary) => {
                let lhs = self.type_of(binary.left, scope)?;
                let rhs = self.type_of(binary.right, scope)?;
                binary_result(binary.op, &lhs, &rhs).ok_or_else(|| CompileError::TypeMismatch {
                    message: format!(
                        "operator '{}' is not defined for {lhs} and {rhs}",
                        binary.op.as_str()
                    ),
                    span: binary.span,
                })
            }
            Expr::Unary(unary) => {
                let operand = self.type_of(unary.operand, scope)?;
                match unary.op {
                    UnaryOp::LogicalNot if operand.scalar() != Some(ScalarType::Boolean) => {
                        Err(CompileError::TypeMismatch {
                            message: format!("operator '!' is not defined for {operand}"),
                            span: unary.span,
                        })
                    }
                    _ => Ok(operand),
                }
            }
            Expr::Postfix(postfix) => self.type_of(postfix.operand, scope),
            Expr::Assign(assign) => {
                let target = self.type_of(assign.target, scope)?;
                let value = self.type_of(assign.value, scope)?;
                let compatible = match assign.op.binary_op() {
                    None => value.converts_to(&target),
                    Some(op) => binary_result(op, &target, &value).is_some_and(|r| r.converts_to(&target)),
                };
                if compatible {
                    Ok(target)
                } else {
                    Err(CompileError::TypeMismatch {
                        message: format!("cannot assign {value} to {target}"),
                        span: assign.span,
                    })
                }
            }
            Expr::Index(index) => {
                let object = self.type_of(index.object, scope)?;
                let subscript = self.type_of(index.index, scope)?;
                if subscript != ShaderType::INTEGER {
                    return Err(CompileError::TypeMismatch {
                        message: format!("index must be Integer, found {subscript}"),
                        span: index.index.span(),
                    });
                }
                object.element().ok_or_else(|| CompileError::TypeMismatch {
                    message: format!("{object} cannot be indexed"),
                    span: index.span,
                })
            }
            Expr::Member(member) => Ok(self.resolve_member(member, scope)?.ty().clone()),
            Expr::Call(call) => {
                let resolution = self.resolve_call(call, scope)?;
                self.call_type(&resolution, call, scope)
            }
        }
    }

    /// Result type of a resolved call.
    pub fn call_type<T>(
        &self,
        resolution: &CallResolution<'_>,
        call: &CallExpr<'_>,
        scope: &Scope<T>,
    ) -> Result<ShaderType, CompileError> {
        match resolution {
            CallResolution::Construct(ty) => Ok(ty.clone()),
            CallResolution::Function { returns, .. } => Ok(returns.clone()),
            CallResolution::Sample(_) => Ok(ShaderType::vector(ScalarType::Real, 4)),
            CallResolution::Append(_) => Ok(ShaderType::Void),
            CallResolution::Intrinsic(intrinsic) => {
                let args = call
                    .args
                    .iter()
                    .map(|a| self.type_of(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                intrinsic
                    .result_type(&args)
                    .ok_or_else(|| CompileError::TypeMismatch {
                        message: format!("invalid arguments to {MATH_TYPE}.{}", intrinsic.name),
                        span: call.span,
                    })
            }
        }
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Resolve `object.member`.
    pub fn resolve_member<T>(
        &self,
        member: &MemberExpr<'_>,
        scope: &Scope<T>,
    ) -> Result<MemberResolution, CompileError> {
        if member.access != MemberAccess::Dot {
            return Err(CompileError::InvalidMemberOperator {
                op: member.access.as_str().to_string(),
                span: member.span,
            });
        }
        let name = member.member.name;
        let unknown = |owner: &str| CompileError::UnknownSymbol {
            name: format!("{owner}.{name}"),
            span: member.member.span,
        };

        if let Some(type_name) = self.static_object(member.object, scope) {
            let owner = self.library.find_type(&type_name).ok_or_else(|| unknown(&type_name))?;
            let field = owner.find_field(name).ok_or_else(|| unknown(&type_name))?;
            if field.is_instance() {
                return Err(CompileError::TypeMismatch {
                    message: format!("'{type_name}.{name}' is an instance field"),
                    span: member.span,
                });
            }
            return Ok(self.global_field(owner, field));
        }

        let object = self.type_of(member.object, scope)?;
        self.member_of(&object, name, member.member.span)
    }

    /// Resolve member `name` on a value of type `object`.
    pub fn member_of(&self, object: &ShaderType, name: &str, span: Span) -> Result<MemberResolution, CompileError> {
        let unknown = || CompileError::UnknownSymbol {
            name: format!("{object}.{name}"),
            span,
        };
        match object {
            ShaderType::Scalar(scalar) | ShaderType::Vector(scalar, _) => {
                let count = object.component_count().unwrap_or(1);
                let components = swizzle_components(name, count).ok_or_else(unknown)?;
                let ty = ShaderType::vector(*scalar, components.len() as u8);
                Ok(MemberResolution::Swizzle { components, ty })
            }
            ShaderType::Struct(type_name) => {
                let owner = self.library.find_type(type_name).ok_or_else(unknown)?;
                if let Some(field) = owner.find_field(name) {
                    if let Some(index) = owner.instance_index(name) {
                        return Ok(MemberResolution::Field {
                            owner: type_name.clone(),
                            index: index as u32,
                            ty: field.ty.clone(),
                        });
                    }
                    return Ok(self.global_field(owner, field));
                }
                let getter = format!("{GETTER_PREFIX}{name}");
                owner
                    .functions
                    .iter()
                    .find(|f| f.name == getter && f.flags.contains(FunctionFlags::GETTER))
                    .map(|f| MemberResolution::Getter {
                        owner: type_name.clone(),
                        function: f.name.clone(),
                        ty: f.return_type.clone(),
                    })
                    .ok_or_else(unknown)
            }
            _ => Err(unknown()),
        }
    }

    fn global_field(&self, owner: &FragmentType<'_>, field: &Field<'_>) -> MemberResolution {
        let name = field.name.as_str();
        let names = self.ctx.names();
        let kind = if field.is_opaque() {
            GlobalKind::Resource
        } else if field.is_spec_constant() {
            GlobalKind::SpecConstant
        } else if field.is_static() && owner.is_composite() && field.attributes.has(&names.uniform_attribute) {
            GlobalKind::StaticUniform
        } else {
            GlobalKind::Static
        };
        let global = match kind {
            GlobalKind::StaticUniform => name.to_string(),
            _ => names.mangle_property(&owner.name, name),
        };
        MemberResolution::Global {
            global,
            kind,
            ty: field.ty.clone(),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Resolve what `call` binds to.
    pub fn resolve_call<'ast, T>(
        &self,
        call: &CallExpr<'ast>,
        scope: &Scope<T>,
    ) -> Result<CallResolution<'ast>, CompileError> {
        let arity = call.args.len();
        match call.callee.unparen() {
            Expr::Ident(ident) => {
                let name = ident.ident.name;
                if !ident.type_args.is_empty() {
                    let ty = resolve_generic(
                        name,
                        ident.type_args,
                        ident.span,
                        self.ctx.settings(),
                        &|n| self.library.contains_type(n),
                    )?;
                    return Ok(CallResolution::Construct(ty));
                }
                if let Some(ty) = ShaderType::from_name(name).filter(|t| !t.is_opaque() && !t.is_void()) {
                    return Ok(CallResolution::Construct(ty));
                }
                if let Some(ty) = self.library.find_type(name) {
                    return match ty.find_constructor(arity) {
                        Some(_) => Ok(CallResolution::Function {
                            owner: ty.name.clone(),
                            name: CONSTRUCTOR_NAME.to_string(),
                            self_arg: SelfArg::None,
                            returns: ShaderType::Struct(ty.name.clone()),
                        }),
                        None => Err(CompileError::TypeMismatch {
                            message: format!("'{name}' has no constructor taking {arity} argument(s)"),
                            span: call.span,
                        }),
                    };
                }
                // Unqualified call of a function on the current type
                if let Some(owner) = self.owner {
                    if let Some(function) = owner.find_function(name, arity) {
                        return Ok(function_call(owner, function, if function.is_static() {
                            SelfArg::None
                        } else {
                            SelfArg::This
                        }));
                    }
                }
                Err(CompileError::UnknownSymbol {
                    name: name.to_string(),
                    span: ident.span,
                })
            }
            Expr::Member(member) => self.resolve_method(member, call, scope),
            other => Err(CompileError::Untranslatable {
                construct: "call of a computed value".into(),
                span: other.span(),
            }),
        }
    }

    fn resolve_method<'ast, T>(
        &self,
        member: &'ast MemberExpr<'ast>,
        call: &CallExpr<'ast>,
        scope: &Scope<T>,
    ) -> Result<CallResolution<'ast>, CompileError> {
        if member.access != MemberAccess::Dot {
            return Err(CompileError::InvalidMemberOperator {
                op: member.access.as_str().to_string(),
                span: member.span,
            });
        }
        let name = member.member.name;
        let arity = call.args.len();
        let unknown = |owner: &str| CompileError::UnknownSymbol {
            name: format!("{owner}.{name}"),
            span: member.member.span,
        };

        // Static call through a type name
        if let Some(type_name) = self.static_object(member.object, scope) {
            if let Some((owner, function)) = self.library.find_implements(&type_name, name, arity) {
                return Ok(function_call(owner, function, SelfArg::None));
            }
            if type_name == MATH_TYPE {
                if let Some((owner, function)) = self.library.find_extension(MATH_TYPE, name, arity) {
                    return Ok(function_call(owner, function, SelfArg::None));
                }
                return find_intrinsic(name, arity)
                    .map(CallResolution::Intrinsic)
                    .ok_or_else(|| unknown(MATH_TYPE));
            }
            let owner = self.library.find_type(&type_name).ok_or_else(|| unknown(&type_name))?;
            return match owner.find_function(name, arity) {
                Some(function) if function.is_static() => Ok(function_call(owner, function, SelfArg::None)),
                Some(_) => Err(CompileError::TypeMismatch {
                    message: format!("'{type_name}.{name}' is not static"),
                    span: member.span,
                }),
                None => Err(unknown(&type_name)),
            };
        }

        let object = self.type_of(member.object, scope)?;
        let type_name = object.name();
        if let Some((owner, function)) = self.library.find_implements(&type_name, name, arity) {
            let self_arg = if function.has_receiver() {
                SelfArg::Receiver(member.object)
            } else {
                SelfArg::None
            };
            return Ok(function_call(owner, function, self_arg));
        }
        match &object {
            ShaderType::SampledImage2d if name == methods::SAMPLE && arity == 1 => {
                return Ok(CallResolution::Sample(member.object));
            }
            ShaderType::Stream(stream) if stream.is_output && name == methods::APPEND && arity == 2 => {
                return Ok(CallResolution::Append(member.object));
            }
            ShaderType::Struct(struct_name) => {
                if let Some(owner) = self.library.find_type(struct_name) {
                    if let Some(function) = owner.find_function(name, arity).filter(|f| !f.has_receiver()) {
                        let self_arg = if function.is_static() {
                            SelfArg::None
                        } else if matches!(member.object.unparen(), Expr::This(_)) {
                            SelfArg::This
                        } else {
                            SelfArg::Object(member.object)
                        };
                        return Ok(function_call(owner, function, self_arg));
                    }
                }
            }
            _ => {}
        }
        if let Some((owner, function)) = self.library.find_extension(&type_name, name, arity) {
            return Ok(function_call(owner, function, SelfArg::Receiver(member.object)));
        }
        Err(unknown(&type_name))
    }
}

fn function_call<'ast>(owner: &FragmentType<'_>, function: &Function<'_>, self_arg: SelfArg<'ast>) -> CallResolution<'ast> {
    CallResolution::Function {
        owner: owner.name.clone(),
        name: function.name.clone(),
        self_arg,
        returns: function.return_type.clone(),
    }
}

/// Whether an assignment target is an indexed expression, which compound
/// assignment cannot expand safely.
pub fn is_indexed_target(target: &Expr<'_>) -> bool {
    matches!(target.unparen(), Expr::Index(_))
}

/// Whether `op` is a compound assignment.
pub fn is_compound(op: AssignOp) -> bool {
    op.binary_op().is_some()
}

/// Result type of a binary operator, `None` when undefined.
pub fn binary_result(op: BinaryOp, lhs: &ShaderType, rhs: &ShaderType) -> Option<ShaderType> {
    use BinaryOp::*;
    match op {
        LogicalAnd | LogicalOr => {
            (*lhs == ShaderType::BOOLEAN && *rhs == ShaderType::BOOLEAN).then_some(ShaderType::BOOLEAN)
        }
        Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual => {
            let shape = arithmetic_result(lhs, rhs)?;
            if matches!(op, Less | LessEqual | Greater | GreaterEqual) && !shape.is_numeric() {
                return None;
            }
            let count = shape.component_count()? as u8;
            Some(ShaderType::vector(ScalarType::Boolean, count))
        }
        BitwiseAnd | BitwiseOr | BitwiseXor | ShiftLeft | ShiftRight => {
            let scalar = lhs.scalar()?;
            (scalar == ScalarType::Integer && rhs.scalar() == Some(ScalarType::Integer)).then(|| lhs.clone())
        }
        Mul => match (lhs, rhs) {
            (ShaderType::Matrix(_, rows), ShaderType::Vector(ScalarType::Real, n)) if lhs_columns(lhs) == u32::from(*n) => {
                Some(ShaderType::Vector(ScalarType::Real, *rows))
            }
            (ShaderType::Vector(ScalarType::Real, n), ShaderType::Matrix(columns, rows)) if *n == *rows => {
                Some(ShaderType::Vector(ScalarType::Real, *columns))
            }
            (ShaderType::Matrix(..), ShaderType::Matrix(..)) if lhs == rhs => Some(lhs.clone()),
            (ShaderType::Matrix(..), ShaderType::Scalar(ScalarType::Real)) => Some(lhs.clone()),
            _ => arithmetic_result(lhs, rhs).filter(ShaderType::is_numeric),
        },
        Add | Sub | Div | Mod => arithmetic_result(lhs, rhs).filter(ShaderType::is_numeric),
    }
}

fn lhs_columns(ty: &ShaderType) -> u32 {
    match ty {
        ShaderType::Matrix(columns, _) => u32::from(*columns),
        _ => 0,
    }
}

/// Shape of a component-wise operation: scalars broadcast to vectors and
/// integers widen to reals.
pub(crate) fn arithmetic_result(lhs: &ShaderType, rhs: &ShaderType) -> Option<ShaderType> {
    let (ls, rs) = (lhs.scalar()?, rhs.scalar()?);
    if lhs.is_matrix() || rhs.is_matrix() {
        return (lhs == rhs).then(|| lhs.clone());
    }
    let scalar = match (ls, rs) {
        (a, b) if a == b => a,
        (ScalarType::Integer, ScalarType::Real) | (ScalarType::Real, ScalarType::Integer) => ScalarType::Real,
        _ => return None,
    };
    let (lc, rc) = (lhs.component_count()?, rhs.component_count()?);
    let count = match (lc, rc) {
        (a, b) if a == b => a,
        (1, b) => b,
        (a, 1) => a,
        _ => return None,
    };
    Some(ShaderType::vector(scalar, count as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bumpalo::Bump;
    use shaderweave_parser::Parser;

    use crate::passes::{CollectorPass, ValidationPass};

    fn real(n: u8) -> ShaderType {
        ShaderType::vector(ScalarType::Real, n)
    }

    #[test]
    fn arithmetic_broadcast_and_widening() {
        assert_eq!(binary_result(BinaryOp::Mul, &ShaderType::REAL, &real(3)), Some(real(3)));
        assert_eq!(binary_result(BinaryOp::Add, &ShaderType::INTEGER, &ShaderType::REAL), Some(ShaderType::REAL));
        assert_eq!(binary_result(BinaryOp::Add, &real(2), &real(3)), None);
        assert_eq!(
            binary_result(BinaryOp::Less, &real(3), &real(3)),
            Some(ShaderType::Vector(ScalarType::Boolean, 3))
        );
        assert_eq!(
            binary_result(BinaryOp::Mul, &ShaderType::Matrix(4, 4), &real(4)),
            Some(real(4))
        );
        assert_eq!(binary_result(BinaryOp::LogicalAnd, &ShaderType::BOOLEAN, &ShaderType::INTEGER), None);
    }

    #[test]
    fn swizzles() {
        assert_eq!(swizzle_components("XyZ", 3), Some(vec![0, 1, 2]));
        assert_eq!(swizzle_components("w", 3), None);
        assert_eq!(swizzle_components("xxxxx", 4), None);
    }

    #[test]
    fn scope_shadowing() {
        let mut scope: Scope<u32> = Scope::new();
        scope.declare("a", ShaderType::REAL, 0);
        scope.push();
        scope.declare("a", ShaderType::INTEGER, 1);
        assert_eq!(scope.lookup("a").map(|(_, d)| *d), Some(1));
        scope.pop();
        assert_eq!(scope.type_of("a"), Some(ShaderType::REAL));
    }

    #[test]
    fn typing_members_and_calls() {
        let arena = Bump::new();
        let ctx = CompilerContext::default();
        let source = r#"
            struct Helper {
                var Scale : Real = 2.0;
                [Static] var Count : Integer = 3;
                var Doubled : Real { get { return this.Scale * 2.0; } }
                function Apply(v : Real3) : Real3 { return v * this.Scale; }
            }
            [Pixel]
            struct P {
                [Output] var Target0 : Real4;
                function Main() { }
            }
        "#;
        let script = Parser::parse(source, &arena).unwrap();
        let mut library = FragmentLibrary::new();
        let errors = CollectorPass::new(&ctx, Arc::from("t")).run(&script).register(&mut library);
        assert!(errors.is_empty(), "{errors:?}");
        ValidationPass::new(&ctx, &mut library).run();

        let owner = library.find_type("P").unwrap();
        let typer = Typer::new(&ctx, &library, Some(owner));
        let mut scope: Scope<()> = Scope::new();
        scope.declare("h", ShaderType::Struct("Helper".into()), ());

        let expr_arena = Bump::new();
        let ty = |text: &str| {
            let expr = Parser::expression(text, &expr_arena).unwrap();
            typer.type_of(expr, &scope)
        };
        assert_eq!(ty("h.Apply(Real3(1.0)).xy").unwrap(), real(2));
        assert_eq!(ty("h.Doubled").unwrap(), ShaderType::REAL);
        assert_eq!(ty("Helper.Count + 1").unwrap(), ShaderType::INTEGER);
        assert_eq!(ty("Math.Dot(Real3(1.0), Real3(0.0))").unwrap(), ShaderType::REAL);
        assert_eq!(ty("this.Target0.w").unwrap(), ShaderType::REAL);
        assert!(matches!(ty("h->Scale"), Err(CompileError::InvalidMemberOperator { .. })));
        assert!(matches!(ty("missing"), Err(CompileError::UnknownSymbol { .. })));
        assert!(matches!(ty("Helper.Scale"), Err(CompileError::TypeMismatch { .. })));
    }
}
