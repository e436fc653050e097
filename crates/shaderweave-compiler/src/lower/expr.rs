//! Expression lowering.
//!
//! Assignable expressions lower to pointers through [`BodyLowerer::place`];
//! everything else lowers to a value. Mixed integer and real operands are
//! widened and scalars broadcast before component-wise operations, since
//! IR operations expect operands of one shape.

use shaderweave_core::{CompileError, Span};
use shaderweave_ir::{BinOp, MergeInfo, Operand, StorageClass, TypeId, UnOp};
use shaderweave_parser::ast::{
    AssignExpr, BinaryExpr, BinaryOp, CallExpr, Expr, LiteralKind, MemberExpr, PostfixOp, UnaryExpr,
    UnaryOp,
};

use crate::core_types::{Intrinsic, ScalarType, ShaderType};
use crate::library::Parameter;
use crate::translator::FunctionKey;
use crate::typing::{
    CallResolution, GlobalKind, MemberResolution, SelfArg, arithmetic_result, binary_result, is_compound,
    is_indexed_target,
};

use super::{AtSpan, BodyLowerer, Local, Result, find_function, is_output_stream};

/// Intrinsics applied per component, whose scalar arguments broadcast to
/// the result shape.
const COMPONENT_WISE: &[&str] = &["clamp", "min", "max", "mix", "pow", "step", "smoothstep"];

fn bin_op(op: BinaryOp) -> Option<BinOp> {
    Some(match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Rem,
        BinaryOp::ShiftLeft => BinOp::Shl,
        BinaryOp::ShiftRight => BinOp::Shr,
        BinaryOp::BitwiseAnd => BinOp::BitAnd,
        BinaryOp::BitwiseOr => BinOp::BitOr,
        BinaryOp::BitwiseXor => BinOp::BitXor,
        BinaryOp::Equal => BinOp::Eq,
        BinaryOp::NotEqual => BinOp::Ne,
        BinaryOp::Less => BinOp::Lt,
        BinaryOp::LessEqual => BinOp::Le,
        BinaryOp::Greater => BinOp::Gt,
        BinaryOp::GreaterEqual => BinOp::Ge,
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => return None,
    })
}

fn no_value(span: Span) -> CompileError {
    CompileError::TypeMismatch {
        message: "expression has no value".into(),
        span,
    }
}

impl<'b, 't, 'a> BodyLowerer<'b, 't, 'a> {
    pub(super) fn type_of(&self, expr: &Expr<'_>) -> Result<ShaderType> {
        self.typer.type_of(expr, &self.scope)
    }

    fn value_type(&self, value: Operand, span: Span) -> Result<TypeId> {
        self.b.type_of(value).ok_or_else(|| CompileError::Lowering {
            message: format!("operand {value:?} has no type"),
            span,
        })
    }

    fn storage(&self, pointer: Operand) -> Option<StorageClass> {
        let ty = self.b.type_of(pointer)?;
        self.b.module_ref().types.storage(ty)
    }

    /// Value of `expr`, which must produce one.
    pub(super) fn rvalue(&mut self, expr: &Expr<'_>) -> Result<Operand> {
        self.eval(expr)?.ok_or_else(|| no_value(expr.span()))
    }

    /// Value of `expr` converted to `target`.
    pub(super) fn rvalue_as(&mut self, expr: &Expr<'_>, target: &ShaderType) -> Result<Operand> {
        let ty = self.type_of(expr)?;
        if !ty.converts_to(target) {
            return Err(CompileError::TypeMismatch {
                message: format!("cannot convert {ty} to {target}"),
                span: expr.span(),
            });
        }
        let value = self.rvalue(expr)?;
        self.coerce(value, &ty, target, expr.span())
    }

    /// Widen the scalar of `value` and broadcast it to the shape of `to`.
    pub(super) fn coerce(&mut self, value: Operand, from: &ShaderType, to: &ShaderType, span: Span) -> Result<Operand> {
        if from == to || from.is_matrix() || to.is_matrix() {
            return Ok(value);
        }
        let (Some(from_scalar), Some(to_scalar)) = (from.scalar(), to.scalar()) else {
            return Ok(value);
        };
        let mut value = value;
        if from_scalar != to_scalar {
            let ty = self.ir_type(&from.with_scalar(to_scalar), span)?;
            value = self.b.convert(value, ty).at(span)?;
        }
        if let (Some(1), Some(count)) = (from.component_count(), to.component_count()) {
            if count > 1 {
                let ty = self.ir_type(to, span)?;
                value = self.b.construct(vec![value; count as usize], ty).at(span)?;
            }
        }
        Ok(value)
    }

    /// Store `value` in a fresh variable.
    fn materialize(&mut self, expr: &Expr<'_>) -> Result<Operand> {
        let span = expr.span();
        let value = self.rvalue(expr)?;
        let ty = self.value_type(value, span)?;
        self.b.variable(ty, Some(value)).at(span)
    }

    /// Zero value of `ty`, or the default construction of a struct.
    pub(super) fn default_value(&mut self, ty: &ShaderType, span: Span) -> Result<Operand> {
        let repeated = |this: &mut Self, element: &ShaderType, count: u32| -> Result<Operand> {
            let element = this.default_value(element, span)?;
            let ir = this.ir_type(ty, span)?;
            this.b.construct(vec![element; count as usize], ir).at(span)
        };
        match ty {
            ShaderType::Scalar(ScalarType::Real) => Ok(self.b.const_float(0.0)),
            ShaderType::Scalar(ScalarType::Integer) => Ok(self.b.const_int(0)),
            ShaderType::Scalar(ScalarType::Boolean) => Ok(self.b.const_bool(false)),
            ShaderType::Vector(scalar, count) => repeated(self, &ShaderType::Scalar(*scalar), u32::from(*count)),
            ShaderType::Matrix(columns, rows) => repeated(
                self,
                &ShaderType::Vector(ScalarType::Real, *rows),
                u32::from(*columns),
            ),
            ShaderType::Array(element, length) => repeated(self, element, *length),
            ShaderType::Stream(stream) if !stream.is_output => {
                repeated(self, &stream.element, stream.primitive.vertex_count())
            }
            ShaderType::Struct(name) => {
                let id = self
                    .decls
                    .function(self.b.module(), &FunctionKey::constructor(name, 0), span)?;
                self.b.call(id, Vec::new()).at(span)?.ok_or_else(|| no_value(span))
            }
            _ => Err(CompileError::Untranslatable {
                construct: format!("construction of {ty}"),
                span,
            }),
        }
    }

    fn one(&mut self, ty: &ShaderType, span: Span) -> Result<Operand> {
        let (scalar, one) = match ty.scalar() {
            Some(ScalarType::Real) => (ShaderType::REAL, self.b.const_float(1.0)),
            Some(ScalarType::Integer) => (ShaderType::INTEGER, self.b.const_int(1)),
            _ => {
                return Err(CompileError::TypeMismatch {
                    message: format!("cannot increment {ty}"),
                    span,
                });
            }
        };
        self.coerce(one, &scalar, ty, span)
    }

    // ========================================================================
    // Places
    // ========================================================================

    /// Pointer to the storage `expr` names, `None` when it names none.
    pub(super) fn place(&mut self, expr: &Expr<'_>) -> Result<Option<Operand>> {
        match expr {
            Expr::Ident(ident) => match self.scope.lookup(ident.ident.name) {
                Some((_, &Local::Pointer(pointer))) => Ok(Some(pointer)),
                Some((_, Local::Stream)) => Ok(None),
                None => Err(CompileError::UnknownSymbol {
                    name: ident.ident.name.to_string(),
                    span: ident.span,
                }),
            },
            Expr::This(span) => self.this_pointer(*span).map(Some),
            Expr::Paren(paren) => self.place(paren.expr),
            Expr::Member(member) => self.member_place(member),
            Expr::Index(index) => {
                let Some(base) = self.place(index.object)? else {
                    return Ok(None);
                };
                let subscript = self.rvalue(index.index)?;
                self.b.access_chain(base, vec![subscript]).at(index.span).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn member_place(&mut self, member: &MemberExpr<'_>) -> Result<Option<Operand>> {
        let span = member.span;
        let unknown = |name: &str| CompileError::UnknownSymbol {
            name: name.to_string(),
            span,
        };
        match self.typer.resolve_member(member, &self.scope)? {
            MemberResolution::Field { index, .. } => {
                let Some(base) = self.place(member.object)? else {
                    return Ok(None);
                };
                let index = self.b.const_int(index as i32);
                self.b.access_chain(base, vec![index]).at(span).map(Some)
            }
            MemberResolution::Global { global, kind, ty } => match kind {
                GlobalKind::Static => {
                    let owner = self.static_owner(member).ok_or_else(|| unknown(&global))?;
                    let id = self.decls.static_global(
                        self.b.module(),
                        &owner,
                        member.member.name,
                        &global,
                        &ty,
                        span,
                    )?;
                    Ok(Some(Operand::Global(id)))
                }
                GlobalKind::StaticUniform => {
                    let (Some(material), Some(&index)) =
                        (self.decls.material, self.decls.uniform_members.get(&global))
                    else {
                        return Err(unknown(&global));
                    };
                    let index = self.b.const_int(index as i32);
                    self.b.access_chain(Operand::Global(material), vec![index]).at(span).map(Some)
                }
                GlobalKind::Resource => self
                    .decls
                    .resources
                    .get(&global)
                    .map(|&id| Some(Operand::Global(id)))
                    .ok_or_else(|| unknown(&global)),
                GlobalKind::SpecConstant => Ok(None),
            },
            MemberResolution::Swizzle { components, .. } if components.len() == 1 => {
                if !self.type_of(member.object)?.is_vector() {
                    return self.place(member.object);
                }
                let Some(base) = self.place(member.object)? else {
                    return Ok(None);
                };
                let index = self.b.const_int(components[0] as i32);
                self.b.access_chain(base, vec![index]).at(span).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Type declaring a static field read through `member`.
    fn static_owner(&self, member: &MemberExpr<'_>) -> Option<String> {
        self.typer
            .static_object(member.object, &self.scope)
            .or_else(|| match self.type_of(member.object) {
                Ok(ShaderType::Struct(name)) => Some(name),
                _ => None,
            })
    }

    /// A function-storage pointer for a by-reference argument, with the
    /// place to copy back to after the call when the argument had to be
    /// copied.
    fn reference(&mut self, expr: &Expr<'_>) -> Result<(Operand, Option<Operand>)> {
        let span = expr.span();
        let Some(pointer) = self.place(expr)? else {
            return Ok((self.materialize(expr)?, None));
        };
        let storage = self.storage(pointer);
        if storage == Some(StorageClass::Function) {
            return Ok((pointer, None));
        }
        let value = self.b.load(pointer).at(span)?;
        let ty = self.value_type(value, span)?;
        let temp = self.b.variable(ty, Some(value)).at(span)?;
        let writable = matches!(storage, Some(StorageClass::Private | StorageClass::Output));
        Ok((temp, writable.then_some(pointer)))
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Lower `expr`; `None` for calls of void functions.
    pub(super) fn eval(&mut self, expr: &Expr<'_>) -> Result<Option<Operand>> {
        let span = expr.span();
        match expr {
            Expr::Literal(literal) => Ok(Some(match literal.kind {
                LiteralKind::Int(value) => self.b.const_int(value as i32),
                LiteralKind::Real(value) => self.b.const_float(value as f32),
                LiteralKind::Bool(value) => self.b.const_bool(value),
                LiteralKind::String(_) => {
                    return Err(CompileError::Untranslatable {
                        construct: "string literal".into(),
                        span,
                    });
                }
            })),
            Expr::Paren(paren) => self.eval(paren.expr),
            Expr::Binary(binary) => self.binary(binary).map(Some),
            Expr::Unary(unary) => self.unary(unary).map(Some),
            Expr::Postfix(postfix) => self
                .step(postfix.operand, postfix.op == PostfixOp::PostInc, true, postfix.span)
                .map(Some),
            Expr::Assign(assign) => self.assign(expr, assign).map(Some),
            Expr::Call(call) => self.call(call),
            Expr::Member(member) => self.member(member).map(Some),
            Expr::Ident(_) | Expr::This(_) | Expr::Index(_) => {
                if let Some(pointer) = self.place(expr)? {
                    return self.b.load(pointer).at(span).map(Some);
                }
                match expr {
                    Expr::Index(index) => {
                        let base = self.materialize(index.object)?;
                        let subscript = self.rvalue(index.index)?;
                        let pointer = self.b.access_chain(base, vec![subscript]).at(span)?;
                        self.b.load(pointer).at(span).map(Some)
                    }
                    _ => Err(CompileError::Untranslatable {
                        construct: "output stream used as a value".into(),
                        span,
                    }),
                }
            }
        }
    }

    fn member(&mut self, member: &MemberExpr<'_>) -> Result<Operand> {
        let span = member.span;
        if let Some(pointer) = self.member_place(member)? {
            return self.b.load(pointer).at(span);
        }
        match self.typer.resolve_member(member, &self.scope)? {
            MemberResolution::Field { index, .. } => {
                let object = self.rvalue(member.object)?;
                self.b.extract(object, vec![index]).at(span)
            }
            MemberResolution::Global { global, kind, .. } => match kind {
                GlobalKind::SpecConstant => self
                    .decls
                    .spec_constants
                    .get(&global)
                    .map(|&id| Operand::SpecConst(id))
                    .ok_or(CompileError::UnknownSymbol { name: global, span }),
                _ => Err(CompileError::UnknownSymbol { name: global, span }),
            },
            MemberResolution::Swizzle { components, .. } => {
                let is_vector = self.type_of(member.object)?.is_vector();
                let object = self.rvalue(member.object)?;
                match components.as_slice() {
                    [_] if !is_vector => Ok(object),
                    [component] => self.b.extract(object, vec![*component]).at(span),
                    _ => self.b.shuffle(object, components).at(span),
                }
            }
            MemberResolution::Getter { owner, function, .. } => {
                let id = self
                    .decls
                    .function(self.b.module(), &FunctionKey::new(&owner, &function, 0), span)?;
                let (receiver, copy_back) = self.reference(member.object)?;
                let value = self.b.call(id, vec![receiver]).at(span)?.ok_or_else(|| no_value(span))?;
                if let Some(place) = copy_back {
                    self.copy_back(receiver, place, span)?;
                }
                Ok(value)
            }
        }
    }

    fn copy_back(&mut self, temp: Operand, place: Operand, span: Span) -> Result<()> {
        let value = self.b.load(temp).at(span)?;
        self.b.store(place, value).at(span)
    }

    // ========================================================================
    // Operators
    // ========================================================================

    /// `lhs op rhs` on values of types `lt` and `rt`.
    fn arithmetic(
        &mut self,
        op: BinaryOp,
        (lhs, lt): (Operand, &ShaderType),
        (rhs, rt): (Operand, &ShaderType),
        span: Span,
    ) -> Result<(Operand, ShaderType)> {
        let mismatch = || CompileError::TypeMismatch {
            message: format!("operator '{}' is not defined for {lt} and {rt}", op.as_str()),
            span,
        };
        let result = binary_result(op, lt, rt).ok_or_else(mismatch)?;
        let ir_op = bin_op(op).ok_or_else(mismatch)?;
        let (lhs, rhs) = match arithmetic_result(lt, rt).filter(|_| !lt.is_matrix() && !rt.is_matrix()) {
            Some(shape) => (self.coerce(lhs, lt, &shape, span)?, self.coerce(rhs, rt, &shape, span)?),
            None => (lhs, rhs),
        };
        let ty = if ir_op.is_comparison() {
            None
        } else {
            Some(self.ir_type(&result, span)?)
        };
        let value = self.b.binary(ir_op, lhs, rhs, ty).at(span)?;
        Ok((value, result))
    }

    fn binary(&mut self, binary: &BinaryExpr<'_>) -> Result<Operand> {
        match binary.op {
            BinaryOp::LogicalAnd => return self.short_circuit(binary, true),
            BinaryOp::LogicalOr => return self.short_circuit(binary, false),
            _ => {}
        }
        let lt = self.type_of(binary.left)?;
        let rt = self.type_of(binary.right)?;
        let lhs = self.rvalue(binary.left)?;
        let rhs = self.rvalue(binary.right)?;
        self.arithmetic(binary.op, (lhs, &lt), (rhs, &rt), binary.span)
            .map(|(value, _)| value)
    }

    /// `&&` and `||` evaluate their right operand only when needed.
    fn short_circuit(&mut self, binary: &BinaryExpr<'_>, is_and: bool) -> Result<Operand> {
        let span = binary.span;
        let lhs = self.rvalue_as(binary.left, &ShaderType::BOOLEAN)?;
        let bool_ty = self.b.module().types.bool();
        let temp = self.b.variable(bool_ty, None).at(span)?;

        let header = self.b.current_block();
        let evaluate = self.b.create_block();
        let known = self.b.create_block();
        let merge = self.b.create_block();
        self.b.set_merge(header, MergeInfo::Selection { merge });
        if is_and {
            self.b.cond_branch(lhs, evaluate, known).at(span)?;
        } else {
            self.b.cond_branch(lhs, known, evaluate).at(span)?;
        }

        self.b.switch_to(known);
        let known_value = self.b.const_bool(!is_and);
        self.b.store(temp, known_value).at(span)?;
        self.b.branch(merge).at(span)?;

        self.b.switch_to(evaluate);
        let rhs = self.rvalue_as(binary.right, &ShaderType::BOOLEAN)?;
        self.b.store(temp, rhs).at(span)?;
        self.b.branch(merge).at(span)?;

        self.b.switch_to(merge);
        self.b.load(temp).at(span)
    }

    fn unary(&mut self, unary: &UnaryExpr<'_>) -> Result<Operand> {
        let span = unary.span;
        let op = match unary.op {
            UnaryOp::PreInc => return self.step(unary.operand, true, false, span),
            UnaryOp::PreDec => return self.step(unary.operand, false, false, span),
            UnaryOp::Plus => return self.rvalue(unary.operand),
            UnaryOp::Neg => UnOp::Neg,
            UnaryOp::LogicalNot => UnOp::Not,
            UnaryOp::BitwiseNot => UnOp::BitNot,
        };
        let operand = self.rvalue(unary.operand)?;
        self.b.unary(op, operand).at(span)
    }

    /// `++` and `--`, yielding the old value when `post`.
    fn step(&mut self, operand: &Expr<'_>, increment: bool, post: bool, span: Span) -> Result<Operand> {
        let pointer = self.place(operand)?.ok_or_else(|| CompileError::TypeMismatch {
            message: "operand of '++' or '--' must be assignable".into(),
            span,
        })?;
        let ty = self.type_of(operand)?;
        let old = self.b.load(pointer).at(span)?;
        let one = self.one(&ty, span)?;
        let op = if increment { BinOp::Add } else { BinOp::Sub };
        let new = self.b.binary(op, old, one, None).at(span)?;
        self.b.store(pointer, new).at(span)?;
        Ok(if post { old } else { new })
    }

    fn assign(&mut self, expr: &Expr<'_>, assign: &AssignExpr<'_>) -> Result<Operand> {
        let span = assign.span;
        if is_compound(assign.op) && is_indexed_target(assign.target) {
            return Err(CompileError::CompoundIndexedAssignment { span });
        }
        let target_ty = self.type_of(expr)?;
        let value_ty = self.type_of(assign.value)?;

        if let Expr::Member(member) = assign.target.unparen() {
            if let MemberResolution::Swizzle { components, .. } = self.typer.resolve_member(member, &self.scope)? {
                if components.len() > 1 {
                    return self.assign_swizzle(member, &components, assign, (&target_ty, &value_ty));
                }
            }
        }

        let pointer = self.place(assign.target)?.ok_or_else(|| CompileError::TypeMismatch {
            message: "left side of assignment is not assignable".into(),
            span,
        })?;
        let value = self.rvalue(assign.value)?;
        let value = match assign.op.binary_op() {
            None => self.coerce(value, &value_ty, &target_ty, span)?,
            Some(op) => {
                let old = self.b.load(pointer).at(span)?;
                self.compound(op, (old, &target_ty), (value, &value_ty), span)?
            }
        };
        self.b.store(pointer, value).at(span)?;
        Ok(value)
    }

    /// `target op value` converted back to the target type.
    fn compound(
        &mut self,
        op: BinaryOp,
        target: (Operand, &ShaderType),
        value: (Operand, &ShaderType),
        span: Span,
    ) -> Result<Operand> {
        let target_ty = target.1;
        let (combined, result) = self.arithmetic(op, target, value, span)?;
        self.coerce(combined, &result, target_ty, span)
    }

    /// Assignment through a multi-component swizzle rebuilds the vector.
    fn assign_swizzle(
        &mut self,
        member: &MemberExpr<'_>,
        components: &[u32],
        assign: &AssignExpr<'_>,
        (target_ty, value_ty): (&ShaderType, &ShaderType),
    ) -> Result<Operand> {
        let span = assign.span;
        let base_ty = self.type_of(member.object)?;
        let base = self.place(member.object)?.ok_or_else(|| CompileError::TypeMismatch {
            message: "swizzle target is not assignable".into(),
            span,
        })?;
        let value = self.rvalue(assign.value)?;
        let old = self.b.load(base).at(span)?;
        let part = match assign.op.binary_op() {
            None => self.coerce(value, value_ty, target_ty, span)?,
            Some(op) => {
                let current = self.b.shuffle(old, components.to_vec()).at(span)?;
                self.compound(op, (current, target_ty), (value, value_ty), span)?
            }
        };

        let count = base_ty.component_count().unwrap_or(1);
        let mut parts = Vec::with_capacity(count as usize);
        for component in 0..count {
            let lane = match components.iter().position(|&c| c == component) {
                Some(position) => self.b.extract(part, vec![position as u32]),
                None => self.b.extract(old, vec![component]),
            };
            parts.push(lane.at(span)?);
        }
        let ty = self.ir_type(&base_ty, span)?;
        let rebuilt = self.b.construct(parts, ty).at(span)?;
        self.b.store(base, rebuilt).at(span)?;
        Ok(part)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn call(&mut self, call: &CallExpr<'_>) -> Result<Option<Operand>> {
        let span = call.span;
        let resolution = self.typer.resolve_call(call, &self.scope)?;
        let returns = self.typer.call_type(&resolution, call, &self.scope)?;
        match resolution {
            CallResolution::Construct(ty) => self.construct(&ty, call).map(Some),
            CallResolution::Intrinsic(intrinsic) => self.intrinsic(intrinsic, call, &returns).map(Some),
            CallResolution::Function {
                owner,
                name,
                self_arg,
                ..
            } => self.function_call(&owner, &name, self_arg, call),
            CallResolution::Sample(object) => {
                let image = self.rvalue(object)?;
                let coordinate = match call.args.first() {
                    Some(arg) => self.rvalue(arg)?,
                    None => return Err(no_value(span)),
                };
                self.b.sample(image, coordinate).at(span).map(Some)
            }
            CallResolution::Append(_) => {
                let helper = self.decls.append_helper(self.b.module(), span)?;
                let [vertex, index] = call.args else {
                    return Err(no_value(span));
                };
                let vertex = self.rvalue(vertex)?;
                let index = self.rvalue_as(index, &ShaderType::INTEGER)?;
                self.b.call(helper, vec![vertex, index]).at(span)?;
                Ok(None)
            }
        }
    }

    /// Built-in construction and conversion.
    fn construct(&mut self, ty: &ShaderType, call: &CallExpr<'_>) -> Result<Operand> {
        let span = call.span;
        if call.args.is_empty() {
            return self.default_value(ty, span);
        }
        let mut args = Vec::with_capacity(call.args.len());
        for arg in call.args {
            let arg_ty = self.type_of(arg)?;
            args.push((self.rvalue(arg)?, arg_ty));
        }
        let unsupported = || CompileError::Untranslatable {
            construct: format!("construction of {ty} from {} argument(s)", call.args.len()),
            span,
        };

        match (ty, args.as_slice()) {
            (ShaderType::Scalar(_) | ShaderType::Vector(..), [(value, arg_ty)]) => {
                let count = ty.component_count().unwrap_or(1);
                let mut value = *value;
                let mut arg_ty = arg_ty.clone();
                if let (Some(scalar), Some(arg_count)) = (arg_ty.scalar(), arg_ty.component_count()) {
                    if arg_count > count {
                        value = if count == 1 {
                            self.b.extract(value, vec![0]).at(span)?
                        } else {
                            self.b.shuffle(value, (0..count).collect()).at(span)?
                        };
                        arg_ty = ShaderType::vector(scalar, count as u8);
                    }
                }
                self.coerce(value, &arg_ty, ty, span)
            }
            (ShaderType::Vector(scalar, _), _) => {
                let mut components = Vec::new();
                for (value, arg_ty) in &args {
                    let widened = arg_ty.with_scalar(*scalar);
                    components.push(self.coerce(*value, arg_ty, &widened, span)?);
                }
                let ir = self.ir_type(ty, span)?;
                self.b.construct(components, ir).at(span)
            }
            (ShaderType::Matrix(columns, rows), _) => {
                let column_ty = ShaderType::Vector(ScalarType::Real, *rows);
                let mut columns_out = Vec::with_capacity(usize::from(*columns));
                if args.len() == usize::from(*columns) {
                    for (value, arg_ty) in &args {
                        columns_out.push(self.coerce(*value, arg_ty, &column_ty, span)?);
                    }
                } else if args.len() == usize::from(*columns) * usize::from(*rows) {
                    let column_ir = self.ir_type(&column_ty, span)?;
                    for chunk in args.chunks(usize::from(*rows)) {
                        let mut lanes = Vec::with_capacity(chunk.len());
                        for (value, arg_ty) in chunk {
                            lanes.push(self.coerce(*value, arg_ty, &ShaderType::REAL, span)?);
                        }
                        columns_out.push(self.b.construct(lanes, column_ir).at(span)?);
                    }
                } else {
                    return Err(unsupported());
                }
                let ir = self.ir_type(ty, span)?;
                self.b.construct(columns_out, ir).at(span)
            }
            (ShaderType::Array(element, _), _) => {
                let mut elements = Vec::with_capacity(args.len());
                for (value, arg_ty) in &args {
                    elements.push(self.coerce(*value, arg_ty, element, span)?);
                }
                let ir = self.ir_type(ty, span)?;
                self.b.construct(elements, ir).at(span)
            }
            _ => Err(unsupported()),
        }
    }

    fn intrinsic(&mut self, intrinsic: &Intrinsic, call: &CallExpr<'_>, returns: &ShaderType) -> Result<Operand> {
        let span = call.span;
        let mut args = Vec::with_capacity(call.args.len());
        for arg in call.args {
            let arg_ty = self.type_of(arg)?;
            let mut value = self.rvalue(arg)?;
            // Integer arguments widen where the result is real
            if returns.scalar() == Some(ScalarType::Real) && arg_ty.scalar() == Some(ScalarType::Integer) {
                value = self.coerce(value, &arg_ty, &arg_ty.with_scalar(ScalarType::Real), span)?;
            }
            if COMPONENT_WISE.contains(&intrinsic.target) {
                let scalar = returns.scalar().unwrap_or(ScalarType::Real);
                let lane = arg_ty.with_scalar(scalar);
                value = self.coerce(value, &lane, returns, span)?;
            }
            args.push(value);
        }
        let result = self.ir_type(returns, span)?;

        if intrinsic.name == "Multiply" {
            let [lhs, rhs] = args[..] else {
                return Err(no_value(span));
            };
            return self.b.binary(BinOp::Mul, lhs, rhs, Some(result)).at(span);
        }
        if intrinsic.name == "Saturate" {
            let zero = self.default_value(returns, span)?;
            let one = self.one(returns, span)?;
            args.extend([zero, one]);
        }
        self.b
            .intrinsic(intrinsic.target, args, Some(result))
            .at(span)?
            .ok_or_else(|| no_value(span))
    }

    fn function_call(
        &mut self,
        owner: &str,
        name: &str,
        self_arg: SelfArg<'_>,
        call: &CallExpr<'_>,
    ) -> Result<Option<Operand>> {
        let span = call.span;
        let key = FunctionKey::new(owner, name, call.args.len());
        let id = self.decls.function(self.b.module(), &key, span)?;
        let library = self.library;
        let (_, function) = find_function(library, &key).ok_or_else(|| CompileError::UnknownSymbol {
            name: format!("{owner}.{name}"),
            span,
        })?;

        let mut args = Vec::with_capacity(function.params.len() + 1);
        let mut copies = Vec::new();
        let mut params = function.params.iter();
        match self_arg {
            SelfArg::None => {}
            SelfArg::This => args.push(self.this_pointer(span)?),
            SelfArg::Object(object) => {
                let (pointer, copy_back) = self.reference(object)?;
                args.push(pointer);
                copies.extend(copy_back.map(|place| (pointer, place)));
            }
            SelfArg::Receiver(object) => {
                if let Some(param) = params.next() {
                    self.argument(param, object, &mut args, &mut copies)?;
                }
            }
        }
        for (param, arg) in params.zip(call.args.iter()) {
            self.argument(param, arg, &mut args, &mut copies)?;
        }

        let result = self.b.call(id, args).at(span)?;
        for (temp, place) in copies {
            self.copy_back(temp, place, span)?;
        }
        Ok(result)
    }

    fn argument(
        &mut self,
        param: &Parameter,
        arg: &Expr<'_>,
        args: &mut Vec<Operand>,
        copies: &mut Vec<(Operand, Operand)>,
    ) -> Result<()> {
        if is_output_stream(&param.ty) {
            return Ok(());
        }
        if param.is_ref {
            let (pointer, copy_back) = self.reference(arg)?;
            args.push(pointer);
            copies.extend(copy_back.map(|place| (pointer, place)));
        } else {
            args.push(self.rvalue_as(arg, &param.ty)?);
        }
        Ok(())
    }
}
