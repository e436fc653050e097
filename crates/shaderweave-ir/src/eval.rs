//! Reference evaluator.
//!
//! A small interpreter over IR modules, used to check that lowering keeps
//! source semantics: evaluation order, short-circuiting, loop exits. It is
//! not a shader emulator; intrinsics and texture sampling are delegated to
//! an [`IntrinsicHandler`] supplied by the caller.

use thiserror::Error;

use crate::constant::ConstValue;
use crate::function::{BinOp, BlockId, FuncId, IrFunction, Op, Operand, Terminator, UnOp};
use crate::module::{GlobalId, IrModule};
use crate::types::{IrType, ScalarKind, TypeId};

const DEFAULT_STEP_LIMIT: u64 = 1_000_000;
const MAX_CALL_DEPTH: usize = 64;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i32),
    Float(f32),
    /// Vectors, matrices (as columns), arrays and structs.
    Composite(Vec<Value>),
    Pointer(Pointer),
    /// Handle of a sampler or image global, by name.
    Opaque(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Float vector from components.
    pub fn vector(components: &[f32]) -> Value {
        Value::Composite(components.iter().map(|c| Value::Float(*c)).collect())
    }

    /// Components of a float vector.
    pub fn as_floats(&self) -> Option<Vec<f32>> {
        match self {
            Value::Float(f) => Some(vec![*f]),
            Value::Composite(parts) => parts.iter().map(Value::as_float).collect(),
            _ => None,
        }
    }
}

/// Where a pointer points.
#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    root: Root,
    path: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Root {
    Global(GlobalId),
    Local(usize),
}

/// Evaluation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown global '{0}'")]
    UnknownGlobal(String),
    #[error("type error in '{function}': {message}")]
    Type { function: String, message: String },
    #[error("intrinsic '{name}' failed: {message}")]
    Intrinsic { name: String, message: String },
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
    #[error("call depth limit exceeded")]
    CallDepth,
    #[error("fragment discarded")]
    Discarded,
}

/// Dispatches target intrinsics and texture sampling (`texture`).
pub trait IntrinsicHandler {
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError>;
}

impl<H: IntrinsicHandler + ?Sized> IntrinsicHandler for &mut H {
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
        (**self).call(name, args)
    }
}

/// Common math intrinsics. Texture sampling returns opaque white.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicIntrinsics;

fn intrinsic_error(name: &str, message: &str) -> EvalError {
    EvalError::Intrinsic {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn map_floats(value: &Value, f: impl Fn(f32) -> f32) -> Option<Value> {
    match value {
        Value::Float(x) => Some(Value::Float(f(*x))),
        Value::Composite(parts) => parts
            .iter()
            .map(|p| p.as_float().map(|x| Value::Float(f(x))))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        _ => None,
    }
}

fn zip_floats(a: &Value, b: &Value, f: impl Fn(f32, f32) -> f32) -> Option<Value> {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => Some(Value::Float(f(*x, *y))),
        (Value::Composite(_), Value::Float(y)) => map_floats(a, |x| f(x, *y)),
        (Value::Composite(xs), Value::Composite(ys)) if xs.len() == ys.len() => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| Some(Value::Float(f(x.as_float()?, y.as_float()?))))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        _ => None,
    }
}

impl IntrinsicHandler for BasicIntrinsics {
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
        let bad = || intrinsic_error(name, "unsupported arguments");
        let result = match (name, args) {
            ("abs", [x]) => map_floats(x, f32::abs),
            ("floor", [x]) => map_floats(x, f32::floor),
            ("ceil", [x]) => map_floats(x, f32::ceil),
            ("fract", [x]) => map_floats(x, f32::fract),
            ("sqrt", [x]) => map_floats(x, f32::sqrt),
            ("sin", [x]) => map_floats(x, f32::sin),
            ("cos", [x]) => map_floats(x, f32::cos),
            ("min", [a, b]) => zip_floats(a, b, f32::min),
            ("max", [a, b]) => zip_floats(a, b, f32::max),
            ("pow", [a, b]) => zip_floats(a, b, f32::powf),
            ("clamp", [x, lo, hi]) => zip_floats(x, lo, f32::max).and_then(|v| zip_floats(&v, hi, f32::min)),
            ("mix", [a, b, t]) => {
                let diff = zip_floats(b, a, |b, a| b - a);
                diff.and_then(|d| zip_floats(&d, t, |d, t| d * t))
                    .and_then(|d| zip_floats(a, &d, |a, d| a + d))
            }
            ("dot", [a, b]) => match (a.as_floats(), b.as_floats()) {
                (Some(a), Some(b)) if a.len() == b.len() => {
                    Some(Value::Float(a.iter().zip(&b).map(|(x, y)| x * y).sum()))
                }
                _ => None,
            },
            ("length", [a]) => a
                .as_floats()
                .map(|v| Value::Float(v.iter().map(|x| x * x).sum::<f32>().sqrt())),
            ("normalize", [a]) => a.as_floats().map(|v| {
                let length = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                Value::vector(&v.iter().map(|x| if length > 0.0 { x / length } else { 0.0 }).collect::<Vec<_>>())
            }),
            ("texture", [_, _]) => Some(Value::vector(&[1.0, 1.0, 1.0, 1.0])),
            _ => return Err(intrinsic_error(name, "unknown intrinsic")),
        };
        result.map(Some).ok_or_else(bad)
    }
}

struct Frame<'a> {
    values: &'a [Value],
    value_types: &'a [Option<TypeId>],
    params: &'a [Value],
}

/// Interprets functions of one module.
pub struct Evaluator<'m, H> {
    module: &'m IrModule,
    globals: Vec<Value>,
    locals: Vec<Value>,
    handler: H,
    steps: u64,
    step_limit: u64,
    depth: usize,
}

impl<'m, H: IntrinsicHandler> Evaluator<'m, H> {
    /// Create an evaluator with zero-initialized globals.
    pub fn new(module: &'m IrModule, handler: H) -> Self {
        let globals = module
            .globals
            .iter()
            .map(|g| {
                if module.types.get(g.ty).is_some_and(IrType::is_opaque) {
                    Value::Opaque(g.name.clone())
                } else {
                    zero_value(module, g.ty)
                }
            })
            .collect();
        Self {
            module,
            globals,
            locals: Vec::new(),
            handler,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            depth: 0,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Seed a global by name.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let id = self
            .module
            .find_global(name)
            .ok_or_else(|| EvalError::UnknownGlobal(name.to_string()))?;
        self.globals[id.index()] = value;
        Ok(())
    }

    /// Read a global by name.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.module
            .find_global(name)
            .and_then(|id| self.globals.get(id.index()))
    }

    /// Run the first entry point.
    pub fn run_entry(&mut self) -> Result<(), EvalError> {
        let entry = self
            .module
            .entry_points
            .first()
            .ok_or_else(|| EvalError::UnknownFunction("<entry point>".into()))?;
        self.call(entry.function, Vec::new()).map(|_| ())
    }

    /// Call a function by name.
    pub fn call_named(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
        let id = self
            .module
            .find_function(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        self.call(id, args)
    }

    /// Call a function.
    pub fn call(&mut self, id: FuncId, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
        let module = self.module;
        let function = module
            .function(id)
            .ok_or_else(|| EvalError::UnknownFunction(format!("#{}", id.0)))?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepth);
        }
        self.depth += 1;
        let result = self.execute(function, args);
        self.depth -= 1;
        result
    }

    fn type_error(function: &IrFunction, message: impl Into<String>) -> EvalError {
        EvalError::Type {
            function: function.name.clone(),
            message: message.into(),
        }
    }

    fn execute(&mut self, function: &'m IrFunction, params: Vec<Value>) -> Result<Option<Value>, EvalError> {
        if params.len() != function.params.len() {
            return Err(Self::type_error(function, "wrong number of arguments"));
        }
        let mut values: Vec<Value> = vec![Value::Void; function.value_count as usize];
        let value_types = function.value_types();
        let mut current = BlockId(0);

        loop {
            let block = function
                .block(current)
                .ok_or_else(|| Self::type_error(function, format!("missing block {current}")))?;
            for inst in &block.insts {
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(EvalError::StepLimit(self.step_limit));
                }
                let frame = Frame {
                    values: &values,
                    value_types: &value_types,
                    params: &params,
                };
                let result = self.execute_op(function, &frame, &inst.op, inst.ty)?;
                if let Some(id) = inst.result {
                    if let Some(slot) = values.get_mut(id.index()) {
                        *slot = result;
                    }
                }
            }

            let read = |operand: &Operand, this: &Self| this.operand(function, &values, &params, *operand);
            match &block.terminator {
                None => return Err(Self::type_error(function, format!("{current} has no terminator"))),
                Some(Terminator::Return) => return Ok(None),
                Some(Terminator::ReturnValue(value)) => return Ok(Some(read(value, self)?)),
                Some(Terminator::Branch(target)) => current = *target,
                Some(Terminator::CondBranch {
                    condition,
                    accept,
                    reject,
                }) => {
                    let condition = read(condition, self)?
                        .as_bool()
                        .ok_or_else(|| Self::type_error(function, "branch condition is not a bool"))?;
                    current = if condition { *accept } else { *reject };
                }
                Some(Terminator::Kill) => return Err(EvalError::Discarded),
            }
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(EvalError::StepLimit(self.step_limit));
            }
        }
    }

    fn operand(
        &self,
        function: &IrFunction,
        values: &[Value],
        params: &[Value],
        operand: Operand,
    ) -> Result<Value, EvalError> {
        Ok(match operand {
            Operand::Value(v) => values
                .get(v.index())
                .cloned()
                .ok_or_else(|| Self::type_error(function, format!("undefined value {v}")))?,
            Operand::Const(c) => const_value(self.module, c)
                .ok_or_else(|| Self::type_error(function, format!("unknown constant {}", c.0)))?,
            Operand::SpecConst(s) => self
                .module
                .spec_constants
                .get(s.index())
                .map(|s| scalar(&s.default))
                .ok_or_else(|| Self::type_error(function, format!("unknown spec constant {}", s.0)))?,
            Operand::Global(g) => Value::Pointer(Pointer {
                root: Root::Global(g),
                path: Vec::new(),
            }),
            Operand::Param(i) => params
                .get(i as usize)
                .cloned()
                .ok_or_else(|| Self::type_error(function, format!("no parameter {i}")))?,
        })
    }

    fn slot(&mut self, pointer: &Pointer) -> Option<&mut Value> {
        let mut value = match pointer.root {
            Root::Global(g) => self.globals.get_mut(g.index())?,
            Root::Local(i) => self.locals.get_mut(i)?,
        };
        for &index in &pointer.path {
            value = match value {
                Value::Composite(parts) => parts.get_mut(index as usize)?,
                _ => return None,
            };
        }
        Some(value)
    }

    fn execute_op(
        &mut self,
        function: &'m IrFunction,
        frame: &Frame<'_>,
        op: &Op,
        ty: Option<TypeId>,
    ) -> Result<Value, EvalError> {
        let module = self.module;
        let get = |this: &Self, operand: &Operand| this.operand(function, frame.values, frame.params, *operand);
        let pointer = |value: Value| match value {
            Value::Pointer(p) => Ok(p),
            _ => Err(Self::type_error(function, "expected a pointer")),
        };

        Ok(match op {
            Op::Variable { init } => {
                let pointee = ty
                    .and_then(|t| module.types.pointee(t))
                    .ok_or_else(|| Self::type_error(function, "variable without pointer type"))?;
                let initial = match init {
                    Some(init) => get(self, init)?,
                    None => zero_value(module, pointee),
                };
                self.locals.push(initial);
                Value::Pointer(Pointer {
                    root: Root::Local(self.locals.len() - 1),
                    path: Vec::new(),
                })
            }
            Op::Load { pointer: p } => {
                let p = pointer(get(self, p)?)?;
                self.slot(&p)
                    .cloned()
                    .ok_or_else(|| Self::type_error(function, "load through dangling pointer"))?
            }
            Op::Store { pointer: p, value } => {
                let p = pointer(get(self, p)?)?;
                let value = get(self, value)?;
                let slot = self
                    .slot(&p)
                    .ok_or_else(|| Self::type_error(function, "store through dangling pointer"))?;
                *slot = value;
                Value::Void
            }
            Op::AccessChain { base, indices } => {
                let mut p = pointer(get(self, base)?)?;
                for index in indices {
                    let index = get(self, index)?
                        .as_int()
                        .and_then(|i| u32::try_from(i).ok())
                        .ok_or_else(|| Self::type_error(function, "access chain index is not an int"))?;
                    p.path.push(index);
                }
                Value::Pointer(p)
            }
            Op::Binary { op, lhs, rhs } => {
                let (a, b) = (get(self, lhs)?, get(self, rhs)?);
                let lhs_matrix = module
                    .operand_type(function, frame.value_types, *lhs)
                    .and_then(|t| module.types.get(t))
                    .is_some_and(|t| matches!(t, IrType::Matrix { .. }));
                if *op == BinOp::Mul && lhs_matrix {
                    matrix_multiply(&a, &b).ok_or_else(|| Self::type_error(function, "matrix product shape"))?
                } else {
                    binary(*op, &a, &b).ok_or_else(|| {
                        Self::type_error(function, format!("cannot apply '{}' to {a:?} and {b:?}", op.as_str()))
                    })?
                }
            }
            Op::Unary { op, operand } => {
                let a = get(self, operand)?;
                unary(*op, &a).ok_or_else(|| Self::type_error(function, "bad unary operand"))?
            }
            Op::Select {
                condition,
                accept,
                reject,
            } => {
                let (c, a, r) = (get(self, condition)?, get(self, accept)?, get(self, reject)?);
                match (&c, &a, &r) {
                    (Value::Bool(c), _, _) => {
                        if *c {
                            a
                        } else {
                            r
                        }
                    }
                    (Value::Composite(cs), Value::Composite(xs), Value::Composite(ys)) => Value::Composite(
                        cs.iter()
                            .zip(xs.iter().zip(ys))
                            .map(|(c, (x, y))| if c.as_bool() == Some(true) { x.clone() } else { y.clone() })
                            .collect(),
                    ),
                    _ => return Err(Self::type_error(function, "bad select operands")),
                }
            }
            Op::Call { function: callee, args } => {
                let args = args.iter().map(|a| get(self, a)).collect::<Result<Vec<_>, _>>()?;
                self.call(*callee, args)?.unwrap_or(Value::Void)
            }
            Op::Intrinsic { name, args } => {
                let args = args.iter().map(|a| get(self, a)).collect::<Result<Vec<_>, _>>()?;
                self.handler.call(name, &args)?.unwrap_or(Value::Void)
            }
            Op::Construct { components } => {
                let parts = components.iter().map(|a| get(self, a)).collect::<Result<Vec<_>, _>>()?;
                let is_vector = ty.and_then(|t| module.types.get(t)).is_some_and(|t| matches!(t, IrType::Vector { .. }));
                if is_vector {
                    let mut flat = Vec::new();
                    for part in parts {
                        match part {
                            Value::Composite(inner) => flat.extend(inner),
                            scalar => flat.push(scalar),
                        }
                    }
                    Value::Composite(flat)
                } else {
                    Value::Composite(parts)
                }
            }
            Op::Extract { composite, indices } => {
                let mut value = get(self, composite)?;
                for &index in indices {
                    value = match value {
                        Value::Composite(mut parts) if (index as usize) < parts.len() => parts.swap_remove(index as usize),
                        _ => return Err(Self::type_error(function, "extract out of range")),
                    };
                }
                value
            }
            Op::Shuffle { vector, components } => {
                let value = get(self, vector)?;
                let parts = match value {
                    Value::Composite(parts) => parts,
                    scalar => vec![scalar],
                };
                let picked = components
                    .iter()
                    .map(|&c| parts.get(c as usize).cloned())
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| Self::type_error(function, "swizzle out of range"))?;
                if picked.len() == 1 {
                    picked.into_iter().next().unwrap_or(Value::Void)
                } else {
                    Value::Composite(picked)
                }
            }
            Op::Convert { operand } => {
                let value = get(self, operand)?;
                let kind = ty
                    .and_then(|t| module.types.scalar_kind(t))
                    .ok_or_else(|| Self::type_error(function, "conversion to non-numeric type"))?;
                convert(&value, kind).ok_or_else(|| Self::type_error(function, "bad conversion"))?
            }
            Op::Sample {
                sampled_image,
                coordinate,
            } => {
                let args = [get(self, sampled_image)?, get(self, coordinate)?];
                self.handler.call("texture", &args)?.unwrap_or(Value::Void)
            }
        })
    }
}

fn scalar(value: &ConstValue) -> Value {
    match value {
        ConstValue::Bool(b) => Value::Bool(*b),
        ConstValue::Int(i) => Value::Int(*i),
        ConstValue::Float(f) => Value::Float(f.0),
        ConstValue::Composite(_) => Value::Void,
    }
}

fn const_value(module: &IrModule, id: crate::constant::ConstId) -> Option<Value> {
    let constant = module.constants.get(id)?;
    Some(match &constant.value {
        ConstValue::Composite(parts) => {
            Value::Composite(parts.iter().map(|p| const_value(module, *p)).collect::<Option<_>>()?)
        }
        other => scalar(other),
    })
}

/// Zero value of a type.
pub fn zero_value(module: &IrModule, ty: TypeId) -> Value {
    let types = &module.types;
    match types.get(ty) {
        Some(IrType::Bool) => Value::Bool(false),
        Some(IrType::Int) => Value::Int(0),
        Some(IrType::Float) => Value::Float(0.0),
        Some(IrType::Vector { component, count }) => {
            Value::Composite((0..*count).map(|_| zero_value(module, *component)).collect())
        }
        Some(IrType::Matrix { column, columns }) => {
            Value::Composite((0..*columns).map(|_| zero_value(module, *column)).collect())
        }
        Some(IrType::Array { element, length }) => {
            Value::Composite((0..*length).map(|_| zero_value(module, *element)).collect())
        }
        Some(IrType::Struct { members, .. }) => {
            Value::Composite(members.iter().map(|m| zero_value(module, m.ty)).collect())
        }
        _ => Value::Void,
    }
}

fn componentwise(a: &Value, b: &Value, f: &dyn Fn(&Value, &Value) -> Option<Value>) -> Option<Value> {
    match (a, b) {
        (Value::Composite(xs), Value::Composite(ys)) if xs.len() == ys.len() => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| componentwise(x, y, f))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        (Value::Composite(xs), y) => xs
            .iter()
            .map(|x| componentwise(x, y, f))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        (x, Value::Composite(ys)) => ys
            .iter()
            .map(|y| componentwise(x, y, f))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        (x, y) => f(x, y),
    }
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Option<Value> {
    componentwise(a, b, &|x, y| scalar_binary(op, x, y))
}

fn scalar_binary(op: BinOp, a: &Value, b: &Value) -> Option<Value> {
    use BinOp::*;
    Some(match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let (x, y) = (*x, *y);
            match op {
                Add => Value::Int(x.wrapping_add(y)),
                Sub => Value::Int(x.wrapping_sub(y)),
                Mul => Value::Int(x.wrapping_mul(y)),
                Div => Value::Int(x.checked_div(y)?),
                Rem => Value::Int(x.checked_rem(y)?),
                Shl => Value::Int(x.wrapping_shl(y as u32)),
                Shr => Value::Int(x.wrapping_shr(y as u32)),
                BitAnd => Value::Int(x & y),
                BitOr => Value::Int(x | y),
                BitXor => Value::Int(x ^ y),
                Eq => Value::Bool(x == y),
                Ne => Value::Bool(x != y),
                Lt => Value::Bool(x < y),
                Le => Value::Bool(x <= y),
                Gt => Value::Bool(x > y),
                Ge => Value::Bool(x >= y),
                LogicalAnd | LogicalOr => return None,
            }
        }
        (Value::Float(x), Value::Float(y)) => {
            let (x, y) = (*x, *y);
            match op {
                Add => Value::Float(x + y),
                Sub => Value::Float(x - y),
                Mul => Value::Float(x * y),
                Div => Value::Float(x / y),
                Rem => Value::Float(x - y * (x / y).floor()),
                Eq => Value::Bool(x == y),
                Ne => Value::Bool(x != y),
                Lt => Value::Bool(x < y),
                Le => Value::Bool(x <= y),
                Gt => Value::Bool(x > y),
                Ge => Value::Bool(x >= y),
                _ => return None,
            }
        }
        (Value::Bool(x), Value::Bool(y)) => match op {
            LogicalAnd | BitAnd => Value::Bool(*x && *y),
            LogicalOr | BitOr => Value::Bool(*x || *y),
            BitXor => Value::Bool(x != y),
            Eq => Value::Bool(x == y),
            Ne => Value::Bool(x != y),
            _ => return None,
        },
        _ => return None,
    })
}

fn unary(op: UnOp, a: &Value) -> Option<Value> {
    match a {
        Value::Composite(parts) => parts
            .iter()
            .map(|p| unary(op, p))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        Value::Int(x) => match op {
            UnOp::Neg => Some(Value::Int(x.wrapping_neg())),
            UnOp::BitNot => Some(Value::Int(!x)),
            UnOp::Not => None,
        },
        Value::Float(x) => match op {
            UnOp::Neg => Some(Value::Float(-x)),
            _ => None,
        },
        Value::Bool(x) => match op {
            UnOp::Not => Some(Value::Bool(!x)),
            _ => None,
        },
        _ => None,
    }
}

fn convert(value: &Value, kind: ScalarKind) -> Option<Value> {
    Some(match (value, kind) {
        (Value::Composite(parts), _) => Value::Composite(
            parts
                .iter()
                .map(|p| convert(p, kind))
                .collect::<Option<Vec<_>>>()?,
        ),
        (Value::Int(x), ScalarKind::Float) => Value::Float(*x as f32),
        (Value::Float(x), ScalarKind::Int) => Value::Int(*x as i32),
        (Value::Bool(x), ScalarKind::Int) => Value::Int(*x as i32),
        (Value::Bool(x), ScalarKind::Float) => Value::Float(if *x { 1.0 } else { 0.0 }),
        (Value::Int(x), ScalarKind::Bool) => Value::Bool(*x != 0),
        (Value::Float(x), ScalarKind::Bool) => Value::Bool(*x != 0.0),
        (same, _) => same.clone(),
    })
}

/// Column-major matrix times vector or matrix.
fn matrix_multiply(m: &Value, rhs: &Value) -> Option<Value> {
    let Value::Composite(columns) = m else {
        return None;
    };
    let columns: Vec<Vec<f32>> = columns.iter().map(Value::as_floats).collect::<Option<_>>()?;
    let rows = columns.first()?.len();
    let times_vector = |v: &[f32]| -> Option<Value> {
        if v.len() != columns.len() {
            return None;
        }
        let out: Vec<f32> = (0..rows)
            .map(|r| columns.iter().zip(v).map(|(c, x)| c[r] * x).sum())
            .collect();
        Some(Value::vector(&out))
    };
    match rhs {
        Value::Float(s) => Some(Value::Composite(
            columns
                .iter()
                .map(|c| Value::vector(&c.iter().map(|x| x * s).collect::<Vec<_>>()))
                .collect(),
        )),
        Value::Composite(parts) if parts.iter().all(|p| matches!(p, Value::Float(_))) => {
            times_vector(&rhs.as_floats()?)
        }
        Value::Composite(parts) => parts
            .iter()
            .map(|column| times_vector(&column.as_floats()?))
            .collect::<Option<Vec<_>>>()
            .map(Value::Composite),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FunctionBuilder, ShortCircuit};
    use crate::error::IrError;
    use crate::function::{FunctionParam, MergeInfo};
    use crate::module::{Decorations, EntryPoint};
    use crate::types::{ShaderStage, StorageClass, StructMember};

    /// Counts calls to `tick`, which returns true.
    #[derive(Default)]
    struct Counter {
        ticks: u32,
    }

    impl IntrinsicHandler for Counter {
        fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
            match name {
                "tick" => {
                    self.ticks += 1;
                    Ok(Some(Value::Bool(true)))
                }
                _ => BasicIntrinsics.call(name, args),
            }
        }
    }

    fn short_circuit_module(kind: ShortCircuit) -> IrModule {
        let mut module = IrModule::new();
        let boolean = module.types.bool();
        let f = module.declare_function(
            "test",
            boolean,
            vec![FunctionParam {
                name: "lhs".into(),
                ty: boolean,
            }],
        );
        let mut b = FunctionBuilder::new(&mut module, f).unwrap();
        let result = b
            .short_circuit::<IrError>(kind, Operand::Param(0), |b| {
                let bool_ty = b.module().types.bool();
                b.intrinsic("tick", Vec::new(), Some(bool_ty))?
                    .ok_or_else(|| IrError::Builder("tick has no value".into()))
            })
            .unwrap();
        b.ret_value(result).unwrap();
        b.finish();
        module
    }

    fn run_short_circuit(kind: ShortCircuit, lhs: bool) -> (bool, u32) {
        let module = short_circuit_module(kind);
        let mut eval = Evaluator::new(&module, Counter::default());
        let result = eval.call_named("test", vec![Value::Bool(lhs)]).unwrap();
        (result.and_then(|v| v.as_bool()).unwrap(), eval.into_handler().ticks)
    }

    #[test]
    fn and_skips_rhs_when_lhs_false() {
        assert_eq!(run_short_circuit(ShortCircuit::And, false), (false, 0));
        assert_eq!(run_short_circuit(ShortCircuit::And, true), (true, 1));
    }

    #[test]
    fn or_skips_rhs_when_lhs_true() {
        assert_eq!(run_short_circuit(ShortCircuit::Or, true), (true, 0));
        assert_eq!(run_short_circuit(ShortCircuit::Or, false), (true, 1));
    }

    #[test]
    fn canonical_loop_sums() {
        let mut module = IrModule::new();
        let int = module.types.int();
        let f = module.declare_function(
            "sum",
            int,
            vec![FunctionParam {
                name: "n".into(),
                ty: int,
            }],
        );
        let mut b = FunctionBuilder::new(&mut module, f).unwrap();
        let zero = b.const_int(0);
        let one = b.const_int(1);
        let i = b.variable(int, Some(zero)).unwrap();
        let total = b.variable(int, Some(zero)).unwrap();
        let header = b.create_block();
        let check = b.create_block();
        let body = b.create_block();
        let cont = b.create_block();
        let merge = b.create_block();
        b.branch(header).unwrap();
        b.switch_to(header);
        b.set_merge(
            header,
            MergeInfo::Loop {
                merge,
                continue_target: cont,
            },
        );
        b.branch(check).unwrap();
        b.switch_to(check);
        let iv = b.load(i).unwrap();
        let c = b.binary(BinOp::Lt, iv, Operand::Param(0), None).unwrap();
        b.cond_branch(c, body, merge).unwrap();
        b.switch_to(body);
        let tv = b.load(total).unwrap();
        let iv = b.load(i).unwrap();
        let sum = b.binary(BinOp::Add, tv, iv, None).unwrap();
        b.store(total, sum).unwrap();
        b.branch(cont).unwrap();
        b.switch_to(cont);
        let iv = b.load(i).unwrap();
        let next = b.binary(BinOp::Add, iv, one, None).unwrap();
        b.store(i, next).unwrap();
        b.branch(header).unwrap();
        b.switch_to(merge);
        let result = b.load(total).unwrap();
        b.ret_value(result).unwrap();
        b.finish();

        let mut eval = Evaluator::new(&module, BasicIntrinsics);
        let result = eval.call_named("sum", vec![Value::Int(5)]).unwrap();
        assert_eq!(result, Some(Value::Int(10)));
    }

    #[test]
    fn globals_are_seeded_and_read() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let float = module.types.float();
        let block = module.types.intern(IrType::Struct {
            name: "Inputs".into(),
            members: vec![
                StructMember {
                    name: "a".into(),
                    ty: float,
                    offset: None,
                },
                StructMember {
                    name: "b".into(),
                    ty: float,
                    offset: None,
                },
            ],
        });
        let input = module.add_global("In", block, StorageClass::Input, Decorations::default());
        let output = module.add_global("Out", float, StorageClass::Output, Decorations::default());
        let main = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, main).unwrap();
        let one = b.const_int(1);
        let ptr = b.access_chain(Operand::Global(input), vec![one]).unwrap();
        let value = b.load(ptr).unwrap();
        let doubled = b.binary(BinOp::Mul, value, value, None).unwrap();
        b.store(Operand::Global(output), doubled).unwrap();
        b.ret().unwrap();
        b.finish();
        module.entry_points.push(EntryPoint {
            name: "main".into(),
            stage: ShaderStage::Pixel,
            function: main,
            interface: vec![input, output],
        });

        let mut eval = Evaluator::new(&module, BasicIntrinsics);
        eval.set_global("In", Value::vector(&[2.0, 3.0])).unwrap();
        eval.run_entry().unwrap();
        assert_eq!(eval.global("Out"), Some(&Value::Float(9.0)));
    }

    #[test]
    fn infinite_loop_hits_step_limit() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let f = module.declare_function("spin", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, f).unwrap();
        let header = b.create_block();
        b.branch(header).unwrap();
        b.switch_to(header);
        b.branch(header).unwrap();
        b.finish();
        let mut eval = Evaluator::new(&module, BasicIntrinsics).with_step_limit(100);
        assert_eq!(eval.call_named("spin", Vec::new()), Err(EvalError::StepLimit(100)));
    }

    #[test]
    fn matrix_times_vector() {
        let identity = Value::Composite(vec![
            Value::vector(&[2.0, 0.0]),
            Value::vector(&[0.0, 3.0]),
        ]);
        let v = Value::vector(&[1.0, 1.0]);
        assert_eq!(matrix_multiply(&identity, &v), Some(Value::vector(&[2.0, 3.0])));
    }
}
