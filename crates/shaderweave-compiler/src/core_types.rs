//! Built-in shader types and the `Math` intrinsic table.
//!
//! [`ShaderType`] is the semantic type of every field, local and
//! expression in fragment code. Fragment-language spellings (`Real3`,
//! `Real4x4`, `FixedArray[Real, 4]`) map onto it through [`resolve_type`]
//! and [`ShaderType::from_name`].

use std::fmt;

use shaderweave_core::{CompileError, Span};
use shaderweave_ir::{ImageDim, IrType, ScalarKind, TypeId, TypeTable};
use shaderweave_parser::ast::{TypeArg, TypeExpr};

use crate::settings::{Primitive, ShaderSettings};

/// Name of the static intrinsic namespace.
pub const MATH_TYPE: &str = "Math";

/// Name of the generic fixed-size array type.
pub const FIXED_ARRAY: &str = "FixedArray";

// ============================================================================
// Types
// ============================================================================

/// Scalar component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Real,
    Integer,
    Boolean,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Real => "Real",
            ScalarType::Integer => "Integer",
            ScalarType::Boolean => "Boolean",
        }
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarType::Real => ScalarKind::Float,
            ScalarType::Integer => ScalarKind::Int,
            ScalarType::Boolean => ScalarKind::Bool,
        }
    }

    fn from_prefix(name: &str) -> Option<(ScalarType, &str)> {
        [ScalarType::Real, ScalarType::Integer, ScalarType::Boolean]
            .into_iter()
            .find_map(|s| name.strip_prefix(s.as_str()).map(|rest| (s, rest)))
    }
}

/// A geometry stream type: `TriangleInput[T]`, `LineOutput[T]`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamInfo {
    /// Declared generic name, e.g. `TriangleInput`.
    pub name: String,
    pub primitive: Primitive,
    pub is_output: bool,
    pub element: Box<ShaderType>,
}

/// Semantic type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Void,
    Scalar(ScalarType),
    /// Vector of 2 to 4 components.
    Vector(ScalarType, u8),
    /// `Real{columns}x{rows}`.
    Matrix(u8, u8),
    Array(Box<ShaderType>, u32),
    /// A fragment or helper struct by name.
    Struct(String),
    Sampler,
    Image2d,
    StorageImage2d,
    SampledImage2d,
    Stream(StreamInfo),
}

impl ShaderType {
    pub const REAL: ShaderType = ShaderType::Scalar(ScalarType::Real);
    pub const INTEGER: ShaderType = ShaderType::Scalar(ScalarType::Integer);
    pub const BOOLEAN: ShaderType = ShaderType::Scalar(ScalarType::Boolean);

    /// Vector or scalar of `count` components.
    pub fn vector(scalar: ScalarType, count: u8) -> ShaderType {
        if count <= 1 {
            ShaderType::Scalar(scalar)
        } else {
            ShaderType::Vector(scalar, count)
        }
    }

    /// Parse a built-in, non-generic type name. Struct names return `None`.
    pub fn from_name(name: &str) -> Option<ShaderType> {
        match name {
            "Void" => return Some(ShaderType::Void),
            "Sampler" => return Some(ShaderType::Sampler),
            "Image2d" => return Some(ShaderType::Image2d),
            "StorageImage2d" => return Some(ShaderType::StorageImage2d),
            "SampledImage2d" => return Some(ShaderType::SampledImage2d),
            _ => {}
        }
        let (scalar, rest) = ScalarType::from_prefix(name)?;
        if rest.is_empty() {
            return Some(ShaderType::Scalar(scalar));
        }
        let dimension = |text: &str| text.parse::<u8>().ok().filter(|n| (2..=4).contains(n));
        match rest.split_once('x') {
            None => dimension(rest).map(|n| ShaderType::Vector(scalar, n)),
            Some((columns, rows)) if scalar == ScalarType::Real => {
                Some(ShaderType::Matrix(dimension(columns)?, dimension(rows)?))
            }
            Some(_) => None,
        }
    }

    /// Fragment-language spelling.
    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ShaderType::Void)
    }

    /// Samplers and images. They cannot live in structs or uniform blocks.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            ShaderType::Sampler
                | ShaderType::Image2d
                | ShaderType::StorageImage2d
                | ShaderType::SampledImage2d
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, ShaderType::Struct(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, ShaderType::Vector(..))
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, ShaderType::Matrix(..))
    }

    /// Component scalar of scalars, vectors and matrices.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            ShaderType::Scalar(s) | ShaderType::Vector(s, _) => Some(*s),
            ShaderType::Matrix(..) => Some(ScalarType::Real),
            _ => None,
        }
    }

    /// Number of scalar components; matrices count every element.
    pub fn component_count(&self) -> Option<u32> {
        match self {
            ShaderType::Scalar(_) => Some(1),
            ShaderType::Vector(_, n) => Some(u32::from(*n)),
            ShaderType::Matrix(c, r) => Some(u32::from(*c) * u32::from(*r)),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.scalar(),
            Some(ScalarType::Real | ScalarType::Integer)
        )
    }

    /// The same shape with a different scalar.
    pub fn with_scalar(&self, scalar: ScalarType) -> ShaderType {
        match self {
            ShaderType::Vector(_, n) => ShaderType::Vector(scalar, *n),
            _ => ShaderType::Scalar(scalar),
        }
    }

    /// Element type of indexable values.
    pub fn element(&self) -> Option<ShaderType> {
        match self {
            ShaderType::Array(element, _) => Some((**element).clone()),
            ShaderType::Vector(s, _) => Some(ShaderType::Scalar(*s)),
            ShaderType::Matrix(_, rows) => Some(ShaderType::Vector(ScalarType::Real, *rows)),
            ShaderType::Stream(stream) if !stream.is_output => Some((*stream.element).clone()),
            _ => None,
        }
    }

    /// Whether a value of `self` may be stored where `target` is expected.
    /// Integers widen to reals.
    pub fn converts_to(&self, target: &ShaderType) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (ShaderType::Scalar(ScalarType::Integer), ShaderType::Scalar(ScalarType::Real)) => true,
            (ShaderType::Vector(ScalarType::Integer, a), ShaderType::Vector(ScalarType::Real, b)) => a == b,
            _ => false,
        }
    }

    /// Intern the IR form of this type. Struct types are looked up through
    /// `structs`; streams and opaque handles that have no value form return
    /// `None`.
    pub fn to_ir(
        &self,
        types: &mut TypeTable,
        structs: &dyn Fn(&str) -> Option<TypeId>,
    ) -> Option<TypeId> {
        Some(match self {
            ShaderType::Void => types.void(),
            ShaderType::Scalar(s) => types.scalar(s.kind()),
            ShaderType::Vector(s, n) => types.vector(s.kind(), u32::from(*n)),
            ShaderType::Matrix(c, r) => types.matrix(u32::from(*c), u32::from(*r)),
            ShaderType::Array(element, length) => {
                let element = element.to_ir(types, structs)?;
                types.intern(IrType::Array {
                    element,
                    length: *length,
                })
            }
            ShaderType::Struct(name) => structs(name)?,
            ShaderType::Sampler => types.intern(IrType::Sampler),
            ShaderType::Image2d => types.intern(IrType::Image {
                dim: ImageDim::D2,
                sampled: true,
            }),
            ShaderType::StorageImage2d => types.intern(IrType::Image {
                dim: ImageDim::D2,
                sampled: false,
            }),
            ShaderType::SampledImage2d => {
                let image = types.intern(IrType::Image {
                    dim: ImageDim::D2,
                    sampled: true,
                });
                types.intern(IrType::SampledImage { image })
            }
            ShaderType::Stream(stream) if !stream.is_output => {
                let element = stream.element.to_ir(types, structs)?;
                types.intern(IrType::Array {
                    element,
                    length: stream.primitive.vertex_count(),
                })
            }
            ShaderType::Stream(_) => return None,
        })
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderType::Void => f.write_str("Void"),
            ShaderType::Scalar(s) => f.write_str(s.as_str()),
            ShaderType::Vector(s, n) => write!(f, "{}{n}", s.as_str()),
            ShaderType::Matrix(c, r) => write!(f, "Real{c}x{r}"),
            ShaderType::Array(element, length) => write!(f, "{FIXED_ARRAY}[{element}, {length}]"),
            ShaderType::Struct(name) => f.write_str(name),
            ShaderType::Sampler => f.write_str("Sampler"),
            ShaderType::Image2d => f.write_str("Image2d"),
            ShaderType::StorageImage2d => f.write_str("StorageImage2d"),
            ShaderType::SampledImage2d => f.write_str("SampledImage2d"),
            ShaderType::Stream(stream) => write!(f, "{}[{}]", stream.name, stream.element),
        }
    }
}

/// Resolve a written type. `is_struct` answers whether a name is a struct
/// known to the library.
pub fn resolve_type(
    expr: &TypeExpr<'_>,
    settings: &ShaderSettings,
    is_struct: &dyn Fn(&str) -> bool,
) -> Result<ShaderType, CompileError> {
    resolve_generic(expr.name.name, expr.args, expr.span, settings, is_struct)
}

/// Resolve a type from its name and generic arguments.
pub fn resolve_generic(
    name: &str,
    args: &[TypeArg<'_>],
    span: Span,
    settings: &ShaderSettings,
    is_struct: &dyn Fn(&str) -> bool,
) -> Result<ShaderType, CompileError> {
    let unknown = || CompileError::UnknownType {
        name: name.to_string(),
        span,
    };

    if args.is_empty() {
        if let Some(ty) = ShaderType::from_name(name) {
            return Ok(ty);
        }
        if is_struct(name) {
            return Ok(ShaderType::Struct(name.to_string()));
        }
        return Err(unknown());
    }

    if name == FIXED_ARRAY {
        return match args {
            [TypeArg::Type(element), TypeArg::Int(length, _)] if *length > 0 => {
                let element = resolve_type(element, settings, is_struct)?;
                Ok(ShaderType::Array(Box::new(element), *length as u32))
            }
            _ => Err(CompileError::TypeMismatch {
                message: format!("{FIXED_ARRAY} takes an element type and a positive length"),
                span,
            }),
        };
    }

    if let Some(stream) = settings.find_stream(name) {
        return match args {
            [TypeArg::Type(element)] => {
                let element = resolve_type(element, settings, is_struct)?;
                Ok(ShaderType::Stream(StreamInfo {
                    name: stream.name.clone(),
                    primitive: stream.primitive,
                    is_output: stream.is_output,
                    element: Box::new(element),
                }))
            }
            _ => Err(CompileError::TypeMismatch {
                message: format!("stream type '{name}' takes one element type"),
                span,
            }),
        };
    }

    Err(unknown())
}

// ============================================================================
// Math intrinsics
// ============================================================================

/// How an intrinsic's result type follows from its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnRule {
    /// Type of the first argument.
    First,
    /// Type of the last argument.
    Last,
    /// Component scalar of the first argument.
    Scalar,
    /// Matrix times vector.
    MatrixVector,
}

/// A `Math.*` function with a direct target counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intrinsic {
    /// Fragment-language name.
    pub name: &'static str,
    /// Target-language name.
    pub target: &'static str,
    pub arity: usize,
    pub returns: ReturnRule,
}

const fn intrinsic(name: &'static str, target: &'static str, arity: usize, returns: ReturnRule) -> Intrinsic {
    Intrinsic {
        name,
        target,
        arity,
        returns,
    }
}

/// Every `Math` function.
pub const MATH_INTRINSICS: &[Intrinsic] = &[
    intrinsic("Abs", "abs", 1, ReturnRule::First),
    intrinsic("Ceil", "ceil", 1, ReturnRule::First),
    intrinsic("Clamp", "clamp", 3, ReturnRule::First),
    intrinsic("Cos", "cos", 1, ReturnRule::First),
    intrinsic("Cross", "cross", 2, ReturnRule::First),
    intrinsic("Distance", "distance", 2, ReturnRule::Scalar),
    intrinsic("Dot", "dot", 2, ReturnRule::Scalar),
    intrinsic("Floor", "floor", 1, ReturnRule::First),
    intrinsic("Frac", "fract", 1, ReturnRule::First),
    intrinsic("Length", "length", 1, ReturnRule::Scalar),
    intrinsic("Lerp", "mix", 3, ReturnRule::First),
    intrinsic("Max", "max", 2, ReturnRule::First),
    intrinsic("Min", "min", 2, ReturnRule::First),
    intrinsic("Multiply", "*", 2, ReturnRule::MatrixVector),
    intrinsic("Normalize", "normalize", 1, ReturnRule::First),
    intrinsic("Pow", "pow", 2, ReturnRule::First),
    intrinsic("Reflect", "reflect", 2, ReturnRule::First),
    intrinsic("Saturate", "clamp", 1, ReturnRule::First),
    intrinsic("Sin", "sin", 1, ReturnRule::First),
    intrinsic("SmoothStep", "smoothstep", 3, ReturnRule::Last),
    intrinsic("Sqrt", "sqrt", 1, ReturnRule::First),
    intrinsic("Step", "step", 2, ReturnRule::Last),
];

/// Look up a `Math` function by name and argument count.
pub fn find_intrinsic(name: &str, arity: usize) -> Option<&'static Intrinsic> {
    MATH_INTRINSICS
        .iter()
        .find(|i| i.name == name && i.arity == arity)
}

impl Intrinsic {
    /// Result type for the given argument types.
    pub fn result_type(&self, args: &[ShaderType]) -> Option<ShaderType> {
        match self.returns {
            ReturnRule::First => args.first().cloned(),
            ReturnRule::Last => args.last().cloned(),
            ReturnRule::Scalar => args.first()?.scalar().map(ShaderType::Scalar),
            ReturnRule::MatrixVector => match args {
                [ShaderType::Matrix(_, rows), ShaderType::Vector(..)] => {
                    Some(ShaderType::Vector(ScalarType::Real, *rows))
                }
                [lhs, _] => Some(lhs.clone()),
                _ => None,
            },
        }
    }
}

/// Method names on opaque and stream types.
pub mod methods {
    /// `SampledImage2d.Sample(uv)`.
    pub const SAMPLE: &str = "Sample";
    /// `output.Append(vertex, index)` on geometry output streams.
    pub const APPEND: &str = "Append";
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use shaderweave_parser::Parser;

    #[test]
    fn builtin_names_round_trip() {
        for name in ["Real", "Integer3", "Boolean2", "Real4x4", "Real3x2", "SampledImage2d"] {
            let ty = ShaderType::from_name(name).unwrap();
            assert_eq!(ty.name(), name);
        }
        assert_eq!(ShaderType::from_name("Real5"), None);
        assert_eq!(ShaderType::from_name("Integer2x2"), None);
        assert_eq!(ShaderType::from_name("Surface"), None);
    }

    #[test]
    fn resolve_generic_types() {
        let arena = Bump::new();
        let settings = ShaderSettings::default();
        let script = Parser::parse(
            "struct S { var A : FixedArray[Real3, 4]; var B : TriangleInput[V]; var C : Missing; }",
            &arena,
        )
        .unwrap();
        let fields: Vec<_> = script.types()[0]
            .members
            .iter()
            .filter_map(|m| match m {
                shaderweave_parser::ast::Member::Field(f) => Some(f.ty),
                _ => None,
            })
            .collect();
        let is_struct = |name: &str| name == "V";

        let array = resolve_type(&fields[0], &settings, &is_struct).unwrap();
        assert_eq!(array.name(), "FixedArray[Real3, 4]");
        assert_eq!(array.element(), Some(ShaderType::Vector(ScalarType::Real, 3)));

        let stream = resolve_type(&fields[1], &settings, &is_struct).unwrap();
        match &stream {
            ShaderType::Stream(info) => {
                assert_eq!(info.primitive, Primitive::Triangle);
                assert!(!info.is_output);
            }
            other => panic!("expected stream, got {other:?}"),
        }
        assert_eq!(stream.element(), Some(ShaderType::Struct("V".into())));

        assert!(matches!(
            resolve_type(&fields[2], &settings, &is_struct),
            Err(CompileError::UnknownType { .. })
        ));
    }

    #[test]
    fn intrinsic_results() {
        let real3 = ShaderType::Vector(ScalarType::Real, 3);
        let dot = find_intrinsic("Dot", 2).unwrap();
        assert_eq!(dot.result_type(&[real3.clone(), real3.clone()]), Some(ShaderType::REAL));
        let step = find_intrinsic("Step", 2).unwrap();
        assert_eq!(step.result_type(&[ShaderType::REAL, real3.clone()]), Some(real3.clone()));
        let multiply = find_intrinsic("Multiply", 2).unwrap();
        let result = multiply.result_type(&[ShaderType::Matrix(4, 3), ShaderType::Vector(ScalarType::Real, 4)]);
        assert_eq!(result, Some(real3));
        assert!(find_intrinsic("Dot", 3).is_none());
    }

    #[test]
    fn ir_types() {
        let mut types = TypeTable::new();
        let none = |_: &str| None;
        let real3 = ShaderType::Vector(ScalarType::Real, 3).to_ir(&mut types, &none).unwrap();
        assert_eq!(types.component_count(real3), Some(3));
        let stream = ShaderType::Stream(StreamInfo {
            name: "TriangleInput".into(),
            primitive: Primitive::Triangle,
            is_output: false,
            element: Box::new(ShaderType::REAL),
        });
        let array = stream.to_ir(&mut types, &none).unwrap();
        assert!(matches!(types.get(array), Some(IrType::Array { length: 3, .. })));
        assert!(ShaderType::Struct("Missing".into()).to_ir(&mut types, &none).is_none());
    }
}
