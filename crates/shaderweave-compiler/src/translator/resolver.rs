//! Symbol resolvers.
//!
//! The translator emits fragment-language symbols verbatim unless the
//! registry holds a resolver for them. A resolver either renames the
//! symbol or rewrites the whole use from the already translated operand
//! texts, which is how comparisons on vectors become `lessThan(a, b)`.

use std::fmt;

use rustc_hash::FxHashMap;
use shaderweave_parser::ast::{BinaryOp, UnaryOp};

use crate::core_types::{MATH_INTRINSICS, MATH_TYPE, ScalarType, ShaderType, methods};

/// Rewrites a use from its translated operand texts.
pub type ResolverFn = fn(&[String]) -> String;

/// What a resolver is looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolKey {
    /// A type name.
    Type(String),
    /// `type.member`.
    Member(String, String),
    /// `type.name(...)` with the given argument count.
    Function(String, String, usize),
    /// `left op right`, by operand type names.
    Operator(String, BinaryOp, String),
    /// `op operand`.
    Unary(UnaryOp, String),
    /// `type(...)` with the given argument count.
    Constructor(String, usize),
}

#[derive(Clone)]
pub enum Resolver {
    /// Replace the symbol's name.
    Inline(String),
    /// Replace the whole use.
    Callback(ResolverFn),
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Inline(name) => f.debug_tuple("Inline").field(name).finish(),
            Resolver::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl Resolver {
    /// Apply to a call-like use: an inline resolver becomes the callee.
    pub fn apply(&self, args: &[String]) -> String {
        match self {
            Resolver::Inline(name) => format!("{name}({})", args.join(", ")),
            Resolver::Callback(callback) => callback(args),
        }
    }
}

/// Resolvers by symbol.
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    entries: FxHashMap<SymbolKey, Resolver>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver`, returning the one it replaced.
    pub fn register(&mut self, key: SymbolKey, resolver: Resolver) -> Option<Resolver> {
        self.entries.insert(key, resolver)
    }

    pub fn get(&self, key: &SymbolKey) -> Option<&Resolver> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target spelling of a type name.
    pub fn type_name(&self, ty: &ShaderType) -> String {
        match ty {
            ShaderType::Array(element, _) => self.type_name(element),
            ShaderType::Stream(stream) => self.type_name(&stream.element),
            _ => {
                let name = ty.name();
                match self.get(&SymbolKey::Type(name.clone())) {
                    Some(Resolver::Inline(target)) => target.clone(),
                    Some(Resolver::Callback(callback)) => callback(&[name]),
                    None => name,
                }
            }
        }
    }

    /// A declaration of `name` with type `ty`; arrays put their length on
    /// the declarator.
    pub fn declare(&self, ty: &ShaderType, name: &str) -> String {
        match ty {
            ShaderType::Array(_, length) => format!("{} {name}[{length}]", self.type_name(ty)),
            ShaderType::Stream(stream) if !stream.is_output => {
                format!("{} {name}[{}]", self.type_name(ty), stream.primitive.vertex_count())
            }
            _ => format!("{} {name}", self.type_name(ty)),
        }
    }

    /// The default GLSL-flavoured registry.
    pub fn glsl() -> Self {
        let mut registry = Self::new();
        registry.register_glsl_types();
        registry.register_glsl_math();
        registry.register_glsl_operators();
        registry.register(
            SymbolKey::Function(ShaderType::SampledImage2d.name(), methods::SAMPLE.to_string(), 1),
            Resolver::Inline("texture".into()),
        );
        registry
    }

    fn register_glsl_types(&mut self) {
        let mut ty = |from: String, to: &str| {
            self.register(SymbolKey::Type(from), Resolver::Inline(to.to_string()));
        };
        ty("Void".into(), "void");
        ty("Real".into(), "float");
        ty("Integer".into(), "int");
        ty("Boolean".into(), "bool");
        for n in 2..=4u8 {
            ty(format!("Real{n}"), &format!("vec{n}"));
            ty(format!("Integer{n}"), &format!("ivec{n}"));
            ty(format!("Boolean{n}"), &format!("bvec{n}"));
            for m in 2..=4u8 {
                let target = if n == m { format!("mat{n}") } else { format!("mat{n}x{m}") };
                ty(format!("Real{n}x{m}"), &target);
            }
        }
        ty("Sampler".into(), "sampler");
        ty("Image2d".into(), "texture2D");
        ty("StorageImage2d".into(), "image2D");
        ty("SampledImage2d".into(), "sampler2D");
    }

    fn register_glsl_math(&mut self) {
        for intrinsic in MATH_INTRINSICS {
            let key = SymbolKey::Function(MATH_TYPE.to_string(), intrinsic.name.to_string(), intrinsic.arity);
            let resolver = match intrinsic.name {
                "Saturate" => Resolver::Callback(|args| format!("clamp({}, 0.0, 1.0)", args[0])),
                "Multiply" => Resolver::Callback(|args| format!("({} * {})", args[0], args[1])),
                _ => Resolver::Inline(intrinsic.target.to_string()),
            };
            self.register(key, resolver);
        }
    }

    fn register_glsl_operators(&mut self) {
        let comparisons: [(BinaryOp, ResolverFn); 6] = [
            (BinaryOp::Less, |a| format!("lessThan({}, {})", a[0], a[1])),
            (BinaryOp::LessEqual, |a| format!("lessThanEqual({}, {})", a[0], a[1])),
            (BinaryOp::Greater, |a| format!("greaterThan({}, {})", a[0], a[1])),
            (BinaryOp::GreaterEqual, |a| format!("greaterThanEqual({}, {})", a[0], a[1])),
            (BinaryOp::Equal, |a| format!("equal({}, {})", a[0], a[1])),
            (BinaryOp::NotEqual, |a| format!("notEqual({}, {})", a[0], a[1])),
        ];
        let modulo: ResolverFn = |a| format!("mod({}, {})", a[0], a[1]);

        for n in 2..=4u8 {
            for scalar in [ScalarType::Real, ScalarType::Integer, ScalarType::Boolean] {
                let vector = ShaderType::Vector(scalar, n).name();
                for (op, callback) in comparisons {
                    let ordered = !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual);
                    if ordered && scalar == ScalarType::Boolean {
                        continue;
                    }
                    self.register(
                        SymbolKey::Operator(vector.clone(), op, vector.clone()),
                        Resolver::Callback(callback),
                    );
                }
            }
            let real = ShaderType::Vector(ScalarType::Real, n).name();
            self.register(
                SymbolKey::Operator(real.clone(), BinaryOp::Mod, real.clone()),
                Resolver::Callback(modulo),
            );
            self.register(
                SymbolKey::Operator(real, BinaryOp::Mod, ShaderType::REAL.name()),
                Resolver::Callback(modulo),
            );
            self.register(
                SymbolKey::Unary(UnaryOp::LogicalNot, ShaderType::Vector(ScalarType::Boolean, n).name()),
                Resolver::Callback(|a| format!("not({})", a[0])),
            );
        }
        self.register(
            SymbolKey::Operator(ShaderType::REAL.name(), BinaryOp::Mod, ShaderType::REAL.name()),
            Resolver::Callback(modulo),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_types() {
        let registry = ResolverRegistry::glsl();
        assert_eq!(registry.type_name(&ShaderType::REAL), "float");
        assert_eq!(registry.type_name(&ShaderType::Matrix(4, 4)), "mat4");
        assert_eq!(registry.type_name(&ShaderType::Matrix(3, 4)), "mat3x4");
        assert_eq!(registry.type_name(&ShaderType::Struct("Light".into())), "Light");
        assert_eq!(
            registry.declare(&ShaderType::Array(Box::new(ShaderType::INTEGER), 4), "counts"),
            "int counts[4]"
        );
    }

    #[test]
    fn operator_callbacks() {
        let registry = ResolverRegistry::glsl();
        let key = SymbolKey::Operator("Real3".into(), BinaryOp::Less, "Real3".into());
        let resolver = registry.get(&key).unwrap();
        assert_eq!(resolver.apply(&["a".into(), "b".into()]), "lessThan(a, b)");
        assert!(registry
            .get(&SymbolKey::Operator("Boolean2".into(), BinaryOp::Less, "Boolean2".into()))
            .is_none());
        let modulo = registry
            .get(&SymbolKey::Operator("Real".into(), BinaryOp::Mod, "Real".into()))
            .unwrap();
        assert_eq!(modulo.apply(&["x".into(), "2.0".into()]), "mod(x, 2.0)");
    }

    #[test]
    fn math_intrinsics() {
        let registry = ResolverRegistry::glsl();
        let saturate = registry
            .get(&SymbolKey::Function("Math".into(), "Saturate".into(), 1))
            .unwrap();
        assert_eq!(saturate.apply(&["v".into()]), "clamp(v, 0.0, 1.0)");
        let lerp = registry
            .get(&SymbolKey::Function("Math".into(), "Lerp".into(), 3))
            .unwrap();
        assert_eq!(lerp.apply(&["a".into(), "b".into(), "t".into()]), "mix(a, b, t)");
    }
}
