//! Type expressions as written in source.

use std::fmt;

use shaderweave_core::Span;

use super::Ident;

/// A type reference such as `Real3`, `FixedArray[Real, 4]` or
/// `TriangleInput[GeoIn]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeExpr<'ast> {
    /// Base type name.
    pub name: Ident<'ast>,
    /// Generic arguments, empty for plain types.
    pub args: &'ast [TypeArg<'ast>],
    /// Source location.
    pub span: Span,
}

impl<'ast> TypeExpr<'ast> {
    /// Whether the type has generic arguments.
    pub fn is_generic(&self) -> bool {
        !self.args.is_empty()
    }

    /// Canonical display name, e.g. `FixedArray[Real, 4]`.
    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.name)?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match arg {
                TypeArg::Type(ty) => write!(f, "{ty}")?,
                TypeArg::Int(value, _) => write!(f, "{value}")?,
            }
        }
        f.write_str("]")
    }
}

/// A generic argument: another type or an integer constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeArg<'ast> {
    /// A type argument.
    Type(TypeExpr<'ast>),
    /// An integer argument (array sizes).
    Int(i64, Span),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_generic() {
        let real = TypeExpr {
            name: Ident::new("Real", Span::default()),
            args: &[],
            span: Span::default(),
        };
        let args = [TypeArg::Type(real), TypeArg::Int(4, Span::default())];
        let array = TypeExpr {
            name: Ident::new("FixedArray", Span::default()),
            args: &args,
            span: Span::default(),
        };
        assert_eq!(array.display_name(), "FixedArray[Real, 4]");
        assert!(array.is_generic());
        assert_eq!(real.display_name(), "Real");
    }
}
