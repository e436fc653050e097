//! Interned constants and specialization constants.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::types::TypeId;

/// Index of a constant in a module's [`ConstantTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstId(pub u32);

impl ConstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a specialization constant in a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecConstId(pub u32);

impl SpecConstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The value of a constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Bool(bool),
    Int(i32),
    Float(OrderedFloat<f32>),
    /// Vector, matrix, array or struct built from other constants.
    Composite(Vec<ConstId>),
}

impl ConstValue {
    pub fn float(value: f32) -> Self {
        ConstValue::Float(OrderedFloat(value))
    }

    /// Whether this is a scalar value.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, ConstValue::Composite(_))
    }
}

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub ty: TypeId,
    pub value: ConstValue,
}

/// Interning table for constants.
#[derive(Debug, Clone, Default)]
pub struct ConstantTable {
    constants: Vec<Constant>,
    lookup: FxHashMap<Constant, ConstId>,
}

impl PartialEq for ConstantTable {
    fn eq(&self, other: &Self) -> bool {
        self.constants == other.constants
    }
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a constant.
    pub fn intern(&mut self, ty: TypeId, value: ConstValue) -> ConstId {
        let constant = Constant { ty, value };
        if let Some(&id) = self.lookup.get(&constant) {
            return id;
        }
        let id = ConstId(self.constants.len() as u32);
        self.constants.push(constant.clone());
        self.lookup.insert(constant, id);
        id
    }

    pub fn get(&self, id: ConstId) -> Option<&Constant> {
        self.constants.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstId, &Constant)> {
        self.constants
            .iter()
            .enumerate()
            .map(|(i, c)| (ConstId(i as u32), c))
    }
}

/// A scalar constant whose value can be overridden at pipeline creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecConstant {
    pub name: String,
    pub ty: TypeId,
    /// Host-visible specialization id.
    pub spec_id: u32,
    /// Value used when the host supplies none; always scalar.
    pub default: ConstValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_deduplicate() {
        let mut table = ConstantTable::new();
        let ty = TypeId(0);
        let a = table.intern(ty, ConstValue::float(1.5));
        let b = table.intern(ty, ConstValue::float(1.5));
        let c = table.intern(ty, ConstValue::float(2.5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn same_value_different_type_is_distinct() {
        let mut table = ConstantTable::new();
        let a = table.intern(TypeId(0), ConstValue::Int(1));
        let b = table.intern(TypeId(1), ConstValue::Int(1));
        assert_ne!(a, b);
    }
}
