//! IR type system.
//!
//! Types are interned per module in a [`TypeTable`]; every reference to a
//! type is a [`TypeId`] index into that table. Component types are always
//! interned before the types that use them, so ids only ever point
//! backwards.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use rustc_hash::FxHashMap;

/// Index of a type in a module's [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Index into the owning table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// Scalar component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ScalarKind {
    Bool = 0,
    Int = 1,
    Float = 2,
}

/// Where a pointer's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum StorageClass {
    /// Function-local variable.
    Function = 0,
    /// Module-private global.
    Private = 1,
    /// Stage input.
    Input = 2,
    /// Stage output.
    Output = 3,
    /// Member of a uniform block.
    Uniform = 4,
    /// Opaque resource (sampler, image).
    UniformConstant = 5,
    /// Read-write buffer.
    StorageBuffer = 6,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Function => "Function",
            StorageClass::Private => "Private",
            StorageClass::Input => "Input",
            StorageClass::Output => "Output",
            StorageClass::Uniform => "Uniform",
            StorageClass::UniformConstant => "UniformConstant",
            StorageClass::StorageBuffer => "StorageBuffer",
        }
    }
}

/// Image dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ImageDim {
    D2 = 0,
    D3 = 1,
    Cube = 2,
}

/// Pipeline stage of an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ShaderStage {
    Vertex = 0,
    Geometry = 1,
    Pixel = 2,
}

impl ShaderStage {
    /// All stages in pipeline order.
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Pixel];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::Geometry => "Geometry",
            ShaderStage::Pixel => "Pixel",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named struct member with an optional explicit byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
    /// Byte offset for members of uniform blocks.
    pub offset: Option<u32>,
}

/// An IR type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 32-bit float.
    Float,
    Vector {
        component: TypeId,
        count: u32,
    },
    /// Column-major matrix of `columns` vectors of type `column`.
    Matrix {
        column: TypeId,
        columns: u32,
    },
    Array {
        element: TypeId,
        length: u32,
    },
    Struct {
        name: String,
        members: Vec<StructMember>,
    },
    Pointer {
        storage: StorageClass,
        pointee: TypeId,
    },
    Function {
        return_type: TypeId,
        params: Vec<TypeId>,
    },
    Sampler,
    /// An image; `sampled == false` means a storage image.
    Image {
        dim: ImageDim,
        sampled: bool,
    },
    SampledImage {
        image: TypeId,
    },
}

impl IrType {
    /// Whether values of this type can be produced by instructions.
    pub fn is_value(&self) -> bool {
        !matches!(self, IrType::Void | IrType::Pointer { .. } | IrType::Function { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer { .. })
    }

    /// Whether this type is an opaque resource handle.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            IrType::Sampler | IrType::Image { .. } | IrType::SampledImage { .. }
        )
    }
}

/// Interning table for types.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<IrType>,
    lookup: FxHashMap<IrType, TypeId>,
}

impl PartialEq for TypeTable {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the existing id when already present.
    pub fn intern(&mut self, ty: IrType) -> TypeId {
        if let Some(&id) = self.lookup.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    /// Look up a type by id.
    pub fn get(&self, id: TypeId) -> Option<&IrType> {
        self.types.get(id.index())
    }

    /// Find the id of an already interned type.
    pub fn find(&self, ty: &IrType) -> Option<TypeId> {
        self.lookup.get(ty).copied()
    }

    /// Replace the type stored at `id` in place. Fails when `id` is unknown
    /// or when `ty` is already interned under another id.
    pub fn replace(&mut self, id: TypeId, ty: IrType) -> bool {
        if self.find(&ty).is_some_and(|existing| existing != id) {
            return false;
        }
        let Some(slot) = self.types.get_mut(id.index()) else {
            return false;
        };
        let old = std::mem::replace(slot, ty.clone());
        self.lookup.remove(&old);
        self.lookup.insert(ty, id);
        true
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &IrType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    // =========================================
    // Convenience constructors
    // =========================================

    pub fn void(&mut self) -> TypeId {
        self.intern(IrType::Void)
    }

    pub fn bool(&mut self) -> TypeId {
        self.intern(IrType::Bool)
    }

    pub fn int(&mut self) -> TypeId {
        self.intern(IrType::Int)
    }

    pub fn float(&mut self) -> TypeId {
        self.intern(IrType::Float)
    }

    /// Intern a scalar of the given kind.
    pub fn scalar(&mut self, kind: ScalarKind) -> TypeId {
        match kind {
            ScalarKind::Bool => self.bool(),
            ScalarKind::Int => self.int(),
            ScalarKind::Float => self.float(),
        }
    }

    /// Intern a vector; a count of one yields the scalar itself.
    pub fn vector(&mut self, kind: ScalarKind, count: u32) -> TypeId {
        let component = self.scalar(kind);
        if count <= 1 {
            return component;
        }
        self.intern(IrType::Vector { component, count })
    }

    /// Intern a float matrix with `columns` columns of `rows` components.
    pub fn matrix(&mut self, columns: u32, rows: u32) -> TypeId {
        let column = self.vector(ScalarKind::Float, rows);
        self.intern(IrType::Matrix { column, columns })
    }

    pub fn pointer(&mut self, storage: StorageClass, pointee: TypeId) -> TypeId {
        self.intern(IrType::Pointer { storage, pointee })
    }

    // =========================================
    // Queries
    // =========================================

    /// The pointee of a pointer type.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id)? {
            IrType::Pointer { pointee, .. } => Some(*pointee),
            _ => None,
        }
    }

    /// The storage class of a pointer type.
    pub fn storage(&self, id: TypeId) -> Option<StorageClass> {
        match self.get(id)? {
            IrType::Pointer { storage, .. } => Some(*storage),
            _ => None,
        }
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        self.get(id).is_some_and(IrType::is_pointer)
    }

    /// Scalar kind of a scalar or vector type.
    pub fn scalar_kind(&self, id: TypeId) -> Option<ScalarKind> {
        match self.get(id)? {
            IrType::Bool => Some(ScalarKind::Bool),
            IrType::Int => Some(ScalarKind::Int),
            IrType::Float => Some(ScalarKind::Float),
            IrType::Vector { component, .. } => self.scalar_kind(*component),
            IrType::Matrix { .. } => Some(ScalarKind::Float),
            _ => None,
        }
    }

    /// Number of components of a scalar (1) or vector type.
    pub fn component_count(&self, id: TypeId) -> Option<u32> {
        match self.get(id)? {
            IrType::Bool | IrType::Int | IrType::Float => Some(1),
            IrType::Vector { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// The type reached by indexing into a composite with `index`.
    ///
    /// Arrays, vectors and matrices ignore the index value.
    pub fn member_type(&self, id: TypeId, index: u32) -> Option<TypeId> {
        match self.get(id)? {
            IrType::Vector { component, .. } => Some(*component),
            IrType::Matrix { column, .. } => Some(*column),
            IrType::Array { element, .. } => Some(*element),
            IrType::Struct { members, .. } => members.get(index as usize).map(|m| m.ty),
            _ => None,
        }
    }

    /// Index of a named struct member.
    pub fn member_index(&self, id: TypeId, name: &str) -> Option<u32> {
        match self.get(id)? {
            IrType::Struct { members, .. } => members
                .iter()
                .position(|m| m.name == name)
                .map(|i| i as u32),
            _ => None,
        }
    }

    /// Human-readable type name, used by diagnostics and the text backend.
    pub fn display(&self, id: TypeId) -> String {
        let Some(ty) = self.get(id) else {
            return format!("<invalid {id}>");
        };
        match ty {
            IrType::Void => "void".into(),
            IrType::Bool => "bool".into(),
            IrType::Int => "int".into(),
            IrType::Float => "float".into(),
            IrType::Vector { component, count } => match self.get(*component) {
                Some(IrType::Bool) => format!("bvec{count}"),
                Some(IrType::Int) => format!("ivec{count}"),
                _ => format!("vec{count}"),
            },
            IrType::Matrix { column, columns } => {
                let rows = self.component_count(*column).unwrap_or(0);
                if rows == *columns {
                    format!("mat{columns}")
                } else {
                    format!("mat{columns}x{rows}")
                }
            }
            IrType::Array { element, length } => format!("{}[{length}]", self.display(*element)),
            IrType::Struct { name, .. } => name.clone(),
            IrType::Pointer { storage, pointee } => {
                format!("ptr<{}, {}>", storage.as_str(), self.display(*pointee))
            }
            IrType::Function { return_type, params } => {
                let params: Vec<_> = params.iter().map(|p| self.display(*p)).collect();
                format!("fn({}) -> {}", params.join(", "), self.display(*return_type))
            }
            IrType::Sampler => "sampler".into(),
            IrType::Image { dim, sampled } => {
                let prefix = if *sampled { "texture" } else { "image" };
                match dim {
                    ImageDim::D2 => format!("{prefix}2D"),
                    ImageDim::D3 => format!("{prefix}3D"),
                    ImageDim::Cube => format!("{prefix}Cube"),
                }
            }
            IrType::SampledImage { image } => match self.get(*image) {
                Some(IrType::Image { dim: ImageDim::D3, .. }) => "sampler3D".into(),
                Some(IrType::Image { dim: ImageDim::Cube, .. }) => "samplerCube".into(),
                _ => "sampler2D".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut table = TypeTable::new();
        let a = table.vector(ScalarKind::Float, 3);
        let b = table.vector(ScalarKind::Float, 3);
        assert_eq!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn vector_of_one_is_scalar() {
        let mut table = TypeTable::new();
        assert_eq!(table.vector(ScalarKind::Int, 1), table.int());
    }

    #[test]
    fn components_precede_composites() {
        let mut table = TypeTable::new();
        let m = table.matrix(4, 4);
        for (id, ty) in table.iter() {
            if let IrType::Matrix { column, .. } = ty {
                assert!(column.0 < id.0);
            }
        }
        assert_eq!(table.display(m), "mat4");
    }

    #[test]
    fn member_lookup() {
        let mut table = TypeTable::new();
        let float = table.float();
        let vec3 = table.vector(ScalarKind::Float, 3);
        let s = table.intern(IrType::Struct {
            name: "Light".into(),
            members: vec![
                StructMember { name: "Intensity".into(), ty: float, offset: None },
                StructMember { name: "Direction".into(), ty: vec3, offset: None },
            ],
        });
        assert_eq!(table.member_index(s, "Direction"), Some(1));
        assert_eq!(table.member_type(s, 1), Some(vec3));
        assert_eq!(table.member_index(s, "Missing"), None);
    }

    #[test]
    fn pointer_queries() {
        let mut table = TypeTable::new();
        let float = table.float();
        let ptr = table.pointer(StorageClass::Function, float);
        assert!(table.is_pointer(ptr));
        assert_eq!(table.pointee(ptr), Some(float));
        assert_eq!(table.pointee(float), None);
        assert_eq!(table.storage(ptr), Some(StorageClass::Function));
    }
}
