//! The IR module: everything produced for one pipeline stage.

use crate::constant::{ConstValue, ConstantTable, SpecConstId, SpecConstant};
use crate::function::{FuncId, IrFunction, Operand};
use crate::types::{ShaderStage, StorageClass, TypeId, TypeTable};

/// Index of a global variable within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

impl GlobalId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interface decorations on a global.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decorations {
    /// Stage input/output location.
    pub location: Option<u32>,
    /// Resource binding slot.
    pub binding: Option<u32>,
    /// Descriptor set.
    pub set: Option<u32>,
    /// Target system value this global maps to, e.g. `gl_Position`.
    pub builtin: Option<String>,
}

/// A module-scope variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    /// Type of the stored value.
    pub ty: TypeId,
    /// Pointer type of `Operand::Global` referring to this variable.
    pub pointer_ty: TypeId,
    pub storage: StorageClass,
    pub decorations: Decorations,
}

/// An entry point of the module.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
    pub function: FuncId,
    /// Input and output globals used by the entry point.
    pub interface: Vec<GlobalId>,
}

/// A complete IR module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrModule {
    pub types: TypeTable,
    pub constants: ConstantTable,
    pub spec_constants: Vec<SpecConstant>,
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<IrFunction>,
    pub entry_points: Vec<EntryPoint>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global, interning its pointer type.
    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        storage: StorageClass,
        decorations: Decorations,
    ) -> GlobalId {
        let pointer_ty = self.types.pointer(storage, ty);
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalVariable {
            name: name.into(),
            ty,
            pointer_ty,
            storage,
            decorations,
        });
        id
    }

    /// Declare a specialization constant.
    pub fn add_spec_constant(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        spec_id: u32,
        default: ConstValue,
    ) -> SpecConstId {
        let id = SpecConstId(self.spec_constants.len() as u32);
        self.spec_constants.push(SpecConstant {
            name: name.into(),
            ty,
            spec_id,
            default,
        });
        id
    }

    pub fn add_function(&mut self, function: IrFunction) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalVariable> {
        self.globals.get(id.index())
    }

    pub fn function(&self, id: FuncId) -> Option<&IrFunction> {
        self.functions.get(id.index())
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    /// Type of an operand inside `function`, given that function's value
    /// types (see [`IrFunction::value_types`]).
    pub fn operand_type(
        &self,
        function: &IrFunction,
        value_types: &[Option<TypeId>],
        operand: Operand,
    ) -> Option<TypeId> {
        match operand {
            Operand::Value(v) => value_types.get(v.index()).copied().flatten(),
            Operand::Const(c) => self.constants.get(c).map(|c| c.ty),
            Operand::SpecConst(s) => self.spec_constants.get(s.index()).map(|s| s.ty),
            Operand::Global(g) => self.global(g).map(|g| g.pointer_ty),
            Operand::Param(i) => function.params.get(i as usize).map(|p| p.ty),
        }
    }
}
