//! Function builder.
//!
//! A [`FunctionBuilder`] appends instructions to a current block of a
//! function previously declared with [`IrModule::declare_function`]. Types
//! of results are derived from operand types where the IR allows it, so
//! callers only pass a type for operations whose result type is not
//! determined by their operands.

use crate::constant::ConstValue;
use crate::error::IrError;
use crate::function::{
    BasicBlock, BinOp, BlockId, FuncId, FunctionParam, Inst, IrFunction, MergeInfo, Op, Operand,
    Terminator, UnOp, ValueId,
};
use crate::module::IrModule;
use crate::types::{IrType, StorageClass, TypeId};

impl IrModule {
    /// Add a function with a signature and no body, so calls to it can be
    /// built before its body.
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        return_type: TypeId,
        params: Vec<FunctionParam>,
    ) -> FuncId {
        self.add_function(IrFunction::new(name, return_type, params))
    }
}

/// Which logical operator a short-circuit diamond implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    And,
    Or,
}

/// Builds the body of one function.
pub struct FunctionBuilder<'m> {
    module: &'m mut IrModule,
    id: FuncId,
    blocks: Vec<BasicBlock>,
    current: BlockId,
    next_value: u32,
    value_types: Vec<Option<TypeId>>,
}

impl<'m> FunctionBuilder<'m> {
    /// Start building the body of `id`. An entry block is created and
    /// selected.
    pub fn new(module: &'m mut IrModule, id: FuncId) -> Result<Self, IrError> {
        if module.function(id).is_none() {
            return Err(IrError::Builder(format!("unknown function {}", id.0)));
        }
        let mut builder = Self {
            module,
            id,
            blocks: Vec::new(),
            current: BlockId(0),
            next_value: 0,
            value_types: Vec::new(),
        };
        builder.current = builder.create_block();
        Ok(builder)
    }

    /// The module being built into.
    pub fn module(&mut self) -> &mut IrModule {
        self.module
    }

    /// Read-only view of the module.
    pub fn module_ref(&self) -> &IrModule {
        self.module
    }

    pub fn function_id(&self) -> FuncId {
        self.id
    }

    /// Write the blocks back into the module.
    pub fn finish(self) -> FuncId {
        let id = self.id;
        if let Some(function) = self.module.functions.get_mut(id.index()) {
            function.blocks = self.blocks;
            function.value_count = self.next_value;
        }
        id
    }

    // =========================================
    // Blocks
    // =========================================

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Whether the current block already has a terminator.
    pub fn is_terminated(&self) -> bool {
        self.blocks
            .get(self.current.index())
            .is_some_and(BasicBlock::is_terminated)
    }

    /// Annotate a header block with structured merge information.
    pub fn set_merge(&mut self, block: BlockId, merge: MergeInfo) {
        if let Some(b) = self.blocks.get_mut(block.index()) {
            b.merge = Some(merge);
        }
    }

    fn terminate(&mut self, terminator: Terminator) -> Result<(), IrError> {
        let current = self.current;
        let block = self
            .blocks
            .get_mut(current.index())
            .ok_or_else(|| IrError::Builder(format!("no block {current}")))?;
        if block.terminator.is_some() {
            return Err(IrError::Builder(format!("block {current} already terminated")));
        }
        block.terminator = Some(terminator);
        Ok(())
    }

    pub fn ret(&mut self) -> Result<(), IrError> {
        self.terminate(Terminator::Return)
    }

    pub fn ret_value(&mut self, value: Operand) -> Result<(), IrError> {
        self.terminate(Terminator::ReturnValue(value))
    }

    pub fn branch(&mut self, target: BlockId) -> Result<(), IrError> {
        self.terminate(Terminator::Branch(target))
    }

    pub fn cond_branch(
        &mut self,
        condition: Operand,
        accept: BlockId,
        reject: BlockId,
    ) -> Result<(), IrError> {
        self.terminate(Terminator::CondBranch {
            condition,
            accept,
            reject,
        })
    }

    pub fn kill(&mut self) -> Result<(), IrError> {
        self.terminate(Terminator::Kill)
    }

    // =========================================
    // Types and constants
    // =========================================

    /// Type of an operand in this function.
    pub fn type_of(&self, operand: Operand) -> Option<TypeId> {
        match operand {
            Operand::Value(v) => self.value_types.get(v.index()).copied().flatten(),
            Operand::Param(i) => self
                .module
                .function(self.id)
                .and_then(|f| f.params.get(i as usize))
                .map(|p| p.ty),
            Operand::Const(c) => self.module.constants.get(c).map(|c| c.ty),
            Operand::SpecConst(s) => self.module.spec_constants.get(s.index()).map(|s| s.ty),
            Operand::Global(g) => self.module.global(g).map(|g| g.pointer_ty),
        }
    }

    pub fn const_bool(&mut self, value: bool) -> Operand {
        let ty = self.module.types.bool();
        Operand::Const(self.module.constants.intern(ty, ConstValue::Bool(value)))
    }

    pub fn const_int(&mut self, value: i32) -> Operand {
        let ty = self.module.types.int();
        Operand::Const(self.module.constants.intern(ty, ConstValue::Int(value)))
    }

    pub fn const_float(&mut self, value: f32) -> Operand {
        let ty = self.module.types.float();
        Operand::Const(self.module.constants.intern(ty, ConstValue::float(value)))
    }

    // =========================================
    // Instructions
    // =========================================

    fn push(&mut self, op: Op, ty: Option<TypeId>) -> Result<Option<ValueId>, IrError> {
        let current = self.current;
        let block = self
            .blocks
            .get_mut(current.index())
            .ok_or_else(|| IrError::Builder(format!("no block {current}")))?;
        if block.terminator.is_some() {
            return Err(IrError::Builder(format!(
                "instruction '{}' after terminator in {current}",
                op.mnemonic()
            )));
        }
        let result = ty.map(|_| ValueId(self.next_value));
        if result.is_some() {
            self.next_value += 1;
            self.value_types.push(ty);
        }
        block.insts.push(Inst { result, ty, op });
        Ok(result)
    }

    fn push_value(&mut self, op: Op, ty: TypeId) -> Result<Operand, IrError> {
        let value = self
            .push(op, Some(ty))?
            .ok_or_else(|| IrError::Builder("value instruction without result".into()))?;
        Ok(Operand::Value(value))
    }

    fn require_type(&self, operand: Operand) -> Result<TypeId, IrError> {
        self.type_of(operand)
            .ok_or_else(|| IrError::Builder(format!("operand {operand:?} has no type")))
    }

    /// Declare a function-storage variable holding `pointee`.
    pub fn variable(&mut self, pointee: TypeId, init: Option<Operand>) -> Result<Operand, IrError> {
        let ty = self.module.types.pointer(StorageClass::Function, pointee);
        self.push_value(Op::Variable { init }, ty)
    }

    pub fn load(&mut self, pointer: Operand) -> Result<Operand, IrError> {
        let ptr_ty = self.require_type(pointer)?;
        let pointee = self
            .module
            .types
            .pointee(ptr_ty)
            .ok_or_else(|| IrError::Builder(format!("load from non-pointer {pointer:?}")))?;
        self.push_value(Op::Load { pointer }, pointee)
    }

    pub fn store(&mut self, pointer: Operand, value: Operand) -> Result<(), IrError> {
        self.push(Op::Store { pointer, value }, None).map(|_| ())
    }

    /// Pointer to a member of the composite behind `base`. Struct indices
    /// must be integer constants.
    pub fn access_chain(&mut self, base: Operand, indices: Vec<Operand>) -> Result<Operand, IrError> {
        let base_ty = self.require_type(base)?;
        let storage = self
            .module
            .types
            .storage(base_ty)
            .ok_or_else(|| IrError::Builder(format!("access chain on non-pointer {base:?}")))?;
        let mut current = self
            .module
            .types
            .pointee(base_ty)
            .ok_or_else(|| IrError::Builder("pointer without pointee".into()))?;

        for index in &indices {
            let literal = match index {
                Operand::Const(c) => match self.module.constants.get(*c).map(|c| &c.value) {
                    Some(ConstValue::Int(v)) => Some(*v as u32),
                    _ => None,
                },
                _ => None,
            };
            let is_struct = matches!(self.module.types.get(current), Some(IrType::Struct { .. }));
            if is_struct && literal.is_none() {
                return Err(IrError::Builder("struct index must be a constant".into()));
            }
            current = self
                .module
                .types
                .member_type(current, literal.unwrap_or(0))
                .ok_or_else(|| {
                    IrError::Builder(format!(
                        "cannot index into {}",
                        self.module.types.display(current)
                    ))
                })?;
        }

        let ty = self.module.types.pointer(storage, current);
        self.push_value(Op::AccessChain { base, indices }, ty)
    }

    /// Binary operation. Comparisons produce `bool` (or a bool vector of
    /// the operand width); everything else takes the type of `lhs` unless
    /// `ty` overrides it.
    pub fn binary(
        &mut self,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
        ty: Option<TypeId>,
    ) -> Result<Operand, IrError> {
        let ty = match ty {
            Some(ty) => ty,
            None if op.is_comparison() => {
                let lhs_ty = self.require_type(lhs)?;
                let count = self.module.types.component_count(lhs_ty).unwrap_or(1);
                self.module.types.vector(crate::types::ScalarKind::Bool, count)
            }
            None => self.require_type(lhs)?,
        };
        self.push_value(Op::Binary { op, lhs, rhs }, ty)
    }

    pub fn unary(&mut self, op: UnOp, operand: Operand) -> Result<Operand, IrError> {
        let ty = self.require_type(operand)?;
        self.push_value(Op::Unary { op, operand }, ty)
    }

    pub fn select(
        &mut self,
        condition: Operand,
        accept: Operand,
        reject: Operand,
    ) -> Result<Operand, IrError> {
        let ty = self.require_type(accept)?;
        self.push_value(
            Op::Select {
                condition,
                accept,
                reject,
            },
            ty,
        )
    }

    /// Call a function in the module. Returns `None` for void functions.
    pub fn call(&mut self, function: FuncId, args: Vec<Operand>) -> Result<Option<Operand>, IrError> {
        let return_type = self
            .module
            .function(function)
            .map(|f| f.return_type)
            .ok_or_else(|| IrError::Builder(format!("call to unknown function {}", function.0)))?;
        let is_void = matches!(self.module.types.get(return_type), Some(IrType::Void));
        let ty = (!is_void).then_some(return_type);
        Ok(self
            .push(Op::Call { function, args }, ty)?
            .map(Operand::Value))
    }

    /// Call a target intrinsic. `ty` of `None` means the intrinsic
    /// produces no value.
    pub fn intrinsic(
        &mut self,
        name: impl Into<String>,
        args: Vec<Operand>,
        ty: Option<TypeId>,
    ) -> Result<Option<Operand>, IrError> {
        Ok(self
            .push(
                Op::Intrinsic {
                    name: name.into(),
                    args,
                },
                ty,
            )?
            .map(Operand::Value))
    }

    pub fn construct(&mut self, components: Vec<Operand>, ty: TypeId) -> Result<Operand, IrError> {
        self.push_value(Op::Construct { components }, ty)
    }

    pub fn extract(&mut self, composite: Operand, indices: Vec<u32>) -> Result<Operand, IrError> {
        let mut ty = self.require_type(composite)?;
        for &index in &indices {
            ty = self.module.types.member_type(ty, index).ok_or_else(|| {
                IrError::Builder(format!("cannot extract from {}", self.module.types.display(ty)))
            })?;
        }
        self.push_value(Op::Extract { composite, indices }, ty)
    }

    pub fn shuffle(&mut self, vector: Operand, components: Vec<u32>) -> Result<Operand, IrError> {
        let vector_ty = self.require_type(vector)?;
        let kind = self
            .module
            .types
            .scalar_kind(vector_ty)
            .ok_or_else(|| IrError::Builder("shuffle of non-vector".into()))?;
        let ty = self.module.types.vector(kind, components.len() as u32);
        self.push_value(Op::Shuffle { vector, components }, ty)
    }

    pub fn convert(&mut self, operand: Operand, ty: TypeId) -> Result<Operand, IrError> {
        self.push_value(Op::Convert { operand }, ty)
    }

    pub fn sample(
        &mut self,
        sampled_image: Operand,
        coordinate: Operand,
    ) -> Result<Operand, IrError> {
        let ty = self
            .module
            .types
            .vector(crate::types::ScalarKind::Float, 4);
        self.push_value(
            Op::Sample {
                sampled_image,
                coordinate,
            },
            ty,
        )
    }

    // =========================================
    // Structured lowering helpers
    // =========================================

    /// Lower a short-circuiting `&&`/`||` whose left operand has already
    /// been evaluated into `lhs`.
    ///
    /// Emits a selection diamond: the current block branches on `lhs`
    /// either to a block that stores the known result or to a block that
    /// evaluates `rhs` and stores it; both meet in a merge block that loads
    /// the temporary. `rhs` runs with the builder positioned in the full
    /// evaluation block, so its instructions only execute on that path.
    pub fn short_circuit<E>(
        &mut self,
        kind: ShortCircuit,
        lhs: Operand,
        rhs: impl FnOnce(&mut Self) -> Result<Operand, E>,
    ) -> Result<Operand, E>
    where
        E: From<IrError>,
    {
        let bool_ty = self.module.types.bool();
        let temp = self.variable(bool_ty, None)?;

        let header = self.current;
        let evaluate = self.create_block();
        let known = self.create_block();
        let merge = self.create_block();

        self.set_merge(header, MergeInfo::Selection { merge });
        match kind {
            ShortCircuit::And => self.cond_branch(lhs, evaluate, known)?,
            ShortCircuit::Or => self.cond_branch(lhs, known, evaluate)?,
        }

        self.switch_to(known);
        let known_value = self.const_bool(kind == ShortCircuit::Or);
        self.store(temp, known_value)?;
        self.branch(merge)?;

        self.switch_to(evaluate);
        let value = rhs(self)?;
        if !self.is_terminated() {
            self.store(temp, value)?;
            self.branch(merge)?;
        }

        self.switch_to(merge);
        Ok(self.load(temp)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_main() -> (IrModule, FuncId) {
        let mut module = IrModule::new();
        let void = module.types.void();
        let id = module.declare_function("main", void, Vec::new());
        (module, id)
    }

    #[test]
    fn variable_load_store() {
        let (mut module, id) = module_with_main();
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        let float = b.module().types.float();
        let var = b.variable(float, None).unwrap();
        let one = b.const_float(1.0);
        b.store(var, one).unwrap();
        let loaded = b.load(var).unwrap();
        assert_eq!(b.type_of(loaded), Some(float));
        b.ret().unwrap();
        b.finish();
        assert_eq!(module.functions[0].value_count, 2);
    }

    #[test]
    fn load_of_value_fails() {
        let (mut module, id) = module_with_main();
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        let one = b.const_float(1.0);
        assert!(b.load(one).is_err());
    }

    #[test]
    fn double_terminator_rejected() {
        let (mut module, id) = module_with_main();
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        b.ret().unwrap();
        assert!(b.ret().is_err());
        let one = b.const_int(1);
        assert!(b.variable(b.type_of(one).unwrap(), None).is_err());
    }

    #[test]
    fn short_circuit_shape() {
        let (mut module, id) = module_with_main();
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        let lhs = b.const_bool(true);
        let result = b
            .short_circuit::<IrError>(ShortCircuit::And, lhs, |b| Ok(b.const_bool(false)))
            .unwrap();
        b.ret().unwrap();
        let bool_ty = b.module().types.bool();
        assert_eq!(b.type_of(result), Some(bool_ty));
        b.finish();

        let function = &module.functions[0];
        assert_eq!(function.blocks.len(), 4);
        assert_eq!(
            function.blocks[0].merge,
            Some(MergeInfo::Selection { merge: BlockId(3) })
        );
        assert!(matches!(
            function.blocks[0].terminator,
            Some(Terminator::CondBranch { accept: BlockId(1), reject: BlockId(2), .. })
        ));
        assert!(function.blocks.iter().all(BasicBlock::is_terminated));
    }

    #[test]
    fn access_chain_into_struct() {
        use crate::types::{ScalarKind, StructMember};

        let (mut module, id) = module_with_main();
        let float = module.types.float();
        let vec3 = module.types.vector(ScalarKind::Float, 3);
        let s = module.types.intern(IrType::Struct {
            name: "S".into(),
            members: vec![
                StructMember { name: "a".into(), ty: float, offset: None },
                StructMember { name: "b".into(), ty: vec3, offset: None },
            ],
        });
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        let var = b.variable(s, None).unwrap();
        let one = b.const_int(1);
        let ptr = b.access_chain(var, vec![one]).unwrap();
        let ty = b.type_of(ptr).unwrap();
        assert_eq!(b.module().types.pointee(ty), Some(vec3));
    }
}
