//! Functions, basic blocks and instructions.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constant::{ConstId, SpecConstId};
use crate::module::GlobalId;
use crate::types::TypeId;

/// Result id of a value-producing instruction, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Index of a function within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl FuncId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Result of an earlier instruction in the same function.
    Value(ValueId),
    /// Interned module constant.
    Const(ConstId),
    /// Specialization constant.
    SpecConst(SpecConstId),
    /// Pointer to a module global.
    Global(GlobalId),
    /// Function parameter by position.
    Param(u32),
}

/// Binary operations. Logical operators here do not short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum BinOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Rem = 4,
    Shl = 5,
    Shr = 6,
    BitAnd = 7,
    BitOr = 8,
    BitXor = 9,
    Eq = 10,
    Ne = 11,
    Lt = 12,
    Le = 13,
    Gt = 14,
    Ge = 15,
    LogicalAnd = 16,
    LogicalOr = 17,
}

impl BinOp {
    /// Whether the result is boolean.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
        }
    }
}

/// Unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum UnOp {
    Neg = 0,
    Not = 1,
    BitNot = 2,
}

impl UnOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
    }
}

/// Instruction payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Function-storage variable; the result is a pointer.
    Variable { init: Option<Operand> },
    Load { pointer: Operand },
    Store { pointer: Operand, value: Operand },
    /// Pointer to a member or element of a composite behind `base`.
    AccessChain { base: Operand, indices: Vec<Operand> },
    Binary { op: BinOp, lhs: Operand, rhs: Operand },
    Unary { op: UnOp, operand: Operand },
    Select { condition: Operand, accept: Operand, reject: Operand },
    Call { function: FuncId, args: Vec<Operand> },
    /// Target intrinsic by name, e.g. `dot` or `normalize`.
    Intrinsic { name: String, args: Vec<Operand> },
    Construct { components: Vec<Operand> },
    Extract { composite: Operand, indices: Vec<u32> },
    /// Swizzle of a single vector.
    Shuffle { vector: Operand, components: Vec<u32> },
    /// Numeric conversion to the result type.
    Convert { operand: Operand },
    Sample { sampled_image: Operand, coordinate: Operand },
}

impl Op {
    /// Visit every operand in order.
    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            Op::Variable { init } => init.iter().for_each(f),
            Op::Load { pointer } => f(pointer),
            Op::Store { pointer, value } => {
                f(pointer);
                f(value);
            }
            Op::AccessChain { base, indices } => {
                f(base);
                indices.iter().for_each(f);
            }
            Op::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Op::Unary { operand, .. } | Op::Convert { operand } => f(operand),
            Op::Select { condition, accept, reject } => {
                f(condition);
                f(accept);
                f(reject);
            }
            Op::Call { args, .. } | Op::Intrinsic { args, .. } => args.iter().for_each(f),
            Op::Construct { components } => components.iter().for_each(f),
            Op::Extract { composite, .. } => f(composite),
            Op::Shuffle { vector, .. } => f(vector),
            Op::Sample { sampled_image, coordinate } => {
                f(sampled_image);
                f(coordinate);
            }
        }
    }

    /// Visit every operand mutably in order.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Op::Variable { init } => init.iter_mut().for_each(f),
            Op::Load { pointer } => f(pointer),
            Op::Store { pointer, value } => {
                f(pointer);
                f(value);
            }
            Op::AccessChain { base, indices } => {
                f(base);
                indices.iter_mut().for_each(f);
            }
            Op::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Op::Unary { operand, .. } | Op::Convert { operand } => f(operand),
            Op::Select { condition, accept, reject } => {
                f(condition);
                f(accept);
                f(reject);
            }
            Op::Call { args, .. } | Op::Intrinsic { args, .. } => args.iter_mut().for_each(f),
            Op::Construct { components } => components.iter_mut().for_each(f),
            Op::Extract { composite, .. } => f(composite),
            Op::Shuffle { vector, .. } => f(vector),
            Op::Sample { sampled_image, coordinate } => {
                f(sampled_image);
                f(coordinate);
            }
        }
    }

    /// Short mnemonic used in dumps and errors.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Variable { .. } => "variable",
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::AccessChain { .. } => "access_chain",
            Op::Binary { .. } => "binary",
            Op::Unary { .. } => "unary",
            Op::Select { .. } => "select",
            Op::Call { .. } => "call",
            Op::Intrinsic { .. } => "intrinsic",
            Op::Construct { .. } => "construct",
            Op::Extract { .. } => "extract",
            Op::Shuffle { .. } => "shuffle",
            Op::Convert { .. } => "convert",
            Op::Sample { .. } => "sample",
        }
    }
}

/// One instruction with its optional result.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub result: Option<ValueId>,
    pub ty: Option<TypeId>,
    pub op: Op,
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return,
    ReturnValue(Operand),
    Branch(BlockId),
    CondBranch {
        condition: Operand,
        accept: BlockId,
        reject: BlockId,
    },
    /// Discard the current fragment.
    Kill,
}

impl Terminator {
    /// Blocks this terminator can transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(target) => vec![*target],
            Terminator::CondBranch { accept, reject, .. } => vec![*accept, *reject],
            _ => Vec::new(),
        }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Terminator::ReturnValue(value) => f(value),
            Terminator::CondBranch { condition, .. } => f(condition),
            _ => {}
        }
    }

    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            Terminator::ReturnValue(value) => f(value),
            Terminator::CondBranch { condition, .. } => f(condition),
            _ => {}
        }
    }
}

/// Structured control-flow annotation on a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeInfo {
    /// The block opens an if/else whose arms reconverge at `merge`.
    Selection { merge: BlockId },
    /// The block is a loop header.
    Loop { merge: BlockId, continue_target: BlockId },
}

impl MergeInfo {
    pub fn merge_block(&self) -> BlockId {
        match self {
            MergeInfo::Selection { merge } | MergeInfo::Loop { merge, .. } => *merge,
        }
    }
}

/// A basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub insts: Vec<Inst>,
    /// `None` only while the block is under construction.
    pub terminator: Option<Terminator>,
    pub merge: Option<MergeInfo>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            insts: Vec::new(),
            terminator: None,
            merge: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParam {
    pub name: String,
    pub ty: TypeId,
}

/// An IR function. Block `i` always has id `BlockId(i)`; block 0 is the
/// entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub return_type: TypeId,
    pub params: Vec<FunctionParam>,
    pub blocks: Vec<BasicBlock>,
    /// One past the highest value id in use.
    pub value_count: u32,
}

impl IrFunction {
    pub fn new(name: impl Into<String>, return_type: TypeId, params: Vec<FunctionParam>) -> Self {
        Self {
            name: name.into(),
            return_type,
            params,
            blocks: Vec::new(),
            value_count: 0,
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Iterate every instruction in block order.
    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }

    /// Type of every value produced in this function, by value id.
    pub fn value_types(&self) -> Vec<Option<TypeId>> {
        let mut types = vec![None; self.value_count as usize];
        for inst in self.insts() {
            if let (Some(result), Some(ty)) = (inst.result, inst.ty) {
                if let Some(slot) = types.get_mut(result.index()) {
                    *slot = Some(ty);
                }
            }
        }
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_visit_order() {
        let op = Op::Select {
            condition: Operand::Param(0),
            accept: Operand::Param(1),
            reject: Operand::Param(2),
        };
        let mut seen = Vec::new();
        op.for_each_operand(|o| seen.push(*o));
        assert_eq!(seen, vec![Operand::Param(0), Operand::Param(1), Operand::Param(2)]);
    }

    #[test]
    fn operand_rewrite() {
        let mut op = Op::Store {
            pointer: Operand::Global(GlobalId(3)),
            value: Operand::Value(ValueId(1)),
        };
        op.for_each_operand_mut(|o| {
            if let Operand::Global(g) = o {
                *o = Operand::Global(GlobalId(g.0 - 1));
            }
        });
        assert!(matches!(op, Op::Store { pointer: Operand::Global(GlobalId(2)), .. }));
    }

    #[test]
    fn successors() {
        let term = Terminator::CondBranch {
            condition: Operand::Param(0),
            accept: BlockId(1),
            reject: BlockId(2),
        };
        assert_eq!(term.successors(), vec![BlockId(1), BlockId(2)]);
        assert!(Terminator::Kill.successors().is_empty());
    }
}
