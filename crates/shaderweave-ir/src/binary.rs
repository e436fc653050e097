//! Binary encoding and decoding of IR modules.
//!
//! The format is a little-endian stream of `u32` words. A five word header
//! (magic, version, generator, bound, schema) is followed by instructions
//! whose first word is `(word_count << 16) | opcode`. Sections appear in a
//! fixed order: types, constants, specialization constants, globals,
//! functions and entry points. Type and constant ids are implicit: the
//! n-th type instruction defines `TypeId(n)`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constant::{ConstId, ConstValue, SpecConstId};
use crate::error::IrError;
use crate::function::{
    BasicBlock, BinOp, BlockId, FuncId, FunctionParam, Inst, IrFunction, MergeInfo, Op, Operand,
    Terminator, UnOp, ValueId,
};
use crate::module::{Decorations, EntryPoint, GlobalId, IrModule};
use crate::types::{ImageDim, IrType, ShaderStage, StorageClass, StructMember, TypeId};

/// Magic number, `"SWIR"`.
pub const MAGIC: u32 = 0x5357_4952;
/// Format version 1.0.
pub const VERSION: u32 = 0x0001_0000;
/// Generator id written into the header.
pub const GENERATOR: u32 = 0x0000_0001;
/// Words in the header.
pub const HEADER_WORDS: usize = 5;

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Opcode {
    TypeVoid = 1,
    TypeBool = 2,
    TypeInt = 3,
    TypeFloat = 4,
    TypeVector = 5,
    TypeMatrix = 6,
    TypeArray = 7,
    TypeStruct = 8,
    TypePointer = 9,
    TypeFunction = 10,
    TypeSampler = 11,
    TypeImage = 12,
    TypeSampledImage = 13,

    ConstantTrue = 20,
    ConstantFalse = 21,
    ConstantInt = 22,
    ConstantFloat = 23,
    ConstantComposite = 24,
    SpecConstant = 25,

    Variable = 30,

    Function = 40,
    FunctionEnd = 41,
    Label = 42,

    LocalVariable = 50,
    Load = 51,
    Store = 52,
    AccessChain = 53,
    Binary = 54,
    Unary = 55,
    Select = 56,
    Call = 57,
    Intrinsic = 58,
    Construct = 59,
    Extract = 60,
    Shuffle = 61,
    Convert = 62,
    Sample = 63,

    Return = 70,
    ReturnValue = 71,
    Branch = 72,
    CondBranch = 73,
    Kill = 74,

    EntryPoint = 80,
}

impl Opcode {
    /// Section an opcode belongs to; sections must not go backwards.
    fn section(self) -> u8 {
        match self as u16 {
            1..=13 => 0,
            20..=24 => 1,
            25 => 2,
            30 => 3,
            40..=74 => 4,
            _ => 5,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Word writer with length back-patching.
#[derive(Debug, Default)]
struct WordWriter {
    words: Vec<u32>,
}

impl WordWriter {
    fn begin(&mut self, opcode: Opcode) -> usize {
        let start = self.words.len();
        self.words.push(u16::from(opcode) as u32);
        start
    }

    fn end(&mut self, start: usize) -> Result<(), IrError> {
        let count = self.words.len() - start;
        if count > u16::MAX as usize {
            return Err(IrError::Encode(format!("instruction of {count} words is too long")));
        }
        self.words[start] |= (count as u32) << 16;
        Ok(())
    }

    fn word(&mut self, word: u32) {
        self.words.push(word);
    }

    fn optional(&mut self, value: Option<u32>) {
        self.words.push(value.map_or(0, |v| v + 1));
    }

    /// NUL-terminated string packed four bytes per word.
    fn string(&mut self, s: &str) {
        let mut word = 0u32;
        for (i, &b) in s.as_bytes().iter().enumerate() {
            word |= (b as u32) << ((i % 4) * 8);
            if i % 4 == 3 {
                self.words.push(word);
                word = 0;
            }
        }
        self.words.push(word);
    }

    fn operand(&mut self, operand: &Operand) {
        let (tag, value) = match *operand {
            Operand::Value(v) => (0, v.0),
            Operand::Const(c) => (1, c.0),
            Operand::SpecConst(s) => (2, s.0),
            Operand::Global(g) => (3, g.0),
            Operand::Param(p) => (4, p),
        };
        self.words.push(tag);
        self.words.push(value);
    }

    fn operands(&mut self, operands: &[Operand]) {
        self.word(operands.len() as u32);
        for operand in operands {
            self.operand(operand);
        }
    }

    fn scalar(&mut self, value: &ConstValue) -> Result<(), IrError> {
        let (tag, bits) = match value {
            ConstValue::Bool(b) => (0, *b as u32),
            ConstValue::Int(i) => (1, *i as u32),
            ConstValue::Float(f) => (2, f.0.to_bits()),
            ConstValue::Composite(_) => {
                return Err(IrError::Encode("specialization constants must be scalar".into()));
            }
        };
        self.word(tag);
        self.word(bits);
        Ok(())
    }
}

/// Encode a module to words.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn encode_module(module: &IrModule) -> Result<Vec<u32>, IrError> {
    let mut w = WordWriter::default();
    let bound = (module.types.len()
        + module.constants.len()
        + module.globals.len()
        + module.functions.len()) as u32;
    w.word(MAGIC);
    w.word(VERSION);
    w.word(GENERATOR);
    w.word(bound);
    w.word(0);

    for (_, ty) in module.types.iter() {
        encode_type(&mut w, ty)?;
    }

    for (_, constant) in module.constants.iter() {
        let opcode = match &constant.value {
            ConstValue::Bool(true) => Opcode::ConstantTrue,
            ConstValue::Bool(false) => Opcode::ConstantFalse,
            ConstValue::Int(_) => Opcode::ConstantInt,
            ConstValue::Float(_) => Opcode::ConstantFloat,
            ConstValue::Composite(_) => Opcode::ConstantComposite,
        };
        let start = w.begin(opcode);
        w.word(constant.ty.0);
        match &constant.value {
            ConstValue::Bool(_) => {}
            ConstValue::Int(i) => w.word(*i as u32),
            ConstValue::Float(f) => w.word(f.0.to_bits()),
            ConstValue::Composite(parts) => {
                w.word(parts.len() as u32);
                for part in parts {
                    w.word(part.0);
                }
            }
        }
        w.end(start)?;
    }

    for spec in &module.spec_constants {
        let start = w.begin(Opcode::SpecConstant);
        w.word(spec.ty.0);
        w.word(spec.spec_id);
        w.scalar(&spec.default)?;
        w.string(&spec.name);
        w.end(start)?;
    }

    for global in &module.globals {
        let start = w.begin(Opcode::Variable);
        w.word(global.ty.0);
        w.word(global.storage.into());
        w.string(&global.name);
        w.optional(global.decorations.location);
        w.optional(global.decorations.binding);
        w.optional(global.decorations.set);
        match &global.decorations.builtin {
            Some(builtin) => {
                w.word(1);
                w.string(builtin);
            }
            None => w.word(0),
        }
        w.end(start)?;
    }

    for function in &module.functions {
        encode_function(&mut w, function)?;
    }

    for entry in &module.entry_points {
        let start = w.begin(Opcode::EntryPoint);
        w.word(entry.stage.into());
        w.word(entry.function.0);
        w.string(&entry.name);
        w.word(entry.interface.len() as u32);
        for global in &entry.interface {
            w.word(global.0);
        }
        w.end(start)?;
    }

    Ok(w.words)
}

fn encode_type(w: &mut WordWriter, ty: &IrType) -> Result<(), IrError> {
    let start = match ty {
        IrType::Void => w.begin(Opcode::TypeVoid),
        IrType::Bool => w.begin(Opcode::TypeBool),
        IrType::Int => w.begin(Opcode::TypeInt),
        IrType::Float => w.begin(Opcode::TypeFloat),
        IrType::Vector { component, count } => {
            let start = w.begin(Opcode::TypeVector);
            w.word(component.0);
            w.word(*count);
            start
        }
        IrType::Matrix { column, columns } => {
            let start = w.begin(Opcode::TypeMatrix);
            w.word(column.0);
            w.word(*columns);
            start
        }
        IrType::Array { element, length } => {
            let start = w.begin(Opcode::TypeArray);
            w.word(element.0);
            w.word(*length);
            start
        }
        IrType::Struct { name, members } => {
            let start = w.begin(Opcode::TypeStruct);
            w.string(name);
            w.word(members.len() as u32);
            for member in members {
                w.word(member.ty.0);
                w.optional(member.offset);
                w.string(&member.name);
            }
            start
        }
        IrType::Pointer { storage, pointee } => {
            let start = w.begin(Opcode::TypePointer);
            w.word((*storage).into());
            w.word(pointee.0);
            start
        }
        IrType::Function { return_type, params } => {
            let start = w.begin(Opcode::TypeFunction);
            w.word(return_type.0);
            w.word(params.len() as u32);
            for param in params {
                w.word(param.0);
            }
            start
        }
        IrType::Sampler => w.begin(Opcode::TypeSampler),
        IrType::Image { dim, sampled } => {
            let start = w.begin(Opcode::TypeImage);
            w.word((*dim).into());
            w.word(*sampled as u32);
            start
        }
        IrType::SampledImage { image } => {
            let start = w.begin(Opcode::TypeSampledImage);
            w.word(image.0);
            start
        }
    };
    w.end(start)
}

fn encode_function(w: &mut WordWriter, function: &IrFunction) -> Result<(), IrError> {
    let start = w.begin(Opcode::Function);
    w.string(&function.name);
    w.word(function.return_type.0);
    w.word(function.params.len() as u32);
    for param in &function.params {
        w.word(param.ty.0);
        w.string(&param.name);
    }
    w.word(function.value_count);
    w.end(start)?;

    for block in &function.blocks {
        let start = w.begin(Opcode::Label);
        w.word(block.id.0);
        match block.merge {
            None => {
                w.word(0);
                w.word(0);
                w.word(0);
            }
            Some(MergeInfo::Selection { merge }) => {
                w.word(1);
                w.word(merge.0);
                w.word(0);
            }
            Some(MergeInfo::Loop {
                merge,
                continue_target,
            }) => {
                w.word(2);
                w.word(merge.0);
                w.word(continue_target.0);
            }
        }
        w.end(start)?;

        for inst in &block.insts {
            encode_inst(w, inst)?;
        }

        if let Some(term) = &block.terminator {
            let start = match term {
                Terminator::Return => w.begin(Opcode::Return),
                Terminator::ReturnValue(value) => {
                    let start = w.begin(Opcode::ReturnValue);
                    w.operand(value);
                    start
                }
                Terminator::Branch(target) => {
                    let start = w.begin(Opcode::Branch);
                    w.word(target.0);
                    start
                }
                Terminator::CondBranch {
                    condition,
                    accept,
                    reject,
                } => {
                    let start = w.begin(Opcode::CondBranch);
                    w.operand(condition);
                    w.word(accept.0);
                    w.word(reject.0);
                    start
                }
                Terminator::Kill => w.begin(Opcode::Kill),
            };
            w.end(start)?;
        }
    }

    let end = w.begin(Opcode::FunctionEnd);
    w.end(end)
}

fn encode_inst(w: &mut WordWriter, inst: &Inst) -> Result<(), IrError> {
    let opcode = match &inst.op {
        Op::Variable { .. } => Opcode::LocalVariable,
        Op::Load { .. } => Opcode::Load,
        Op::Store { .. } => Opcode::Store,
        Op::AccessChain { .. } => Opcode::AccessChain,
        Op::Binary { .. } => Opcode::Binary,
        Op::Unary { .. } => Opcode::Unary,
        Op::Select { .. } => Opcode::Select,
        Op::Call { .. } => Opcode::Call,
        Op::Intrinsic { .. } => Opcode::Intrinsic,
        Op::Construct { .. } => Opcode::Construct,
        Op::Extract { .. } => Opcode::Extract,
        Op::Shuffle { .. } => Opcode::Shuffle,
        Op::Convert { .. } => Opcode::Convert,
        Op::Sample { .. } => Opcode::Sample,
    };
    let start = w.begin(opcode);
    w.optional(inst.result.map(|r| r.0));
    w.optional(inst.ty.map(|t| t.0));

    match &inst.op {
        Op::Variable { init } => match init {
            Some(init) => {
                w.word(1);
                w.operand(init);
            }
            None => w.word(0),
        },
        Op::Load { pointer } => w.operand(pointer),
        Op::Store { pointer, value } => {
            w.operand(pointer);
            w.operand(value);
        }
        Op::AccessChain { base, indices } => {
            w.operand(base);
            w.operands(indices);
        }
        Op::Binary { op, lhs, rhs } => {
            w.word((*op).into());
            w.operand(lhs);
            w.operand(rhs);
        }
        Op::Unary { op, operand } => {
            w.word((*op).into());
            w.operand(operand);
        }
        Op::Select {
            condition,
            accept,
            reject,
        } => {
            w.operand(condition);
            w.operand(accept);
            w.operand(reject);
        }
        Op::Call { function, args } => {
            w.word(function.0);
            w.operands(args);
        }
        Op::Intrinsic { name, args } => {
            w.string(name);
            w.operands(args);
        }
        Op::Construct { components } => w.operands(components),
        Op::Extract {
            composite,
            indices,
        } => {
            w.operand(composite);
            w.word(indices.len() as u32);
            for index in indices {
                w.word(*index);
            }
        }
        Op::Shuffle { vector, components } => {
            w.operand(vector);
            w.word(components.len() as u32);
            for component in components {
                w.word(*component);
            }
        }
        Op::Convert { operand } => w.operand(operand),
        Op::Sample {
            sampled_image,
            coordinate,
        } => {
            w.operand(sampled_image);
            w.operand(coordinate);
        }
    }
    w.end(start)
}

// ============================================================================
// Decoding
// ============================================================================

/// Reader over the operand words of one instruction.
struct WordReader<'a> {
    words: &'a [u32],
    pos: usize,
    /// Offset of `words[0]` in the whole stream, for error reporting.
    base: usize,
}

impl<'a> WordReader<'a> {
    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn error(&self, detail: impl Into<String>) -> IrError {
        IrError::malformed(self.offset(), detail)
    }

    fn word(&mut self) -> Result<u32, IrError> {
        let word = *self
            .words
            .get(self.pos)
            .ok_or_else(|| self.error("instruction ends early"))?;
        self.pos += 1;
        Ok(word)
    }

    fn optional(&mut self) -> Result<Option<u32>, IrError> {
        Ok(self.word()?.checked_sub(1))
    }

    fn flag(&mut self) -> Result<bool, IrError> {
        match self.word()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.error(format!("expected flag, found {other}"))),
        }
    }

    fn count(&mut self) -> Result<usize, IrError> {
        let count = self.word()? as usize;
        if count > self.words.len() - self.pos.min(self.words.len()) {
            return Err(self.error(format!("count {count} exceeds instruction length")));
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String, IrError> {
        let mut bytes = Vec::new();
        loop {
            let word = self.word()?;
            for i in 0..4 {
                let b = ((word >> (i * 8)) & 0xFF) as u8;
                if b == 0 {
                    return String::from_utf8(bytes).map_err(|_| self.error("invalid UTF-8 string"));
                }
                bytes.push(b);
            }
        }
    }

    fn enumerated<T: TryFrom<u32>>(&mut self, what: &str) -> Result<T, IrError> {
        let raw = self.word()?;
        T::try_from(raw).map_err(|_| self.error(format!("invalid {what} {raw}")))
    }

    fn operand(&mut self) -> Result<Operand, IrError> {
        let tag = self.word()?;
        let value = self.word()?;
        Ok(match tag {
            0 => Operand::Value(ValueId(value)),
            1 => Operand::Const(ConstId(value)),
            2 => Operand::SpecConst(SpecConstId(value)),
            3 => Operand::Global(GlobalId(value)),
            4 => Operand::Param(value),
            _ => return Err(self.error(format!("invalid operand tag {tag}"))),
        })
    }

    fn operands(&mut self) -> Result<Vec<Operand>, IrError> {
        let count = self.count()?;
        (0..count).map(|_| self.operand()).collect()
    }

    fn literals(&mut self) -> Result<Vec<u32>, IrError> {
        let count = self.count()?;
        (0..count).map(|_| self.word()).collect()
    }

    fn finish(&self) -> Result<(), IrError> {
        if self.pos != self.words.len() {
            return Err(self.error("trailing words in instruction"));
        }
        Ok(())
    }
}

/// Decode a module from words.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn decode_module(words: &[u32]) -> Result<IrModule, IrError> {
    if words.len() < HEADER_WORDS {
        return Err(IrError::malformed(words.len(), "stream shorter than header"));
    }
    if words[0] != MAGIC {
        return Err(IrError::malformed(0, format!("bad magic {:#010x}", words[0])));
    }
    if words[1] != VERSION {
        return Err(IrError::malformed(1, format!("unsupported version {:#010x}", words[1])));
    }

    let mut module = IrModule::new();
    let mut pos = HEADER_WORDS;
    let mut section = 0u8;
    let mut function: Option<IrFunction> = None;

    while pos < words.len() {
        let first = words[pos];
        let count = (first >> 16) as usize;
        let raw = (first & 0xFFFF) as u16;
        if count == 0 || pos + count > words.len() {
            return Err(IrError::malformed(pos, format!("invalid word count {count}")));
        }
        let opcode =
            Opcode::try_from(raw).map_err(|_| IrError::malformed(pos, format!("unknown opcode {raw}")))?;
        if opcode.section() < section {
            return Err(IrError::malformed(pos, format!("{opcode:?} out of section order")));
        }
        section = opcode.section();

        let mut r = WordReader {
            words: &words[pos + 1..pos + count],
            pos: 0,
            base: pos + 1,
        };
        let at = pos;
        pos += count;

        match opcode {
            Opcode::Function => {
                if function.is_some() {
                    return Err(IrError::malformed(at, "nested function"));
                }
                let name = r.string()?;
                let return_type = TypeId(r.word()?);
                let param_count = r.count()?;
                let mut params = Vec::with_capacity(param_count);
                for _ in 0..param_count {
                    let ty = TypeId(r.word()?);
                    params.push(FunctionParam { name: r.string()?, ty });
                }
                let mut f = IrFunction::new(name, return_type, params);
                f.value_count = r.word()?;
                function = Some(f);
            }
            Opcode::FunctionEnd => {
                let f = function
                    .take()
                    .ok_or_else(|| IrError::malformed(at, "function end without function"))?;
                module.functions.push(f);
            }
            Opcode::Label => {
                let f = function
                    .as_mut()
                    .ok_or_else(|| IrError::malformed(at, "label outside function"))?;
                let id = BlockId(r.word()?);
                if id.index() != f.blocks.len() {
                    return Err(IrError::malformed(at, format!("block {id} out of order")));
                }
                let kind = r.word()?;
                let merge = BlockId(r.word()?);
                let continue_target = BlockId(r.word()?);
                let mut block = BasicBlock::new(id);
                block.merge = match kind {
                    0 => None,
                    1 => Some(MergeInfo::Selection { merge }),
                    2 => Some(MergeInfo::Loop {
                        merge,
                        continue_target,
                    }),
                    _ => return Err(IrError::malformed(at, format!("invalid merge kind {kind}"))),
                };
                f.blocks.push(block);
            }
            Opcode::Return
            | Opcode::ReturnValue
            | Opcode::Branch
            | Opcode::CondBranch
            | Opcode::Kill => {
                let term = match opcode {
                    Opcode::Return => Terminator::Return,
                    Opcode::ReturnValue => Terminator::ReturnValue(r.operand()?),
                    Opcode::Branch => Terminator::Branch(BlockId(r.word()?)),
                    Opcode::CondBranch => Terminator::CondBranch {
                        condition: r.operand()?,
                        accept: BlockId(r.word()?),
                        reject: BlockId(r.word()?),
                    },
                    _ => Terminator::Kill,
                };
                let block = current_block(&mut function, at)?;
                if block.terminator.is_some() {
                    return Err(IrError::malformed(at, "second terminator in block"));
                }
                block.terminator = Some(term);
            }
            Opcode::LocalVariable
            | Opcode::Load
            | Opcode::Store
            | Opcode::AccessChain
            | Opcode::Binary
            | Opcode::Unary
            | Opcode::Select
            | Opcode::Call
            | Opcode::Intrinsic
            | Opcode::Construct
            | Opcode::Extract
            | Opcode::Shuffle
            | Opcode::Convert
            | Opcode::Sample => {
                let inst = decode_inst(&mut r, opcode)?;
                let block = current_block(&mut function, at)?;
                if block.terminator.is_some() {
                    return Err(IrError::malformed(at, "instruction after terminator"));
                }
                block.insts.push(inst);
            }
            _ => {
                if function.is_some() {
                    return Err(IrError::malformed(at, format!("{opcode:?} inside function")));
                }
                decode_module_level(&mut module, &mut r, opcode, at)?;
            }
        }
        r.finish()?;
    }

    if function.is_some() {
        return Err(IrError::malformed(words.len(), "unterminated function"));
    }
    Ok(module)
}

fn current_block(function: &mut Option<IrFunction>, at: usize) -> Result<&mut BasicBlock, IrError> {
    function
        .as_mut()
        .and_then(|f| f.blocks.last_mut())
        .ok_or_else(|| IrError::malformed(at, "instruction outside block"))
}

fn decode_module_level(
    module: &mut IrModule,
    r: &mut WordReader<'_>,
    opcode: Opcode,
    at: usize,
) -> Result<(), IrError> {
    match opcode {
        Opcode::TypeVoid
        | Opcode::TypeBool
        | Opcode::TypeInt
        | Opcode::TypeFloat
        | Opcode::TypeVector
        | Opcode::TypeMatrix
        | Opcode::TypeArray
        | Opcode::TypeStruct
        | Opcode::TypePointer
        | Opcode::TypeFunction
        | Opcode::TypeSampler
        | Opcode::TypeImage
        | Opcode::TypeSampledImage => {
            let ty = decode_type(r, opcode)?;
            let expected = module.types.len();
            let id = module.types.intern(ty);
            if id.index() != expected {
                return Err(IrError::malformed(at, "duplicate type"));
            }
        }
        Opcode::ConstantTrue
        | Opcode::ConstantFalse
        | Opcode::ConstantInt
        | Opcode::ConstantFloat
        | Opcode::ConstantComposite => {
            let ty = TypeId(r.word()?);
            if module.types.get(ty).is_none() {
                return Err(IrError::malformed(at, format!("constant of unknown type {ty}")));
            }
            let value = match opcode {
                Opcode::ConstantTrue => ConstValue::Bool(true),
                Opcode::ConstantFalse => ConstValue::Bool(false),
                Opcode::ConstantInt => ConstValue::Int(r.word()? as i32),
                Opcode::ConstantFloat => ConstValue::float(f32::from_bits(r.word()?)),
                _ => ConstValue::Composite(r.literals()?.into_iter().map(ConstId).collect()),
            };
            let expected = module.constants.len();
            let id = module.constants.intern(ty, value);
            if id.index() != expected {
                return Err(IrError::malformed(at, "duplicate constant"));
            }
        }
        Opcode::SpecConstant => {
            let ty = TypeId(r.word()?);
            let spec_id = r.word()?;
            let tag = r.word()?;
            let bits = r.word()?;
            let default = match tag {
                0 => ConstValue::Bool(bits != 0),
                1 => ConstValue::Int(bits as i32),
                2 => ConstValue::float(f32::from_bits(bits)),
                _ => return Err(IrError::malformed(at, format!("invalid scalar tag {tag}"))),
            };
            let name = r.string()?;
            module.add_spec_constant(name, ty, spec_id, default);
        }
        Opcode::Variable => {
            let ty = TypeId(r.word()?);
            let storage: StorageClass = r.enumerated("storage class")?;
            let name = r.string()?;
            let decorations = Decorations {
                location: r.optional()?,
                binding: r.optional()?,
                set: r.optional()?,
                builtin: if r.flag()? { Some(r.string()?) } else { None },
            };
            if module
                .types
                .find(&IrType::Pointer { storage, pointee: ty })
                .is_none()
            {
                return Err(IrError::malformed(at, format!("global '{name}' has no pointer type")));
            }
            module.add_global(name, ty, storage, decorations);
        }
        Opcode::EntryPoint => {
            let stage: ShaderStage = r.enumerated("stage")?;
            let function = FuncId(r.word()?);
            let name = r.string()?;
            let interface = r.literals()?.into_iter().map(GlobalId).collect();
            module.entry_points.push(EntryPoint {
                name,
                stage,
                function,
                interface,
            });
        }
        _ => return Err(IrError::malformed(at, format!("unexpected {opcode:?}"))),
    }
    Ok(())
}

fn decode_type(r: &mut WordReader<'_>, opcode: Opcode) -> Result<IrType, IrError> {
    Ok(match opcode {
        Opcode::TypeVoid => IrType::Void,
        Opcode::TypeBool => IrType::Bool,
        Opcode::TypeInt => IrType::Int,
        Opcode::TypeFloat => IrType::Float,
        Opcode::TypeVector => IrType::Vector {
            component: TypeId(r.word()?),
            count: r.word()?,
        },
        Opcode::TypeMatrix => IrType::Matrix {
            column: TypeId(r.word()?),
            columns: r.word()?,
        },
        Opcode::TypeArray => IrType::Array {
            element: TypeId(r.word()?),
            length: r.word()?,
        },
        Opcode::TypeStruct => {
            let name = r.string()?;
            let count = r.count()?;
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                let ty = TypeId(r.word()?);
                let offset = r.optional()?;
                members.push(StructMember {
                    name: r.string()?,
                    ty,
                    offset,
                });
            }
            IrType::Struct { name, members }
        }
        Opcode::TypePointer => IrType::Pointer {
            storage: r.enumerated("storage class")?,
            pointee: TypeId(r.word()?),
        },
        Opcode::TypeFunction => IrType::Function {
            return_type: TypeId(r.word()?),
            params: r.literals()?.into_iter().map(TypeId).collect(),
        },
        Opcode::TypeSampler => IrType::Sampler,
        Opcode::TypeImage => IrType::Image {
            dim: r.enumerated::<ImageDim>("image dimension")?,
            sampled: r.flag()?,
        },
        Opcode::TypeSampledImage => IrType::SampledImage {
            image: TypeId(r.word()?),
        },
        _ => return Err(r.error(format!("{opcode:?} is not a type"))),
    })
}

fn decode_inst(r: &mut WordReader<'_>, opcode: Opcode) -> Result<Inst, IrError> {
    let result = r.optional()?.map(ValueId);
    let ty = r.optional()?.map(TypeId);
    let op = match opcode {
        Opcode::LocalVariable => Op::Variable {
            init: if r.flag()? { Some(r.operand()?) } else { None },
        },
        Opcode::Load => Op::Load {
            pointer: r.operand()?,
        },
        Opcode::Store => Op::Store {
            pointer: r.operand()?,
            value: r.operand()?,
        },
        Opcode::AccessChain => Op::AccessChain {
            base: r.operand()?,
            indices: r.operands()?,
        },
        Opcode::Binary => Op::Binary {
            op: r.enumerated::<BinOp>("binary op")?,
            lhs: r.operand()?,
            rhs: r.operand()?,
        },
        Opcode::Unary => Op::Unary {
            op: r.enumerated::<UnOp>("unary op")?,
            operand: r.operand()?,
        },
        Opcode::Select => Op::Select {
            condition: r.operand()?,
            accept: r.operand()?,
            reject: r.operand()?,
        },
        Opcode::Call => Op::Call {
            function: FuncId(r.word()?),
            args: r.operands()?,
        },
        Opcode::Intrinsic => Op::Intrinsic {
            name: r.string()?,
            args: r.operands()?,
        },
        Opcode::Construct => Op::Construct {
            components: r.operands()?,
        },
        Opcode::Extract => Op::Extract {
            composite: r.operand()?,
            indices: r.literals()?,
        },
        Opcode::Shuffle => Op::Shuffle {
            vector: r.operand()?,
            components: r.literals()?,
        },
        Opcode::Convert => Op::Convert {
            operand: r.operand()?,
        },
        Opcode::Sample => Op::Sample {
            sampled_image: r.operand()?,
            coordinate: r.operand()?,
        },
        _ => return Err(r.error(format!("{opcode:?} is not an instruction"))),
    };
    Ok(Inst { result, ty, op })
}

// ============================================================================
// Bytes
// ============================================================================

/// Little-endian bytes of a word stream.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// Words of a little-endian byte stream.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>, IrError> {
    if bytes.len() % 4 != 0 {
        return Err(IrError::malformed(
            bytes.len() / 4,
            format!("byte length {} is not a multiple of 4", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode a module straight to bytes.
pub fn encode_to_bytes(module: &IrModule) -> Result<Vec<u8>, IrError> {
    Ok(words_to_bytes(&encode_module(module)?))
}

/// Decode a module from bytes.
pub fn decode_bytes(bytes: &[u8]) -> Result<IrModule, IrError> {
    decode_module(&bytes_to_words(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FunctionBuilder, ShortCircuit};
    use crate::types::ScalarKind;

    fn sample_module() -> IrModule {
        let mut module = IrModule::new();
        let void = module.types.void();
        let float = module.types.float();
        let vec4 = module.types.vector(ScalarKind::Float, 4);
        let block = module.types.intern(IrType::Struct {
            name: "Material".into(),
            members: vec![StructMember {
                name: "Tint_Strength".into(),
                ty: float,
                offset: Some(0),
            }],
        });
        let uniforms = module.add_global(
            "Material",
            block,
            StorageClass::Uniform,
            Decorations {
                binding: Some(0),
                ..Decorations::default()
            },
        );
        let output = module.add_global(
            "Target0",
            vec4,
            StorageClass::Output,
            Decorations {
                location: Some(0),
                ..Decorations::default()
            },
        );
        let int = module.types.int();
        module.add_spec_constant("Quality", int, 3, ConstValue::Int(2));

        let main = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, main).unwrap();
        let zero = b.const_int(0);
        let ptr = b.access_chain(Operand::Global(uniforms), vec![zero]).unwrap();
        let strength = b.load(ptr).unwrap();
        let half = b.const_float(0.5);
        let cond = b.binary(BinOp::Gt, strength, half, None).unwrap();
        let t = b.const_bool(true);
        let both = b
            .short_circuit::<IrError>(ShortCircuit::And, cond, |_| Ok(t))
            .unwrap();
        let color = b.construct(vec![strength, strength, strength, strength], vec4).unwrap();
        let black = b.const_float(0.0);
        let black4 = b.construct(vec![black, black, black, black], vec4).unwrap();
        let chosen = b.select(both, color, black4).unwrap();
        b.store(Operand::Global(output), chosen).unwrap();
        b.ret().unwrap();
        b.finish();

        module.entry_points.push(EntryPoint {
            name: "main".into(),
            stage: ShaderStage::Pixel,
            function: main,
            interface: vec![output],
        });
        module
    }

    #[test]
    fn round_trip_preserves_module() {
        let module = sample_module();
        let words = encode_module(&module).unwrap();
        assert_eq!(words[0], MAGIC);
        let decoded = decode_module(&words).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn bytes_round_trip() {
        let module = sample_module();
        let bytes = encode_to_bytes(&module).unwrap();
        assert_eq!(&bytes[..4], &MAGIC.to_le_bytes());
        assert_eq!(decode_bytes(&bytes).unwrap(), module);
    }

    #[test]
    fn string_packing() {
        let mut w = WordWriter::default();
        w.string("abcd");
        assert_eq!(w.words.len(), 2);
        assert_eq!(w.words[1], 0);
        let mut r = WordReader {
            words: &w.words,
            pos: 0,
            base: 0,
        };
        assert_eq!(r.string().unwrap(), "abcd");
    }

    #[test]
    fn bad_magic_rejected() {
        let mut words = encode_module(&sample_module()).unwrap();
        words[0] = 0xDEAD_BEEF;
        assert!(matches!(decode_module(&words), Err(IrError::Malformed { offset: 0, .. })));
    }

    #[test]
    fn truncated_stream_rejected() {
        let words = encode_module(&sample_module()).unwrap();
        let cut = &words[..words.len() - 3];
        assert!(matches!(decode_module(cut), Err(IrError::Malformed { .. })));
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut words = encode_module(&IrModule::new()).unwrap();
        words.push((1 << 16) | 999);
        let error = decode_module(&words).unwrap_err();
        assert!(matches!(error, IrError::Malformed { offset: 5, .. }));
    }

    #[test]
    fn odd_byte_length_rejected() {
        assert!(bytes_to_words(&[1, 2, 3]).is_err());
    }
}
