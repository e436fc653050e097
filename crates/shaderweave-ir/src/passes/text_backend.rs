//! GLSL-flavoured text reconstruction from binary IR.
//!
//! Structured control flow is recovered from merge information: a
//! selection header becomes `if`/`else`, a loop header becomes
//! `while (true)` whose body ends by inlining the continue block. Branches
//! to the innermost loop's merge become `break`, branches to its continue
//! target inline the continue block and `continue`.

use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};
use shaderweave_core::PassError;

use super::{PassInput, PassOutput, TranslationPass, decode_input};
use crate::constant::{ConstId, ConstValue};
use crate::function::{BinOp, BlockId, IrFunction, MergeInfo, Op, Operand, Terminator, ValueId};
use crate::module::IrModule;
use crate::types::{IrType, StorageClass, TypeId};

const MAX_NESTING: usize = 128;

/// Reconstructs text from the binary. The output bytes are the UTF-8 text;
/// reflection passes through.
#[derive(Debug, Clone)]
pub struct TextBackend {
    /// Written as `#version N`.
    pub version: u32,
}

impl Default for TextBackend {
    fn default() -> Self {
        Self { version: 450 }
    }
}

impl TranslationPass for TextBackend {
    fn name(&self) -> &str {
        "text"
    }

    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError> {
        let module = decode_input(self.name(), input)?;
        let text = emit_module(&module, self.version).map_err(|m| PassError::failed(self.name(), m))?;
        let mut output = PassOutput::passthrough(self.name(), input);
        output.bytes = text.clone().into_bytes();
        output.text = Some(text);
        Ok(output)
    }
}

/// Render a whole module.
pub fn emit_module(module: &IrModule, version: u32) -> Result<String, String> {
    let mut out = String::new();
    let _ = writeln!(out, "#version {version}");
    if let Some(entry) = module.entry_points.first() {
        let _ = writeln!(out, "// stage: {}", entry.stage);
    }
    out.push('\n');

    let blocks: FxHashSet<TypeId> = module
        .globals
        .iter()
        .filter(|g| g.storage == StorageClass::Uniform)
        .map(|g| g.ty)
        .collect();

    let mut wrote_struct = false;
    for (id, ty) in module.types.iter() {
        if let IrType::Struct { name, members } = ty {
            if blocks.contains(&id) {
                continue;
            }
            let _ = writeln!(out, "struct {name}\n{{");
            for member in members {
                let _ = writeln!(out, "  {};", declare(module, member.ty, &member.name));
            }
            out.push_str("};\n");
            wrote_struct = true;
        }
    }
    if wrote_struct {
        out.push('\n');
    }

    for spec in &module.spec_constants {
        let _ = writeln!(
            out,
            "layout(constant_id = {}) const {} {} = {};",
            spec.spec_id,
            module.types.display(spec.ty),
            spec.name,
            scalar_literal(&spec.default)
        );
    }

    for global in &module.globals {
        if global.decorations.builtin.is_some() {
            continue;
        }
        let d = &global.decorations;
        let declaration = declare(module, global.ty, &global.name);
        match global.storage {
            StorageClass::Input | StorageClass::Output => {
                let direction = if global.storage == StorageClass::Input { "in" } else { "out" };
                match d.location {
                    Some(location) => {
                        let _ = writeln!(out, "layout(location = {location}) {direction} {declaration};");
                    }
                    None => {
                        let _ = writeln!(out, "{direction} {declaration};");
                    }
                }
            }
            StorageClass::Uniform => {
                let (block_name, members) = match module.types.get(global.ty) {
                    Some(IrType::Struct { name, members }) => (name.as_str(), members.as_slice()),
                    _ => return Err(format!("uniform '{}' is not a block", global.name)),
                };
                let _ = writeln!(
                    out,
                    "layout(std140, binding = {}) uniform {block_name}\n{{",
                    d.binding.unwrap_or(0)
                );
                for member in members {
                    match member.offset {
                        Some(offset) => {
                            let _ = writeln!(
                                out,
                                "  layout(offset = {offset}) {};",
                                declare(module, member.ty, &member.name)
                            );
                        }
                        None => {
                            let _ = writeln!(out, "  {};", declare(module, member.ty, &member.name));
                        }
                    }
                }
                let _ = writeln!(out, "}} {};", global.name);
            }
            StorageClass::UniformConstant => {
                let _ = writeln!(
                    out,
                    "layout(binding = {}) uniform {declaration};",
                    d.binding.unwrap_or(0)
                );
            }
            StorageClass::StorageBuffer => {
                let _ = writeln!(
                    out,
                    "layout(std430, binding = {}) buffer {}_Buffer {{ {declaration}; }};",
                    d.binding.unwrap_or(0),
                    global.name
                );
            }
            StorageClass::Private | StorageClass::Function => {
                let _ = writeln!(out, "{declaration};");
            }
        }
    }
    out.push('\n');

    let entry_functions: FxHashSet<usize> = module
        .entry_points
        .iter()
        .map(|e| e.function.index())
        .collect();
    let mut prototypes = false;
    for (index, function) in module.functions.iter().enumerate() {
        if !entry_functions.contains(&index) {
            let _ = writeln!(out, "{};", signature(module, function));
            prototypes = true;
        }
    }
    if prototypes {
        out.push('\n');
    }

    for (index, function) in module.functions.iter().enumerate() {
        let mut emitter = FunctionEmitter::new(module, function);
        let body = emitter.emit_body()?;
        let header = if entry_functions.contains(&index) {
            "void main()".to_string()
        } else {
            signature(module, function)
        };
        let _ = writeln!(out, "{header}\n{{\n{body}}}\n");
    }

    Ok(out)
}

fn declare(module: &IrModule, ty: TypeId, name: &str) -> String {
    match module.types.get(ty) {
        Some(IrType::Array { element, length }) => {
            format!("{} {name}[{length}]", module.types.display(*element))
        }
        _ => format!("{} {name}", module.types.display(ty)),
    }
}

fn signature(module: &IrModule, function: &IrFunction) -> String {
    let params: Vec<String> = function
        .params
        .iter()
        .map(|p| match module.types.pointee(p.ty) {
            Some(pointee) => format!("inout {}", declare(module, pointee, &p.name)),
            None => declare(module, p.ty, &p.name),
        })
        .collect();
    format!(
        "{} {}({})",
        module.types.display(function.return_type),
        function.name,
        params.join(", ")
    )
}

fn scalar_literal(value: &ConstValue) -> String {
    match value {
        ConstValue::Bool(b) => b.to_string(),
        ConstValue::Int(i) => i.to_string(),
        ConstValue::Float(f) => float_literal(f.0),
        ConstValue::Composite(_) => "<composite>".into(),
    }
}

fn float_literal(value: f32) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{value:.1}")
    } else {
        format!("{value:?}")
    }
}

/// Loop context for `break`/`continue`.
#[derive(Clone, Copy)]
struct LoopFrame {
    merge: BlockId,
    continue_target: BlockId,
    header: BlockId,
}

struct FunctionEmitter<'a> {
    module: &'a IrModule,
    function: &'a IrFunction,
    value_types: Vec<Option<TypeId>>,
    /// Values that are rendered as expressions instead of named locals.
    inline: FxHashMap<ValueId, String>,
    out: String,
    indent: usize,
    loops: Vec<LoopFrame>,
    depth: usize,
}

impl<'a> FunctionEmitter<'a> {
    fn new(module: &'a IrModule, function: &'a IrFunction) -> Self {
        Self {
            module,
            function,
            value_types: function.value_types(),
            inline: FxHashMap::default(),
            out: String::new(),
            indent: 1,
            loops: Vec::new(),
            depth: 0,
        }
    }

    fn emit_body(&mut self) -> Result<String, String> {
        if self.function.blocks.is_empty() {
            return Ok(String::new());
        }
        self.emit_region(BlockId(0), None)?;
        Ok(std::mem::take(&mut self.out))
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    // =========================================
    // Operands
    // =========================================

    fn constant(&self, id: ConstId) -> String {
        let Some(constant) = self.module.constants.get(id) else {
            return format!("<const {}>", id.0);
        };
        match &constant.value {
            ConstValue::Composite(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| self.constant(*p)).collect();
                format!("{}({})", self.module.types.display(constant.ty), parts.join(", "))
            }
            scalar => scalar_literal(scalar),
        }
    }

    fn operand(&self, operand: Operand) -> String {
        match operand {
            Operand::Value(v) => self.inline.get(&v).cloned().unwrap_or_else(|| format!("_{}", v.0)),
            Operand::Const(c) => self.constant(c),
            Operand::SpecConst(s) => self
                .module
                .spec_constants
                .get(s.index())
                .map_or_else(|| format!("<spec {}>", s.0), |s| s.name.clone()),
            Operand::Global(g) => match self.module.global(g) {
                Some(global) => global
                    .decorations
                    .builtin
                    .clone()
                    .unwrap_or_else(|| global.name.clone()),
                None => format!("<global {}>", g.0),
            },
            Operand::Param(i) => self
                .function
                .params
                .get(i as usize)
                .map_or_else(|| format!("<param {i}>"), |p| p.name.clone()),
        }
    }

    fn operand_type(&self, operand: Operand) -> Option<TypeId> {
        self.module.operand_type(self.function, &self.value_types, operand)
    }

    fn is_vector(&self, operand: Operand) -> bool {
        self.operand_type(operand)
            .and_then(|t| self.module.types.get(t))
            .is_some_and(|t| matches!(t, IrType::Vector { .. }))
    }

    fn is_float(&self, operand: Operand) -> bool {
        self.operand_type(operand).and_then(|t| self.module.types.scalar_kind(t))
            == Some(crate::types::ScalarKind::Float)
    }

    fn args(&self, args: &[Operand]) -> String {
        args.iter()
            .map(|a| self.operand(*a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Path suffix for indexing into `ty` with `index`, plus the element
    /// type.
    fn index_path(&self, ty: TypeId, index: String, literal: Option<u32>) -> (String, Option<TypeId>) {
        let types = &self.module.types;
        match (types.get(ty), literal) {
            (Some(IrType::Struct { members, .. }), Some(i)) => match members.get(i as usize) {
                Some(member) => (format!(".{}", member.name), Some(member.ty)),
                None => (format!("[{index}]"), None),
            },
            (Some(IrType::Vector { .. }), Some(i)) if i < 4 => {
                (format!(".{}", ["x", "y", "z", "w"][i as usize]), types.member_type(ty, i))
            }
            _ => (format!("[{index}]"), literal.and_then(|i| types.member_type(ty, i))),
        }
    }

    fn const_index(&self, operand: Operand) -> Option<u32> {
        match operand {
            Operand::Const(c) => match self.module.constants.get(c).map(|c| &c.value) {
                Some(ConstValue::Int(i)) => u32::try_from(*i).ok(),
                _ => None,
            },
            _ => None,
        }
    }

    // =========================================
    // Instructions
    // =========================================

    fn emit_inst(&mut self, inst: &crate::function::Inst) {
        let module: &'a IrModule = self.module;
        let types = &module.types;
        let ty_name = |ty: Option<TypeId>| ty.map_or_else(|| "void".to_string(), |t| types.display(t));
        let name = inst.result.map(|r| format!("_{}", r.0));

        let expr = match &inst.op {
            Op::Variable { init } => {
                let pointee = inst.ty.and_then(|t| types.pointee(t));
                let declaration = match (pointee, &name) {
                    (Some(p), Some(n)) => declare(self.module, p, n),
                    _ => "<variable>".into(),
                };
                match init {
                    Some(init) => self.line(&format!("{declaration} = {};", self.operand(*init))),
                    None => self.line(&format!("{declaration};")),
                }
                return;
            }
            Op::Store { pointer, value } => {
                self.line(&format!("{} = {};", self.operand(*pointer), self.operand(*value)));
                return;
            }
            Op::AccessChain { base, indices } => {
                let mut path = self.operand(*base);
                let mut ty = self.operand_type(*base).and_then(|t| types.pointee(t));
                for index in indices {
                    let Some(current) = ty else {
                        break;
                    };
                    let (suffix, next) =
                        self.index_path(current, self.operand(*index), self.const_index(*index));
                    path.push_str(&suffix);
                    ty = next;
                }
                if let Some(result) = inst.result {
                    self.inline.insert(result, path);
                }
                return;
            }
            Op::Load { pointer } => self.operand(*pointer),
            Op::Binary { op, lhs, rhs } => {
                let (l, r) = (self.operand(*lhs), self.operand(*rhs));
                let vector = self.is_vector(*lhs);
                match op {
                    BinOp::Lt if vector => format!("lessThan({l}, {r})"),
                    BinOp::Le if vector => format!("lessThanEqual({l}, {r})"),
                    BinOp::Gt if vector => format!("greaterThan({l}, {r})"),
                    BinOp::Ge if vector => format!("greaterThanEqual({l}, {r})"),
                    BinOp::Eq if vector => format!("equal({l}, {r})"),
                    BinOp::Ne if vector => format!("notEqual({l}, {r})"),
                    BinOp::Rem if self.is_float(*lhs) => format!("mod({l}, {r})"),
                    _ => format!("{l} {} {r}", op.as_str()),
                }
            }
            Op::Unary { op, operand } => format!("{}{}", op.as_str(), self.operand(*operand)),
            Op::Select {
                condition,
                accept,
                reject,
            } => {
                let (c, a, r) = (self.operand(*condition), self.operand(*accept), self.operand(*reject));
                if self.is_vector(*condition) {
                    format!("mix({r}, {a}, {c})")
                } else {
                    format!("{c} ? {a} : {r}")
                }
            }
            Op::Call { function, args } => {
                let callee = self
                    .module
                    .function(*function)
                    .map_or_else(|| format!("<fn {}>", function.0), |f| f.name.clone());
                format!("{callee}({})", self.args(args))
            }
            Op::Intrinsic { name, args } => format!("{name}({})", self.args(args)),
            Op::Construct { components } => format!("{}({})", ty_name(inst.ty), self.args(components)),
            Op::Extract { composite, indices } => {
                let mut path = self.operand(*composite);
                let mut ty = self.operand_type(*composite);
                for &index in indices {
                    let Some(current) = ty else {
                        break;
                    };
                    let (suffix, next) = self.index_path(current, index.to_string(), Some(index));
                    path.push_str(&suffix);
                    ty = next;
                }
                path
            }
            Op::Shuffle { vector, components } => {
                let letters: String = components
                    .iter()
                    .map(|c| ['x', 'y', 'z', 'w'].get(*c as usize).copied().unwrap_or('?'))
                    .collect();
                format!("{}.{letters}", self.operand(*vector))
            }
            Op::Convert { operand } => format!("{}({})", ty_name(inst.ty), self.operand(*operand)),
            Op::Sample {
                sampled_image,
                coordinate,
            } => format!("texture({}, {})", self.operand(*sampled_image), self.operand(*coordinate)),
        };

        match (name, inst.ty) {
            (Some(name), Some(ty)) => self.line(&format!("{} = {expr};", declare(self.module, ty, &name))),
            _ => self.line(&format!("{expr};")),
        }
    }

    // =========================================
    // Control flow
    // =========================================

    fn block(&self, id: BlockId) -> Result<&'a crate::function::BasicBlock, String> {
        let function: &'a IrFunction = self.function;
        function
            .block(id)
            .ok_or_else(|| format!("branch to missing block {id} in '{}'", self.function.name))
    }

    /// Emit straight-line code from `start` until reaching `end` or a
    /// terminator that leaves the region.
    fn emit_region(&mut self, start: BlockId, end: Option<BlockId>) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("control flow in '{}' is nested too deeply", self.function.name));
        }
        let result = self.emit_region_inner(start, end);
        self.depth -= 1;
        result
    }

    fn emit_region_inner(&mut self, start: BlockId, end: Option<BlockId>) -> Result<(), String> {
        let mut visited = FxHashSet::default();
        let mut current = start;
        loop {
            if Some(current) == end {
                return Ok(());
            }
            if !visited.insert(current) {
                return Err(format!("unstructured control flow at {current} in '{}'", self.function.name));
            }
            let block = self.block(current)?;

            if let Some(MergeInfo::Loop {
                merge,
                continue_target,
            }) = block.merge
            {
                self.line("while (true)");
                self.line("{");
                self.indent += 1;
                self.loops.push(LoopFrame {
                    merge,
                    continue_target,
                    header: current,
                });
                for inst in &block.insts {
                    self.emit_inst(inst);
                }
                let result = self
                    .emit_terminator(block.terminator.as_ref(), None, None)
                    .and_then(|next| match next {
                        Some(next) => self.emit_region(next, None),
                        None => Ok(()),
                    });
                self.loops.pop();
                self.indent -= 1;
                self.line("}");
                result?;
                current = merge;
                continue;
            }

            for inst in &block.insts {
                self.emit_inst(inst);
            }

            let selection = match block.merge {
                Some(MergeInfo::Selection { merge }) => Some(merge),
                _ => None,
            };
            match self.emit_terminator(block.terminator.as_ref(), end, selection)? {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }

    /// Emit a terminator. Returns the block to continue with inside the
    /// current region, or `None` when the region is finished.
    fn emit_terminator(
        &mut self,
        terminator: Option<&Terminator>,
        end: Option<BlockId>,
        selection: Option<BlockId>,
    ) -> Result<Option<BlockId>, String> {
        let Some(terminator) = terminator else {
            return Err(format!("unterminated block in '{}'", self.function.name));
        };
        match terminator {
            Terminator::Return => {
                self.line("return;");
                Ok(None)
            }
            Terminator::ReturnValue(value) => {
                self.line(&format!("return {};", self.operand(*value)));
                Ok(None)
            }
            Terminator::Kill => {
                self.line("discard;");
                Ok(None)
            }
            Terminator::Branch(target) => self.emit_jump(*target, end),
            Terminator::CondBranch {
                condition,
                accept,
                reject,
            } => {
                let condition = self.operand(*condition);
                if let Some(merge) = selection {
                    self.emit_selection(&condition, *accept, *reject, merge)?;
                    return Ok(if Some(merge) == end { None } else { Some(merge) });
                }
                let frame = self.loops.last().copied();
                match frame {
                    Some(frame) if *reject == frame.merge => {
                        self.line(&format!("if (!({condition}))"));
                        self.line("  break;");
                        self.emit_jump(*accept, end)
                    }
                    Some(frame) if *accept == frame.merge => {
                        self.line(&format!("if ({condition})"));
                        self.line("  break;");
                        self.emit_jump(*reject, end)
                    }
                    _ => Err(format!(
                        "conditional branch without merge information in '{}'",
                        self.function.name
                    )),
                }
            }
        }
    }

    fn emit_jump(&mut self, target: BlockId, end: Option<BlockId>) -> Result<Option<BlockId>, String> {
        if Some(target) == end {
            return Ok(None);
        }
        if let Some(frame) = self.loops.last().copied() {
            if target == frame.merge {
                self.line("break;");
                return Ok(None);
            }
            if target == frame.continue_target {
                self.emit_continue_block(frame)?;
                return Ok(None);
            }
            if target == frame.header {
                self.line("continue;");
                return Ok(None);
            }
        }
        Ok(Some(target))
    }

    /// Inline the continue block of `frame` followed by `continue`.
    fn emit_continue_block(&mut self, frame: LoopFrame) -> Result<(), String> {
        let block = self.block(frame.continue_target)?;
        self.line("{");
        self.indent += 1;
        for inst in &block.insts {
            self.emit_inst(inst);
        }
        match &block.terminator {
            Some(Terminator::Branch(target)) if *target == frame.header => {}
            Some(Terminator::CondBranch {
                condition,
                accept,
                reject,
            }) if *accept == frame.header && *reject == frame.merge => {
                let condition = self.operand(*condition);
                self.line(&format!("if (!({condition}))"));
                self.line("  break;");
            }
            _ => {
                return Err(format!(
                    "continue block of '{}' does not return to its loop header",
                    self.function.name
                ));
            }
        }
        self.indent -= 1;
        self.line("}");
        self.line("continue;");
        Ok(())
    }

    fn emit_selection(
        &mut self,
        condition: &str,
        accept: BlockId,
        reject: BlockId,
        merge: BlockId,
    ) -> Result<(), String> {
        if accept == merge {
            self.line(&format!("if (!({condition}))"));
            self.emit_arm(reject, merge)?;
            return Ok(());
        }
        self.line(&format!("if ({condition})"));
        self.emit_arm(accept, merge)?;
        if reject != merge {
            self.line("else");
            self.emit_arm(reject, merge)?;
        }
        Ok(())
    }

    fn emit_arm(&mut self, start: BlockId, merge: BlockId) -> Result<(), String> {
        self.line("{");
        self.indent += 1;
        let result = self.emit_region(start, Some(merge));
        self.indent -= 1;
        self.line("}");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FunctionBuilder, ShortCircuit};
    use crate::error::IrError;
    use crate::function::FunctionParam;
    use crate::passes::test_module::pixel_module;
    use crate::types::ScalarKind;

    #[test]
    fn declares_interface() {
        let text = emit_module(&pixel_module(), 450).unwrap();
        assert!(text.starts_with("#version 450"));
        assert!(text.contains("layout(location = 0) in vec2 Uv;"));
        assert!(text.contains("layout(location = 0) out vec4 Target0;"));
        assert!(text.contains("uniform Material_Block"));
        assert!(text.contains("} Material;"));
        assert!(text.contains("layout(binding = 2) uniform sampler2D Surface_Albedo;"));
        assert!(text.contains("layout(constant_id = 0) const int Quality = 2;"));
        assert!(text.contains("float _1 = Material.Surface_Strength;"));
        assert!(text.contains("texture("));
    }

    #[test]
    fn loop_and_selection_reconstructed() {
        let mut module = IrModule::new();
        let int = module.types.int();
        let f = module.declare_function(
            "count",
            int,
            vec![FunctionParam {
                name: "limit".into(),
                ty: int,
            }],
        );
        let mut b = FunctionBuilder::new(&mut module, f).unwrap();
        let zero = b.const_int(0);
        let i = b.variable(int, Some(zero)).unwrap();
        let header = b.create_block();
        let cond_block = b.create_block();
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
        b.branch(cond_block).unwrap();

        b.switch_to(cond_block);
        let value = b.load(i).unwrap();
        let c = b.binary(BinOp::Lt, value, Operand::Param(0), None).unwrap();
        b.cond_branch(c, body, merge).unwrap();

        b.switch_to(body);
        let t = b.const_bool(true);
        let both = b
            .short_circuit::<IrError>(ShortCircuit::And, c, |_| Ok(t))
            .unwrap();
        let then_block = b.create_block();
        let join = b.create_block();
        let here = b.current_block();
        b.set_merge(here, MergeInfo::Selection { merge: join });
        b.cond_branch(both, then_block, join).unwrap();
        b.switch_to(then_block);
        b.branch(cont).unwrap();
        b.switch_to(join);
        b.branch(cont).unwrap();

        b.switch_to(cont);
        let value = b.load(i).unwrap();
        let one = b.const_int(1);
        let next = b.binary(BinOp::Add, value, one, None).unwrap();
        b.store(i, next).unwrap();
        b.branch(header).unwrap();

        b.switch_to(merge);
        let result = b.load(i).unwrap();
        b.ret_value(result).unwrap();
        b.finish();

        let text = emit_module(&module, 450).unwrap();
        assert!(text.contains("int count(int limit);"));
        assert!(text.contains("while (true)"));
        assert!(text.contains("break;"));
        assert!(text.contains("continue;"));
        assert!(text.contains("if ("));
        assert!(text.contains("return _"));
    }

    #[test]
    fn vector_comparison_uses_intrinsic() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let vec2 = module.types.vector(ScalarKind::Float, 2);
        let f = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, f).unwrap();
        let one = b.const_float(1.0);
        let v = b.construct(vec![one, one], vec2).unwrap();
        b.binary(BinOp::Lt, v, v, None).unwrap();
        b.ret().unwrap();
        b.finish();
        let text = emit_module(&module, 450).unwrap();
        assert!(text.contains("bvec2 _1 = lessThan(_0, _0);"));
        assert!(text.contains("vec2 _0 = vec2(1.0, 1.0);"));
    }
}
