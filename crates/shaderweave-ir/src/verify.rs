//! Structural verification of IR modules.

use crate::error::IrError;
use crate::function::{IrFunction, Op, Operand, Terminator};
use crate::module::IrModule;
use crate::types::{IrType, TypeId};

/// Check every structural rule of a module, collecting all violations.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn verify_module(module: &IrModule) -> Result<(), Vec<IrError>> {
    let mut errors = Vec::new();

    for (id, ty) in module.types.iter() {
        let mut refs = Vec::new();
        match ty {
            IrType::Vector { component, .. } => refs.push(*component),
            IrType::Matrix { column, .. } => refs.push(*column),
            IrType::Array { element, .. } => refs.push(*element),
            IrType::Struct { members, .. } => refs.extend(members.iter().map(|m| m.ty)),
            IrType::Pointer { pointee, .. } => refs.push(*pointee),
            IrType::Function { return_type, params } => {
                refs.push(*return_type);
                refs.extend(params.iter().copied());
            }
            IrType::SampledImage { image } => refs.push(*image),
            _ => {}
        }
        if refs.iter().any(|r| r.0 >= id.0) {
            errors.push(IrError::verify(
                "<module>",
                format!("type {id}"),
                "type refers to a later or unknown type",
            ));
        }
    }

    for function in &module.functions {
        verify_function(module, function, &mut errors);
    }

    for entry in &module.entry_points {
        if module.function(entry.function).is_none() {
            errors.push(IrError::verify(
                &entry.name,
                "entry point",
                "entry point names an unknown function",
            ));
        }
        if entry.interface.iter().any(|g| module.global(*g).is_none()) {
            errors.push(IrError::verify(
                &entry.name,
                "entry point",
                "interface lists an unknown global",
            ));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn verify_function(module: &IrModule, function: &IrFunction, errors: &mut Vec<IrError>) {
    let name = function.name.as_str();
    if function.blocks.is_empty() {
        errors.push(IrError::verify(name, "body", "function has no blocks"));
        return;
    }

    let value_types = function.value_types();
    let types = &module.types;
    let block_exists = |id: crate::BlockId| id.index() < function.blocks.len();
    let returns_void = matches!(types.get(function.return_type), Some(IrType::Void));

    let operand_ok = |operand: &Operand| -> bool {
        match *operand {
            Operand::Value(v) => value_types.get(v.index()).is_some_and(Option::is_some),
            Operand::Const(c) => module.constants.get(c).is_some(),
            Operand::SpecConst(s) => s.index() < module.spec_constants.len(),
            Operand::Global(g) => module.global(g).is_some(),
            Operand::Param(i) => (i as usize) < function.params.len(),
        }
    };
    let type_of = |operand: Operand| module.operand_type(function, &value_types, operand);
    let is_pointer = |operand: Operand| type_of(operand).is_some_and(|t| types.is_pointer(t));
    let is_value = |operand: Operand| {
        type_of(operand).is_some_and(|t| types.get(t).is_some_and(IrType::is_value))
    };

    for (index, block) in function.blocks.iter().enumerate() {
        let location = format!("block {}", block.id);
        if block.id.index() != index {
            errors.push(IrError::verify(name, &location, "block id does not match its position"));
        }

        for inst in &block.insts {
            let mut bad_operand = false;
            inst.op.for_each_operand(|o| bad_operand |= !operand_ok(o));
            if bad_operand {
                errors.push(IrError::verify(
                    name,
                    &location,
                    format!("'{}' uses an undefined operand", inst.op.mnemonic()),
                ));
                continue;
            }

            if inst.result.is_some() != inst.ty.is_some() {
                errors.push(IrError::verify(
                    name,
                    &location,
                    format!("'{}' has a result without a type", inst.op.mnemonic()),
                ));
            }
            let produces_value = !matches!(inst.op, Op::Store { .. } | Op::Call { .. } | Op::Intrinsic { .. });
            if produces_value && inst.ty.is_none() {
                errors.push(IrError::verify(
                    name,
                    &location,
                    format!("'{}' produces a value but has no result type", inst.op.mnemonic()),
                ));
            }
            if matches!(inst.op, Op::Store { .. }) && inst.result.is_some() {
                errors.push(IrError::verify(name, &location, "store has a result"));
            }

            let message = match &inst.op {
                Op::Variable { .. } => inst
                    .ty
                    .filter(|t| types.is_pointer(*t))
                    .is_none()
                    .then_some("variable result is not a pointer"),
                Op::Load { pointer } => (!is_pointer(*pointer)).then_some("load operand is not a pointer"),
                Op::Store { pointer, value } => {
                    if !is_pointer(*pointer) {
                        Some("store target is not a pointer")
                    } else if !is_value(*value) {
                        Some("stored operand is not a value")
                    } else {
                        None
                    }
                }
                Op::AccessChain { base, .. } => {
                    (!is_pointer(*base)).then_some("access chain base is not a pointer")
                }
                Op::Binary { lhs, rhs, .. } => {
                    (!is_value(*lhs) || !is_value(*rhs)).then_some("binary operand is not a value")
                }
                Op::Unary { operand, .. } | Op::Convert { operand } => {
                    (!is_value(*operand)).then_some("unary operand is not a value")
                }
                Op::Call { function: callee, args } => match module.function(*callee) {
                    None => Some("call to unknown function"),
                    Some(f) if f.params.len() != args.len() => Some("call arity does not match callee"),
                    Some(_) => None,
                },
                _ => None,
            };
            if let Some(message) = message {
                errors.push(IrError::verify(name, &location, message));
            }
        }

        match &block.terminator {
            None => errors.push(IrError::verify(name, &location, "block has no terminator")),
            Some(term) => {
                if term.successors().into_iter().any(|s| !block_exists(s)) {
                    errors.push(IrError::verify(name, &location, "branch to unknown block"));
                }
                let mut bad_operand = false;
                term.for_each_operand(|o| bad_operand |= !operand_ok(o));
                if bad_operand {
                    errors.push(IrError::verify(name, &location, "terminator uses an undefined operand"));
                }
                match term {
                    Terminator::Return if !returns_void => {
                        errors.push(IrError::verify(name, &location, "missing return value"));
                    }
                    Terminator::ReturnValue(_) if returns_void => {
                        errors.push(IrError::verify(name, &location, "void function returns a value"));
                    }
                    _ => {}
                }
            }
        }

        if let Some(merge) = block.merge {
            let missing = match merge {
                crate::MergeInfo::Selection { merge } => !block_exists(merge),
                crate::MergeInfo::Loop {
                    merge,
                    continue_target,
                } => !block_exists(merge) || !block_exists(continue_target),
            };
            if missing {
                errors.push(IrError::verify(name, &location, "merge block does not exist"));
            }
        }
    }
}

/// Type of an operand, for callers outside a builder.
pub fn operand_type(module: &IrModule, function: &IrFunction, operand: Operand) -> Option<TypeId> {
    module.operand_type(function, &function.value_types(), operand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::function::{BasicBlock, BlockId, Inst, ValueId};

    #[test]
    fn well_formed_module_verifies() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let id = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        let float = b.module().types.float();
        let var = b.variable(float, None).unwrap();
        let one = b.const_float(1.0);
        b.store(var, one).unwrap();
        b.ret().unwrap();
        b.finish();
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn missing_terminator_reported() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let id = module.declare_function("main", void, Vec::new());
        FunctionBuilder::new(&mut module, id).unwrap().finish();
        let errors = verify_module(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("no terminator")));
    }

    #[test]
    fn load_from_value_reported() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let float = module.types.float();
        let c = module.constants.intern(float, crate::ConstValue::float(2.0));
        let id = module.declare_function("main", void, Vec::new());
        let function = &mut module.functions[id.index()];
        let mut block = BasicBlock::new(BlockId(0));
        block.insts.push(Inst {
            result: Some(ValueId(0)),
            ty: Some(float),
            op: Op::Load { pointer: Operand::Const(c) },
        });
        block.terminator = Some(Terminator::Return);
        function.blocks.push(block);
        function.value_count = 1;
        let errors = verify_module(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("not a pointer")));
    }

    #[test]
    fn branch_target_must_exist() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let id = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, id).unwrap();
        b.branch(BlockId(9)).unwrap();
        b.finish();
        let errors = verify_module(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("unknown block")));
    }

    #[test]
    fn call_arity_checked() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let float = module.types.float();
        let callee = module.declare_function(
            "f",
            void,
            vec![crate::FunctionParam { name: "x".into(), ty: float }],
        );
        let mut b = FunctionBuilder::new(&mut module, callee).unwrap();
        b.ret().unwrap();
        b.finish();
        let main = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, main).unwrap();
        b.call(callee, Vec::new()).unwrap();
        b.ret().unwrap();
        b.finish();
        let errors = verify_module(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("arity")));
    }
}
