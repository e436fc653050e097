use rustc_hash::{FxHashMap, FxHashSet};
use shaderweave_core::PassError;

use super::{PassInput, PassOutput, TranslationPass, decode_input};
use crate::constant::ConstValue;
use crate::function::{Op, Operand};
use crate::layout;
use crate::module::{GlobalId, IrModule};
use crate::types::{IrType, StorageClass};

/// Removes uniform members and opaque resources no instruction references,
/// then renumbers the remaining bindings densely from zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadResourceElimination;

/// Which globals and uniform members the code touches.
#[derive(Default)]
struct Usage {
    globals: FxHashSet<GlobalId>,
    /// Uniform members used, keyed by global. A global present in
    /// `globals` but absent here is used whole.
    members: FxHashMap<GlobalId, FxHashSet<u32>>,
    whole: FxHashSet<GlobalId>,
}

fn collect_usage(module: &IrModule) -> Usage {
    let mut usage = Usage::default();
    for entry in &module.entry_points {
        usage.globals.extend(entry.interface.iter().copied());
    }
    for function in &module.functions {
        for block in &function.blocks {
            for inst in &block.insts {
                if let Op::AccessChain {
                    base: Operand::Global(global),
                    indices,
                } = &inst.op
                {
                    usage.globals.insert(*global);
                    let first = indices.first().and_then(|index| match index {
                        Operand::Const(c) => match module.constants.get(*c).map(|c| &c.value) {
                            Some(ConstValue::Int(i)) => u32::try_from(*i).ok(),
                            _ => None,
                        },
                        _ => None,
                    });
                    match first {
                        Some(member) => {
                            usage.members.entry(*global).or_default().insert(member);
                        }
                        None => {
                            usage.whole.insert(*global);
                        }
                    }
                    for index in indices {
                        if let Operand::Global(g) = index {
                            usage.globals.insert(*g);
                            usage.whole.insert(*g);
                        }
                    }
                    continue;
                }
                inst.op.for_each_operand(|operand| {
                    if let Operand::Global(g) = operand {
                        usage.globals.insert(*g);
                        usage.whole.insert(*g);
                    }
                });
            }
            if let Some(term) = &block.terminator {
                term.for_each_operand(|operand| {
                    if let Operand::Global(g) = operand {
                        usage.globals.insert(*g);
                        usage.whole.insert(*g);
                    }
                });
            }
        }
    }
    usage
}

fn is_resource(storage: StorageClass) -> bool {
    matches!(
        storage,
        StorageClass::Uniform | StorageClass::UniformConstant | StorageClass::StorageBuffer
    )
}

impl TranslationPass for DeadResourceElimination {
    fn name(&self) -> &str {
        "dead-resources"
    }

    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError> {
        let mut module = decode_input(self.name(), input)?;
        let usage = collect_usage(&module);
        let mut removed_names = Vec::new();

        // Uniform blocks used member-wise lose their unused members.
        let mut member_maps: FxHashMap<GlobalId, FxHashMap<u32, u32>> = FxHashMap::default();
        for index in 0..module.globals.len() {
            let id = GlobalId(index as u32);
            let global = &module.globals[index];
            if global.storage != StorageClass::Uniform || usage.whole.contains(&id) {
                continue;
            }
            let Some(used) = usage.members.get(&id) else {
                continue;
            };
            let Some(IrType::Struct { name, members }) = module.types.get(global.ty).cloned() else {
                continue;
            };
            let mut kept = Vec::new();
            let mut map = FxHashMap::default();
            for (old, member) in members.into_iter().enumerate() {
                if used.contains(&(old as u32)) {
                    map.insert(old as u32, kept.len() as u32);
                    kept.push(member);
                } else {
                    removed_names.push(member.name);
                }
            }
            layout::assign_offsets(&module.types, &mut kept);
            let ty = global.ty;
            if !module.types.replace(ty, IrType::Struct { name, members: kept }) {
                return Err(PassError::failed(
                    self.name(),
                    format!("compacted block of '{}' collides with an existing type", module.globals[index].name),
                ));
            }
            member_maps.insert(id, map);
        }

        // Drop unreferenced resources and renumber the rest.
        let mut global_map: Vec<Option<GlobalId>> = Vec::with_capacity(module.globals.len());
        let mut kept_globals = Vec::with_capacity(module.globals.len());
        for (index, global) in std::mem::take(&mut module.globals).into_iter().enumerate() {
            let id = GlobalId(index as u32);
            if is_resource(global.storage) && !usage.globals.contains(&id) {
                removed_names.push(global.name);
                global_map.push(None);
                continue;
            }
            global_map.push(Some(GlobalId(kept_globals.len() as u32)));
            kept_globals.push(global);
        }
        module.globals = kept_globals;

        let mut next_binding = 0;
        for global in &mut module.globals {
            if is_resource(global.storage) && global.decorations.binding.is_some() {
                global.decorations.binding = Some(next_binding);
                next_binding += 1;
            }
        }

        // Rewrite references.
        let mut member_constants: FxHashMap<(GlobalId, u32), Operand> = FxHashMap::default();
        for (global, map) in &member_maps {
            for (&old, &new) in map {
                let int = module.types.int();
                let constant = module.constants.intern(int, ConstValue::Int(new as i32));
                member_constants.insert((*global, old), Operand::Const(constant));
            }
        }
        let old_member = |module: &IrModule, operand: &Operand| -> Option<u32> {
            match operand {
                Operand::Const(c) => match module.constants.get(*c).map(|c| &c.value) {
                    Some(ConstValue::Int(i)) => u32::try_from(*i).ok(),
                    _ => None,
                },
                _ => None,
            }
        };
        let mut rewrites = Vec::new();
        for (f, function) in module.functions.iter().enumerate() {
            for (b, block) in function.blocks.iter().enumerate() {
                for (i, inst) in block.insts.iter().enumerate() {
                    if let Op::AccessChain {
                        base: Operand::Global(global),
                        indices,
                    } = &inst.op
                    {
                        if let Some(old) = indices.first().and_then(|op| old_member(&module, op)) {
                            if let Some(new) = member_constants.get(&(*global, old)) {
                                rewrites.push((f, b, i, *new));
                            }
                        }
                    }
                }
            }
        }
        for (f, b, i, new) in rewrites {
            if let Op::AccessChain { indices, .. } = &mut module.functions[f].blocks[b].insts[i].op {
                indices[0] = new;
            }
        }

        let mut dangling = false;
        let mut remap = |operand: &mut Operand| {
            if let Operand::Global(g) = operand {
                match global_map.get(g.index()).copied().flatten() {
                    Some(new) => *g = new,
                    None => dangling = true,
                }
            }
        };
        for function in &mut module.functions {
            for block in &mut function.blocks {
                for inst in &mut block.insts {
                    inst.op.for_each_operand_mut(&mut remap);
                }
                if let Some(term) = &mut block.terminator {
                    term.for_each_operand_mut(&mut remap);
                }
            }
        }
        for entry in &mut module.entry_points {
            for g in &mut entry.interface {
                let mut operand = Operand::Global(*g);
                remap(&mut operand);
                if let Operand::Global(new) = operand {
                    *g = new;
                }
            }
        }
        if dangling {
            return Err(PassError::failed(self.name(), "removed a resource that is still referenced"));
        }

        log::debug!("removed {} dead resource(s) or member(s)", removed_names.len());
        let mut output = PassOutput::from_module(self.name(), &module)?;
        for name in removed_names {
            output.reflection.record_removal(name);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{decode_bytes, encode_to_bytes};
    use crate::passes::test_module::pixel_module;
    use crate::reflection::reflect_module;
    use crate::verify::verify_module;

    fn run() -> PassOutput {
        let module = pixel_module();
        let bytes = encode_to_bytes(&module).unwrap();
        let reflection = reflect_module(&module);
        DeadResourceElimination
            .run(&PassInput {
                bytes: &bytes,
                reflection: &reflection,
            })
            .unwrap()
    }

    #[test]
    fn unused_members_are_removed() {
        let output = run();
        let buffer = &output.reflection.uniform_buffers[0];
        assert_eq!(buffer.members.len(), 1);
        assert_eq!(buffer.members[0].name, "Surface_Strength");
        assert_eq!(buffer.members[0].offset, 0);
        assert!(output.reflection.successors("Other_Unused").is_empty());
    }

    #[test]
    fn unused_textures_are_removed_and_bindings_renumbered() {
        let output = run();
        let images = &output.reflection.sampled_images;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, "Surface_Albedo");
        assert_eq!(images[0].binding, 1);
        assert_eq!(output.reflection.uniform_buffers[0].binding, 0);
    }

    #[test]
    fn rewritten_module_still_verifies() {
        let output = run();
        let module = decode_bytes(&output.bytes).unwrap();
        assert!(verify_module(&module).is_ok());
        assert_eq!(module.globals.len(), 4);
    }
}
