//! Per-pass reflection records.
//!
//! Every pass output carries a [`ShaderReflection`] describing the external
//! resources of the stage as that pass left them. Passes that rename or
//! split resources record it in [`ShaderReflection::remappings`], which the
//! simplifier follows to trace original names to final bindings.

use rustc_hash::FxHashMap;

use crate::layout;
use crate::module::IrModule;
use crate::types::{IrType, ShaderStage, StorageClass, TypeId, TypeTable};

/// A member of a uniform buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    /// Byte offset within the buffer.
    pub offset: u32,
    /// Byte size of the member.
    pub size: u32,
    pub type_name: String,
}

/// A uniform buffer and its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBuffer {
    pub name: String,
    pub binding: u32,
    pub set: u32,
    /// Total size in bytes, padded to 16.
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformBuffer {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// A sampler, image, storage image or storage buffer binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub name: String,
    pub binding: u32,
    pub set: u32,
    pub type_name: String,
}

/// A settable specialization constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecConstantInfo {
    pub name: String,
    pub spec_id: u32,
    pub type_name: String,
}

/// A pass replaced the resource `from` with the resources in `to`.
///
/// An empty `to` means the resource was removed. Resources a pass does not
/// mention keep their name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remapping {
    pub from: String,
    pub to: Vec<String>,
}

/// Reflection record of one pass output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    pub stage: Option<ShaderStage>,
    pub uniform_buffers: Vec<UniformBuffer>,
    pub samplers: Vec<ResourceBinding>,
    pub images: Vec<ResourceBinding>,
    pub sampled_images: Vec<ResourceBinding>,
    pub storage_images: Vec<ResourceBinding>,
    pub storage_buffers: Vec<ResourceBinding>,
    pub spec_constants: Vec<SpecConstantInfo>,
    pub remappings: Vec<Remapping>,
}

impl ShaderReflection {
    /// Successor names of `name` in this pass.
    pub fn successors(&self, name: &str) -> Vec<String> {
        match self.remappings.iter().find(|r| r.from == name) {
            Some(remapping) => remapping.to.clone(),
            None => vec![name.to_string()],
        }
    }

    /// Map from member name to `(buffer index, member index)`.
    pub fn member_index_map(&self) -> FxHashMap<&str, (usize, usize)> {
        let mut map = FxHashMap::default();
        for (b, buffer) in self.uniform_buffers.iter().enumerate() {
            for (m, member) in buffer.members.iter().enumerate() {
                map.insert(member.name.as_str(), (b, m));
            }
        }
        map
    }

    /// Record that `from` became `to`.
    pub fn record_rename(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.remappings.push(Remapping {
            from: from.into(),
            to: vec![to.into()],
        });
    }

    /// Record that `from` was removed.
    pub fn record_removal(&mut self, from: impl Into<String>) {
        self.remappings.push(Remapping {
            from: from.into(),
            to: Vec::new(),
        });
    }

    /// Find a uniform member by name.
    pub fn find_member(&self, name: &str) -> Option<(&UniformBuffer, &UniformMember)> {
        self.uniform_buffers.iter().find_map(|buffer| {
            buffer
                .members
                .iter()
                .find(|m| m.name == name)
                .map(|member| (buffer, member))
        })
    }
}

fn uniform_members(types: &TypeTable, ty: TypeId) -> (Vec<UniformMember>, u32) {
    let Some(IrType::Struct { members, .. }) = types.get(ty) else {
        return (Vec::new(), 0);
    };
    let mut out = Vec::with_capacity(members.len());
    let mut end = 0;
    for member in members {
        let size = layout::std140(types, member.ty).map_or(0, |l| l.size);
        let offset = member.offset.unwrap_or(end);
        end = end.max(offset + size);
        out.push(UniformMember {
            name: member.name.clone(),
            offset,
            size,
            type_name: types.display(member.ty),
        });
    }
    let size = layout::std140(types, ty).map_or(end, |l| l.size.max(end));
    (out, size.div_ceil(16) * 16)
}

/// Build the reflection record of a module from its globals.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn reflect_module(module: &IrModule) -> ShaderReflection {
    let mut reflection = ShaderReflection {
        stage: module.entry_points.first().map(|e| e.stage),
        ..ShaderReflection::default()
    };
    let types = &module.types;

    for global in &module.globals {
        let binding = global.decorations.binding.unwrap_or(0);
        let set = global.decorations.set.unwrap_or(0);
        let resource = || ResourceBinding {
            name: global.name.clone(),
            binding,
            set,
            type_name: types.display(global.ty),
        };
        match (global.storage, types.get(global.ty)) {
            (StorageClass::Uniform, Some(IrType::Struct { .. })) => {
                let (members, size) = uniform_members(types, global.ty);
                reflection.uniform_buffers.push(UniformBuffer {
                    name: global.name.clone(),
                    binding,
                    set,
                    size,
                    members,
                });
            }
            (StorageClass::UniformConstant, Some(IrType::Sampler)) => {
                reflection.samplers.push(resource());
            }
            (StorageClass::UniformConstant, Some(IrType::Image { sampled: true, .. })) => {
                reflection.images.push(resource());
            }
            (StorageClass::UniformConstant, Some(IrType::Image { sampled: false, .. })) => {
                reflection.storage_images.push(resource());
            }
            (StorageClass::UniformConstant, Some(IrType::SampledImage { .. })) => {
                reflection.sampled_images.push(resource());
            }
            (StorageClass::StorageBuffer, _) => {
                reflection.storage_buffers.push(resource());
            }
            _ => {}
        }
    }

    for spec in &module.spec_constants {
        reflection.spec_constants.push(SpecConstantInfo {
            name: spec.name.clone(),
            spec_id: spec.spec_id,
            type_name: types.display(spec.ty),
        });
    }

    reflection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstValue;
    use crate::module::Decorations;
    use crate::types::{ImageDim, ScalarKind, StructMember};

    fn material_module() -> IrModule {
        let mut module = IrModule::new();
        let float = module.types.float();
        let vec3 = module.types.vector(ScalarKind::Float, 3);
        let mut members = vec![
            StructMember {
                name: "Surface_Roughness".into(),
                ty: float,
                offset: None,
            },
            StructMember {
                name: "Surface_Tint".into(),
                ty: vec3,
                offset: None,
            },
        ];
        layout::assign_offsets(&module.types, &mut members);
        let block = module.types.intern(IrType::Struct {
            name: "Material".into(),
            members,
        });
        module.add_global(
            "Material",
            block,
            StorageClass::Uniform,
            Decorations {
                binding: Some(0),
                ..Decorations::default()
            },
        );
        let image = module.types.intern(IrType::Image {
            dim: ImageDim::D2,
            sampled: true,
        });
        let sampled = module.types.intern(IrType::SampledImage { image });
        module.add_global(
            "Surface_Albedo",
            sampled,
            StorageClass::UniformConstant,
            Decorations {
                binding: Some(1),
                ..Decorations::default()
            },
        );
        let int = module.types.int();
        module.add_spec_constant("Quality", int, 0, ConstValue::Int(1));
        module
    }

    #[test]
    fn uniform_members_reflect_offsets() {
        let reflection = reflect_module(&material_module());
        assert_eq!(reflection.uniform_buffers.len(), 1);
        let buffer = &reflection.uniform_buffers[0];
        assert_eq!(buffer.name, "Material");
        assert_eq!(buffer.members[0].offset, 0);
        assert_eq!(buffer.members[1].offset, 16);
        assert_eq!(buffer.members[1].size, 12);
        assert_eq!(buffer.members[1].type_name, "vec3");
        assert_eq!(buffer.size, 32);
    }

    #[test]
    fn opaque_resources_reflect_bindings() {
        let reflection = reflect_module(&material_module());
        assert_eq!(reflection.sampled_images.len(), 1);
        assert_eq!(reflection.sampled_images[0].binding, 1);
        assert_eq!(reflection.sampled_images[0].type_name, "sampler2D");
        assert_eq!(reflection.spec_constants[0].name, "Quality");
    }

    #[test]
    fn successors_default_to_identity() {
        let mut reflection = ShaderReflection::default();
        assert_eq!(reflection.successors("a"), vec!["a".to_string()]);
        reflection.record_rename("a", "b");
        reflection.record_removal("c");
        assert_eq!(reflection.successors("a"), vec!["b".to_string()]);
        assert!(reflection.successors("c").is_empty());
    }
}
