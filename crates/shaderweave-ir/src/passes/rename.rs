use shaderweave_core::PassError;

use super::{PassInput, PassOutput, TranslationPass, decode_input};
use crate::types::{IrType, StorageClass};

/// Prefixes the names of every external resource and uniform member.
///
/// Each rename is recorded in the output reflection so original names can
/// still be traced to their final bindings.
#[derive(Debug, Clone)]
pub struct BindingRenamePass {
    pub prefix: String,
}

impl BindingRenamePass {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl TranslationPass for BindingRenamePass {
    fn name(&self) -> &str {
        "rename"
    }

    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError> {
        let mut module = decode_input(self.name(), input)?;
        let mut renames = Vec::new();

        for index in 0..module.globals.len() {
            let global = &module.globals[index];
            if !matches!(
                global.storage,
                StorageClass::Uniform | StorageClass::UniformConstant | StorageClass::StorageBuffer
            ) {
                continue;
            }
            let ty = global.ty;

            if global.storage == StorageClass::Uniform {
                if let Some(IrType::Struct { name, members }) = module.types.get(ty).cloned() {
                    let members = members
                        .into_iter()
                        .map(|mut member| {
                            let renamed = format!("{}{}", self.prefix, member.name);
                            renames.push((std::mem::replace(&mut member.name, renamed.clone()), renamed));
                            member
                        })
                        .collect();
                    if !module.types.replace(ty, IrType::Struct { name, members }) {
                        return Err(PassError::failed(
                            self.name(),
                            format!("renamed block of '{}' collides with an existing type", module.globals[index].name),
                        ));
                    }
                }
            }

            let global = &mut module.globals[index];
            let renamed = format!("{}{}", self.prefix, global.name);
            renames.push((std::mem::replace(&mut global.name, renamed.clone()), renamed));
        }

        let mut output = PassOutput::from_module(self.name(), &module)?;
        for (from, to) in renames {
            output.reflection.record_rename(from, to);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::encode_to_bytes;
    use crate::passes::test_module::pixel_module;
    use crate::reflection::reflect_module;

    #[test]
    fn resources_and_members_are_prefixed() {
        let module = pixel_module();
        let bytes = encode_to_bytes(&module).unwrap();
        let reflection = reflect_module(&module);
        let output = BindingRenamePass::new("r_")
            .run(&PassInput {
                bytes: &bytes,
                reflection: &reflection,
            })
            .unwrap();
        let reflection = &output.reflection;
        assert_eq!(reflection.uniform_buffers[0].name, "r_Material");
        assert_eq!(reflection.uniform_buffers[0].members[1].name, "r_Surface_Strength");
        assert_eq!(reflection.sampled_images[1].name, "r_Surface_Albedo");
        assert_eq!(reflection.successors("Surface_Strength"), vec!["r_Surface_Strength".to_string()]);
        assert_eq!(reflection.successors("Uv"), vec!["Uv".to_string()]);
    }
}
