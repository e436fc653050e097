use shaderweave_core::PassError;

use super::{PassInput, PassOutput, TranslationPass, decode_input};
use crate::verify::verify_module;

/// Decodes and verifies the stream, passing it through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationPass;

impl TranslationPass for ValidationPass {
    fn name(&self) -> &str {
        "validate"
    }

    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError> {
        let module = decode_input(self.name(), input)?;
        if let Err(errors) = verify_module(&module) {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PassError::failed(self.name(), message));
        }
        Ok(PassOutput::passthrough(self.name(), input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::encode_to_bytes;
    use crate::module::IrModule;
    use crate::passes::test_module::pixel_module;
    use crate::reflection::reflect_module;

    #[test]
    fn valid_module_passes_through() {
        let module = pixel_module();
        let bytes = encode_to_bytes(&module).unwrap();
        let reflection = reflect_module(&module);
        let output = ValidationPass
            .run(&PassInput {
                bytes: &bytes,
                reflection: &reflection,
            })
            .unwrap();
        assert_eq!(output.bytes, bytes);
        assert_eq!(output.reflection, reflection);
    }

    #[test]
    fn unterminated_block_fails() {
        let mut module = IrModule::new();
        let void = module.types.void();
        let id = module.declare_function("main", void, Vec::new());
        crate::builder::FunctionBuilder::new(&mut module, id)
            .unwrap()
            .finish();
        let bytes = encode_to_bytes(&module).unwrap();
        let reflection = reflect_module(&module);
        let error = ValidationPass
            .run(&PassInput {
                bytes: &bytes,
                reflection: &reflection,
            })
            .unwrap_err();
        assert!(error.to_string().contains("no terminator"));
    }
}
