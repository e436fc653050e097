use shaderweave_core::PassError;

use super::{PassInput, PassOutput, TranslationPass, decode_input};
use crate::function::Operand;

/// Handles specialization constants.
///
/// With `freeze` set every use of a specialization constant is replaced by
/// a regular constant holding its default, and the constants are dropped
/// from the module and its reflection so hosts can no longer set them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecConstantPass {
    pub freeze: bool,
}

impl TranslationPass for SpecConstantPass {
    fn name(&self) -> &str {
        "spec-constants"
    }

    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError> {
        if !self.freeze {
            return Ok(PassOutput::passthrough(self.name(), input));
        }

        let mut module = decode_input(self.name(), input)?;
        let frozen: Vec<Operand> = module
            .spec_constants
            .iter()
            .map(|spec| Operand::Const(module.constants.intern(spec.ty, spec.default.clone())))
            .collect();
        log::debug!("freezing {} specialization constant(s)", frozen.len());

        let mut replace = |operand: &mut Operand| {
            if let Operand::SpecConst(id) = *operand {
                if let Some(constant) = frozen.get(id.index()) {
                    *operand = *constant;
                }
            }
        };
        for function in &mut module.functions {
            for block in &mut function.blocks {
                for inst in &mut block.insts {
                    inst.op.for_each_operand_mut(&mut replace);
                }
                if let Some(term) = &mut block.terminator {
                    term.for_each_operand_mut(&mut replace);
                }
            }
        }
        module.spec_constants.clear();

        let mut output = PassOutput::from_module(self.name(), &module)?;
        output.reflection.spec_constants.clear();
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{decode_bytes, encode_to_bytes};
    use crate::function::Op;
    use crate::passes::test_module::pixel_module;
    use crate::reflection::reflect_module;

    fn run(freeze: bool) -> PassOutput {
        let module = pixel_module();
        let bytes = encode_to_bytes(&module).unwrap();
        let reflection = reflect_module(&module);
        SpecConstantPass { freeze }
            .run(&PassInput {
                bytes: &bytes,
                reflection: &reflection,
            })
            .unwrap()
    }

    #[test]
    fn unfrozen_keeps_constants() {
        let output = run(false);
        assert_eq!(output.reflection.spec_constants.len(), 1);
        assert_eq!(decode_bytes(&output.bytes).unwrap().spec_constants.len(), 1);
    }

    #[test]
    fn frozen_inlines_defaults() {
        let output = run(true);
        assert!(output.reflection.spec_constants.is_empty());
        let module = decode_bytes(&output.bytes).unwrap();
        assert!(module.spec_constants.is_empty());
        let uses_spec = module.functions[0].insts().any(|inst| {
            let mut found = false;
            inst.op.for_each_operand(|o| found |= matches!(o, Operand::SpecConst(_)));
            found
        });
        assert!(!uses_spec);
        assert!(module.functions[0]
            .insts()
            .any(|inst| matches!(inst.op, Op::Binary { .. })));
        assert!(crate::verify::verify_module(&module).is_ok());
    }
}
