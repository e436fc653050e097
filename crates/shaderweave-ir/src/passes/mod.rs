//! Translation pass pipeline.
//!
//! A pipeline turns an IR module into a chain of [`PassOutput`]s. The first
//! output is always the emitted binary; each configured pass then consumes
//! the previous output's bytes and reflection, and the backend runs last.
//! Passes only see the byte stream and reflection record, never each other.

mod dead_resources;
mod rename;
mod spec_constants;
mod text_backend;
mod validate;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use shaderweave_core::PassError;

use crate::binary;
use crate::module::IrModule;
use crate::reflection::ShaderReflection;

pub use dead_resources::DeadResourceElimination;
pub use rename::BindingRenamePass;
pub use spec_constants::SpecConstantPass;
pub use text_backend::{TextBackend, emit_module};
pub use validate::ValidationPass;

/// Name of the implicit first step that encodes the module.
pub const EMIT_PASS: &str = "emit";

/// What a pass receives.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    pub bytes: &'a [u8],
    pub reflection: &'a ShaderReflection,
}

/// What a pass produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutput {
    /// Name of the pass that produced this output.
    pub pass: String,
    pub bytes: Vec<u8>,
    pub reflection: ShaderReflection,
    /// Human-readable form, for passes that have one.
    pub text: Option<String>,
}

impl PassOutput {
    /// Output whose bytes are the encoding of `module`, with reflection
    /// rebuilt from it.
    pub fn from_module(pass: &str, module: &IrModule) -> Result<Self, PassError> {
        let bytes = binary::encode_to_bytes(module).map_err(|e| e.into_pass_error(pass))?;
        Ok(Self {
            pass: pass.to_string(),
            bytes,
            reflection: crate::reflection::reflect_module(module),
            text: None,
        })
    }

    /// Output identical to the input apart from dropped remappings.
    pub fn passthrough(pass: &str, input: &PassInput<'_>) -> Self {
        let mut reflection = input.reflection.clone();
        reflection.remappings.clear();
        Self {
            pass: pass.to_string(),
            bytes: input.bytes.to_vec(),
            reflection,
            text: None,
        }
    }
}

/// One step of a pipeline.
pub trait TranslationPass: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// Transform the previous output.
    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError>;
}

/// Decode the module in a pass input, attributing failures to `pass`.
pub fn decode_input(pass: &str, input: &PassInput<'_>) -> Result<IrModule, PassError> {
    binary::decode_bytes(input.bytes).map_err(|e| e.into_pass_error(pass))
}

/// The passes to run and the backend that finishes the pipeline.
#[derive(Clone)]
pub struct PipelineDescriptor {
    pub passes: Vec<Arc<dyn TranslationPass>>,
    pub backend: Arc<dyn TranslationPass>,
}

impl PipelineDescriptor {
    /// A pipeline with no intermediate passes.
    pub fn new(backend: impl TranslationPass + 'static) -> Self {
        Self {
            passes: Vec::new(),
            backend: Arc::new(backend),
        }
    }

    /// Append an intermediate pass.
    pub fn with_pass(mut self, pass: impl TranslationPass + 'static) -> Self {
        self.passes.push(Arc::new(pass));
        self
    }

    /// Replace the backend.
    pub fn with_backend(mut self, backend: impl TranslationPass + 'static) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes
            .iter()
            .map(|p| p.name())
            .chain(std::iter::once(self.backend.name()))
            .collect()
    }
}

impl Default for PipelineDescriptor {
    /// Validation, non-freezing specialization constants, text backend.
    fn default() -> Self {
        Self::new(TextBackend::default())
            .with_pass(ValidationPass)
            .with_pass(SpecConstantPass { freeze: false })
    }
}

impl fmt::Debug for PipelineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDescriptor")
            .field("passes", &self.pass_names())
            .finish()
    }
}

/// Every output of one pipeline run, emission first and backend last.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub outputs: Vec<PassOutput>,
}

impl PipelineResult {
    /// The emitted binary before any pass ran.
    pub fn binary(&self) -> &[u8] {
        self.outputs.first().map_or(&[], |o| o.bytes.as_slice())
    }

    /// The backend's output.
    pub fn backend(&self) -> Option<&PassOutput> {
        self.outputs.last()
    }

    /// Reflection records in pass order.
    pub fn reflections(&self) -> impl Iterator<Item = &ShaderReflection> {
        self.outputs.iter().map(|o| &o.reflection)
    }

    /// The backend's text, or its bytes read as UTF-8.
    pub fn backend_text(&self) -> Option<String> {
        let backend = self.backend()?;
        backend
            .text
            .clone()
            .or_else(|| String::from_utf8(backend.bytes.clone()).ok())
    }
}

/// Runs a [`PipelineDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct PassPipeline {
    descriptor: PipelineDescriptor,
}

impl PassPipeline {
    pub fn new(descriptor: PipelineDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    /// Emit `module` and run every pass over it. The first failing pass
    /// aborts the run.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(
        &self,
        module: &IrModule,
        reflection: ShaderReflection,
    ) -> Result<PipelineResult, PassError> {
        let start = Instant::now();
        let bytes = binary::encode_to_bytes(module).map_err(|e| e.into_pass_error(EMIT_PASS))?;
        log::trace!("pass '{EMIT_PASS}': {} bytes in {:?}", bytes.len(), start.elapsed());

        let mut outputs = vec![PassOutput {
            pass: EMIT_PASS.to_string(),
            bytes,
            reflection,
            text: None,
        }];

        let passes = self
            .descriptor
            .passes
            .iter()
            .chain(std::iter::once(&self.descriptor.backend));
        for pass in passes {
            let start = Instant::now();
            let output = {
                let previous = outputs.last().ok_or(PassError::WorkerDisconnected)?;
                let input = PassInput {
                    bytes: &previous.bytes,
                    reflection: &previous.reflection,
                };
                pass.run(&input)
            };
            match output {
                Ok(output) => {
                    log::trace!(
                        "pass '{}': {} bytes in {:?}",
                        pass.name(),
                        output.bytes.len(),
                        start.elapsed()
                    );
                    outputs.push(output);
                }
                Err(error) => {
                    log::warn!("pass '{}' failed: {error}", pass.name());
                    return Err(error);
                }
            }
        }

        Ok(PipelineResult { outputs })
    }
}

#[cfg(test)]
pub(crate) mod test_module {
    use crate::builder::FunctionBuilder;
    use crate::constant::ConstValue;
    use crate::function::{BinOp, Operand};
    use crate::layout;
    use crate::module::{Decorations, EntryPoint, IrModule};
    use crate::types::{ImageDim, IrType, ScalarKind, ShaderStage, StorageClass, StructMember};

    /// Pixel module reading one of three uniform members and one of two
    /// textures.
    pub fn pixel_module() -> IrModule {
        let mut module = IrModule::new();
        let void = module.types.void();
        let float = module.types.float();
        let vec2 = module.types.vector(ScalarKind::Float, 2);
        let vec4 = module.types.vector(ScalarKind::Float, 4);
        let mut members: Vec<StructMember> = ["Surface_Unused", "Surface_Strength", "Other_Unused"]
            .iter()
            .map(|name| StructMember {
                name: (*name).into(),
                ty: float,
                offset: None,
            })
            .collect();
        layout::assign_offsets(&module.types, &mut members);
        let block = module.types.intern(IrType::Struct {
            name: "Material_Block".into(),
            members,
        });
        let material = module.add_global(
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
            "Surface_Unused_Texture",
            sampled,
            StorageClass::UniformConstant,
            Decorations {
                binding: Some(1),
                ..Decorations::default()
            },
        );
        let albedo = module.add_global(
            "Surface_Albedo",
            sampled,
            StorageClass::UniformConstant,
            Decorations {
                binding: Some(2),
                ..Decorations::default()
            },
        );
        let uv = module.add_global(
            "Uv",
            vec2,
            StorageClass::Input,
            Decorations {
                location: Some(0),
                ..Decorations::default()
            },
        );
        let target = module.add_global(
            "Target0",
            vec4,
            StorageClass::Output,
            Decorations {
                location: Some(0),
                ..Decorations::default()
            },
        );
        let int = module.types.int();
        let quality = module.add_spec_constant("Quality", int, 0, ConstValue::Int(2));

        let main = module.declare_function("main", void, Vec::new());
        let mut b = FunctionBuilder::new(&mut module, main).unwrap();
        let index = b.const_int(1);
        let ptr = b.access_chain(Operand::Global(material), vec![index]).unwrap();
        let strength = b.load(ptr).unwrap();
        let texture = b.load(Operand::Global(albedo)).unwrap();
        let coord = b.load(Operand::Global(uv)).unwrap();
        let color = b.sample(texture, coord).unwrap();
        let zero = b.const_int(0);
        let high = b
            .binary(BinOp::Gt, Operand::SpecConst(quality), zero, None)
            .unwrap();
        let scaled = b.binary(BinOp::Mul, color, strength, Some(vec4)).unwrap();
        let chosen = b.select(high, scaled, color).unwrap();
        b.store(Operand::Global(target), chosen).unwrap();
        b.ret().unwrap();
        b.finish();
        module.entry_points.push(EntryPoint {
            name: "main".into(),
            stage: ShaderStage::Pixel,
            function: main,
            interface: vec![uv, target],
        });
        module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::reflect_module;

    #[derive(Debug)]
    struct FailingPass;

    impl TranslationPass for FailingPass {
        fn name(&self) -> &str {
            "explode"
        }

        fn run(&self, _input: &PassInput<'_>) -> Result<PassOutput, PassError> {
            Err(PassError::failed("explode", "always fails"))
        }
    }

    #[test]
    fn default_pipeline_runs_every_pass() {
        let module = test_module::pixel_module();
        let pipeline = PassPipeline::default();
        let result = pipeline.run(&module, reflect_module(&module)).unwrap();
        let names: Vec<_> = result.outputs.iter().map(|o| o.pass.as_str()).collect();
        assert_eq!(names, vec!["emit", "validate", "spec-constants", "text"]);
        assert_eq!(result.binary(), binary::encode_to_bytes(&module).unwrap().as_slice());
        assert!(result.backend_text().unwrap().contains("void main()"));
    }

    #[test]
    fn failure_names_the_pass() {
        let module = test_module::pixel_module();
        let descriptor = PipelineDescriptor::default().with_pass(FailingPass);
        let error = PassPipeline::new(descriptor)
            .run(&module, reflect_module(&module))
            .unwrap_err();
        assert_eq!(error.pass_name(), Some("explode"));
    }

    #[test]
    fn malformed_input_reported() {
        let reflection = ShaderReflection::default();
        let input = PassInput {
            bytes: &[0, 1, 2, 3],
            reflection: &reflection,
        };
        let error = ValidationPass.run(&input).unwrap_err();
        assert!(matches!(error, PassError::Malformed { .. }));
    }
}
