//! Shader fragment compiler.
//!
//! Turns collected fragment types into composed, translated and lowered
//! shader stages.
//!
//! ## Architecture
//!
//! - **Pass 1 (Collection)**: [`CollectorPass`] turns each source unit's
//!   declarations into [`FragmentType`]s
//! - **Pass 2 (Validation)**: [`ValidationPass`] checks attributes and
//!   registers extension and implements bindings
//! - **Composition**: the [`Compositor`] merges the fragments of a shader
//!   into one composite struct per stage, as fragment-language source
//! - **Translation**: the [`StageTranslator`] writes target text for each
//!   composite, and [`StageLowering`] builds its IR module
//!
//! [`ShaderCompiler`] runs composition onward for one shader.
//!
//! ## Modules
//!
//! - [`settings`]: attribute names, built-ins, system values and layout rules
//! - [`context`]: the read-only registries every phase consults
//! - [`library`]: collected fragment types
//! - [`passes`]: the collector and validator
//! - [`compositor`]: stage composition and linking
//! - [`typing`]: expression typing shared by translation and lowering
//! - [`translator`]: text emission with source range mappings
//! - [`lower`]: IR lowering

pub mod code_builder;
pub mod compositor;
pub mod context;
pub mod core_types;
pub mod library;
pub mod lower;
pub mod passes;
pub mod settings;
pub mod translator;
pub mod typing;

pub use code_builder::{RangeMapping, ShaderCodeBuilder, find_mapping};
pub use compositor::{
    ComposedStage, CompositionOutput, Compositor, InputKind, ShaderDefinition, StageInfo, StageInterface,
};
pub use context::{CompilerContext, LocatedError};
pub use core_types::{ScalarType, ShaderType};
pub use library::{Field, FragmentLibrary, FragmentType, Function, TypeFlags};
pub use lower::{LoweredStage, StageLowering};
pub use passes::{CollectorOutput, CollectorPass, ValidationOutput, ValidationPass};
pub use settings::{NameSettings, ShaderSettings};
pub use translator::{ResolverRegistry, StageTranslator, TranslatedStage};

// Re-export the error type for convenience
pub use shaderweave_core::CompileError;

use std::sync::Arc;

use bumpalo::Bump;
use shaderweave_ir::ShaderStage;
use shaderweave_parser::Parser;

/// One stage of a compiled shader.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: ShaderStage,
    /// Fragment-language source of the composite.
    pub composite: String,
    /// Fragments composed into the stage, in order.
    pub fragments: Vec<String>,
    pub interface: StageInterface,
    pub translated: TranslatedStage,
    pub lowered: LoweredStage,
    /// Errors compiling the composite source itself.
    pub errors: Vec<LocatedError>,
}

impl StageOutput {
    /// Every error raised for this stage.
    pub fn all_errors(&self) -> impl Iterator<Item = &LocatedError> {
        self.errors
            .iter()
            .chain(&self.translated.errors)
            .chain(&self.lowered.errors)
    }

    pub fn has_errors(&self) -> bool {
        self.all_errors().next().is_some()
    }
}

/// Result of compiling one shader.
#[derive(Debug, Clone)]
pub struct ShaderOutput {
    pub shader: String,
    pub stages: Vec<StageOutput>,
    /// Composition errors, which cannot be pinned to one stage.
    pub errors: Vec<LocatedError>,
}

impl ShaderOutput {
    pub fn stage(&self, stage: ShaderStage) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.stages.iter().any(StageOutput::has_errors)
    }
}

/// Composes, translates and lowers shaders against a validated library.
pub struct ShaderCompiler<'c, 'a> {
    ctx: &'c CompilerContext,
    library: &'c FragmentLibrary<'a>,
}

impl<'c, 'a> ShaderCompiler<'c, 'a> {
    pub fn new(ctx: &'c CompilerContext, library: &'c FragmentLibrary<'a>) -> Self {
        Self { ctx, library }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile(&self, definition: &ShaderDefinition) -> ShaderOutput {
        log::debug!("compiling shader '{}'", definition.name);
        let composition = Compositor::new(self.ctx, self.library).compose(definition);
        let stages = composition
            .stages
            .into_iter()
            .map(|stage| self.compile_stage(stage))
            .collect();
        ShaderOutput {
            shader: composition.shader,
            stages,
            errors: composition.errors,
        }
    }

    /// Compile a composite's source into a library over the fragments,
    /// then translate and lower it.
    fn compile_stage(&self, composed: ComposedStage) -> StageOutput {
        let interface = &composed.interface;
        let origin: Arc<str> = Arc::from(interface.composite.as_str());
        let arena = Bump::new();
        let mut errors = Vec::new();

        let script = match Parser::parse(&composed.text, &arena) {
            Ok(script) => Some(script),
            Err(parse_errors) => {
                errors.extend(parse_errors.iter().map(|e| {
                    LocatedError::new(
                        &origin,
                        CompileError::Untranslatable {
                            construct: format!("composite source: {}", e.message),
                            span: e.span,
                        },
                    )
                }));
                None
            }
        };

        let mut library = FragmentLibrary::with_parent(self.library);
        if let Some(script) = &script {
            let collected = CollectorPass::new(self.ctx, origin.clone())
                .run(script)
                .register(&mut library);
            errors.extend(collected.into_iter().map(|e| LocatedError::new(&origin, e)));
            if let Some(composite) = library.find_type_mut(&interface.composite) {
                composite.flags |= TypeFlags::COMPOSITE;
            }
            let validation = ValidationPass::new(self.ctx, &mut library).run();
            errors.extend(validation.errors);
        }

        // Translation and lowering read the same library but never each
        // other's output
        let (translated, lowered) = if errors.is_empty() {
            (
                StageTranslator::new(self.ctx, &library).translate(interface),
                StageLowering::new(self.ctx, &library).lower(interface),
            )
        } else {
            log::warn!(
                "composite '{}' failed to compile with {} errors",
                interface.composite,
                errors.len()
            );
            (empty_translation(composed.stage), empty_lowering(composed.stage))
        };

        StageOutput {
            stage: composed.stage,
            composite: composed.text,
            fragments: composed.fragments,
            interface: composed.interface,
            translated,
            lowered,
            errors,
        }
    }
}

fn empty_translation(stage: ShaderStage) -> TranslatedStage {
    TranslatedStage {
        stage,
        text: String::new(),
        mappings: Vec::new(),
        errors: Vec::new(),
    }
}

fn empty_lowering(stage: ShaderStage) -> LoweredStage {
    LoweredStage {
        stage,
        module: shaderweave_ir::IrModule::new(),
        errors: Vec::new(),
    }
}
