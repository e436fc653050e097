//! Shader fragment composition.
//!
//! Shaders are written as small fragment types: structs carrying stage
//! attributes, properties, stage inputs and outputs. A [`ShaderProject`]
//! collects and validates every fragment source unit, composes the
//! fragments named by each [`ShaderDefinition`] into one composite per
//! stage, links the stages together, and hands each composite's IR module
//! to a [`PipelineDescriptor`] of translation passes.
//!
//! ## Crates
//!
//! - [`shaderweave_core`]: spans, errors, diagnostics and content hashes
//! - [`shaderweave_parser`]: the fragment language lexer and parser
//! - [`shaderweave_compiler`]: collection, validation, composition,
//!   translation and lowering
//! - [`shaderweave_ir`]: the IR module, its binary form, the pass pipeline
//!   and reflection
//!
//! ## Modules
//!
//! - [`project`]: source management and compilation
//! - [`artifact`]: per-stage results of a compile
//! - [`inputs`]: uniform blocks written by property name

pub mod artifact;
pub mod error;
pub mod inputs;
pub mod project;

pub use artifact::{CompiledShader, StageArtifact, StageFailure, StageResult};
pub use error::{ProjectError, Result};
pub use inputs::{InputBlock, InputError, ShaderInputs, ShaderValue};
pub use project::{CompileBatch, CompileSummary, CompileTicket, ShaderProject};

pub use shaderweave_compiler::{
    CompilerContext, NameSettings, ResolverRegistry, ShaderDefinition, ShaderSettings, StageInterface,
};
pub use shaderweave_core::{ContentHash, Diagnostic, DiagnosticSink, Diagnostics, Severity, ShaderError, Span};
pub use shaderweave_ir::passes;
pub use shaderweave_ir::{
    PassError, PassInput, PassOutput, PipelineDescriptor, ShaderStage, SimplifiedReflection, TranslationPass,
};

/// Common imports.
pub mod prelude {
    pub use crate::artifact::{CompiledShader, StageArtifact, StageFailure};
    pub use crate::inputs::{ShaderInputs, ShaderValue};
    pub use crate::project::ShaderProject;
    pub use shaderweave_compiler::{ShaderDefinition, ShaderSettings};
    pub use shaderweave_core::Diagnostics;
    pub use shaderweave_ir::{PipelineDescriptor, ShaderStage};
}
