//! Compiled shader artifacts.

use std::sync::Arc;

use shaderweave_compiler::{ShaderDefinition, StageInterface};
use shaderweave_core::{ContentHash, Diagnostic, Diagnostics};
use shaderweave_ir::reflection::{ResourceBinding, UniformBuffer, UniformMember};
use shaderweave_ir::{PipelineResult, ShaderStage, SimplifiedReflection};

/// Everything produced for one successfully compiled stage.
#[derive(Debug, Clone)]
pub struct StageArtifact {
    pub stage: ShaderStage,
    /// Fragments composed into the stage, in order.
    pub fragments: Vec<String>,
    /// Fragment-language source of the composite.
    pub composite_text: String,
    /// Target text written by the translator.
    pub translated_text: String,
    /// Binary of the last pass before the backend.
    pub binary: Vec<u8>,
    /// Text produced by the backend, if it produced any.
    pub backend_text: Option<String>,
    pub interface: StageInterface,
    pub reflection: SimplifiedReflection,
    /// Names of the passes that ran, emission first.
    pub passes: Vec<String>,
}

impl StageArtifact {
    pub(crate) fn new(
        stage: ShaderStage,
        fragments: Vec<String>,
        composite_text: String,
        translated_text: String,
        interface: StageInterface,
        result: PipelineResult,
    ) -> Self {
        let reflection = SimplifiedReflection::from_result(&interface.property_descriptions(), &result);
        let binary = result
            .outputs
            .iter()
            .rev()
            .nth(1)
            .or(result.outputs.first())
            .map(|output| output.bytes.clone())
            .unwrap_or_default();
        Self {
            stage,
            fragments,
            composite_text,
            translated_text,
            binary,
            backend_text: result.backend_text(),
            interface,
            reflection,
            passes: result.outputs.iter().map(|o| o.pass.clone()).collect(),
        }
    }
}

/// A stage that failed to compile.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: ShaderStage,
    /// Fragment-language source of the composite, when composition got
    /// that far.
    pub composite_text: String,
    pub diagnostics: Diagnostics,
}

/// Outcome of one stage.
pub type StageResult = Result<StageArtifact, StageFailure>;

fn stage_of(result: &StageResult) -> ShaderStage {
    match result {
        Ok(artifact) => artifact.stage,
        Err(failure) => failure.stage,
    }
}

/// One compiled shader.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub name: String,
    pub stages: Vec<StageResult>,
    /// Composition diagnostics, which are not tied to one stage.
    pub diagnostics: Diagnostics,
    /// The definition the shader was compiled from.
    pub definition: ShaderDefinition,
    /// Source units defining the shader's fragments and their hashes when
    /// it was compiled. Holds every unit of the project when a fragment
    /// could not be found.
    pub sources: Vec<(Arc<str>, ContentHash)>,
    /// Set when a requested fragment was missing, so any added unit may
    /// supply it.
    pub depends_on_all_sources: bool,
}

impl CompiledShader {
    pub fn stage(&self, stage: ShaderStage) -> Option<&StageResult> {
        self.stages.iter().find(|s| stage_of(s) == stage)
    }

    /// The artifact of a stage that compiled.
    pub fn artifact(&self, stage: ShaderStage) -> Option<&StageArtifact> {
        self.stage(stage).and_then(|s| s.as_ref().ok())
    }

    /// Artifacts of every stage that compiled.
    pub fn artifacts(&self) -> impl Iterator<Item = &StageArtifact> {
        self.stages.iter().filter_map(|s| s.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageFailure> {
        self.stages.iter().filter_map(|s| s.as_ref().err())
    }

    /// True when every stage compiled.
    pub fn is_complete(&self) -> bool {
        !self.stages.is_empty() && self.failures().next().is_none() && !self.diagnostics.has_errors()
    }

    /// Shader-level and per-stage diagnostics.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.failures().flat_map(|f| f.diagnostics.iter()))
    }

    /// Final uniform buffer and member of `fragment.property` in `stage`.
    pub fn find_property(
        &self,
        stage: ShaderStage,
        fragment: &str,
        property: &str,
    ) -> Option<(&UniformBuffer, &UniformMember)> {
        self.artifact(stage)?.reflection.find_uniform(fragment, property)
    }

    /// Final sampler bindings of a property in `stage`.
    pub fn find_sampler_bindings(&self, stage: ShaderStage, fragment: &str, property: &str) -> Vec<&ResourceBinding> {
        self.artifact(stage)
            .map(|a| a.reflection.find_sampler_bindings(fragment, property))
            .unwrap_or_default()
    }
}
