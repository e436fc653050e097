//! Shader project API.
//!
//! A [`ShaderProject`] owns the fragment source units and the shader
//! definitions composed from them. Every compile parses and validates the
//! whole library afresh, then composes each defined shader in parallel and
//! runs its stages through the pass pipeline.
//!
//! # Example
//!
//! ```
//! use shaderweave::{PipelineDescriptor, ShaderDefinition, ShaderProject, ShaderStage};
//!
//! let mut project = ShaderProject::default();
//! project.add_source("normal.frag", r#"
//!     [Vertex]
//!     struct A {
//!         [Output] var Normal : Real3;
//!         function Main() { this.Normal = Real3(0.0, 1.0, 0.0); }
//!     }
//!     [Pixel]
//!     struct B {
//!         [StageInput] var Normal : Real3;
//!         [Output] var Target0 : Real4;
//!         function Main() { this.Target0 = Real4(this.Normal, 1.0); }
//!     }
//! "#).unwrap();
//! project.define_shader(ShaderDefinition::new("Lit", ["A", "B"]));
//!
//! let summary = project.compile(&PipelineDescriptor::default());
//! assert!(!summary.diagnostics.has_errors(), "{}", summary.diagnostics);
//!
//! let shader = project.find_shader("Lit").unwrap();
//! assert!(shader.artifact(ShaderStage::Pixel).is_some());
//! ```

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

use bumpalo::Bump;
use rustc_hash::FxHashMap;
use shaderweave_compiler::{
    CollectorPass, CompilerContext, FragmentLibrary, LocatedError, ShaderCompiler, ShaderDefinition,
    ShaderSettings, StageOutput, ValidationPass,
};
use shaderweave_core::{ContentHash, Diagnostic, DiagnosticSink, Diagnostics, ShaderError};
use shaderweave_ir::reflection::{ResourceBinding, UniformBuffer, UniformMember};
use shaderweave_ir::{PassPipeline, PipelineDescriptor, ShaderStage, reflect_module};
use shaderweave_parser::Parser;

use crate::artifact::{CompiledShader, StageArtifact, StageFailure, StageResult};
use crate::error::{ProjectError, Result};
use crate::inputs::ShaderInputs;

/// A named fragment source unit.
#[derive(Debug, Clone)]
struct SourceUnit {
    origin: Arc<str>,
    text: Arc<str>,
    hash: ContentHash,
}

impl SourceUnit {
    fn new(origin: Arc<str>, text: &str) -> Self {
        Self {
            origin,
            hash: ContentHash::of(text),
            text: Arc::from(text),
        }
    }
}

/// Shaders compiled by one run, plus the library's own diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CompileBatch {
    pub shaders: Vec<CompiledShader>,
    /// Parse, collection and validation diagnostics.
    pub library: Diagnostics,
}

/// What a compile call did.
#[derive(Debug, Clone, Default)]
pub struct CompileSummary {
    /// Shaders compiled, in definition order.
    pub compiled: Vec<String>,
    /// Library, composition and stage diagnostics of this run.
    pub diagnostics: Diagnostics,
}

/// A compile running on a background thread.
///
/// There is no cancellation: dropping the ticket discards the result once
/// the compile finishes.
#[derive(Debug)]
pub struct CompileTicket {
    receiver: Receiver<CompileBatch>,
}

impl CompileTicket {
    /// Block until the compile finishes.
    pub fn wait(self) -> Result<CompileBatch> {
        self.receiver.recv().map_err(|_| ProjectError::Disconnected)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// The inputs of one compile, detached from the project so it can move to
/// another thread.
#[derive(Clone)]
struct Snapshot {
    ctx: Arc<CompilerContext>,
    sources: Vec<SourceUnit>,
}

impl Snapshot {
    fn source(&self, origin: &str) -> Option<&SourceUnit> {
        self.sources.iter().find(|s| &*s.origin == origin)
    }

    /// Diagnostic for an error located in a source unit, or in a
    /// composite when `composite` names it.
    fn diagnostic(&self, located: &LocatedError, composite: Option<(&str, &str)>) -> Diagnostic {
        let error = ShaderError::from(located.error.clone());
        let source = match composite {
            Some((name, text)) if name == &*located.origin => Some(text),
            _ => self.source(&located.origin).map(|s| &*s.text),
        };
        Diagnostic::from_error(located.origin.clone(), &error, source)
    }

    /// Parse, collect and validate every unit, then hand the library to
    /// `f`.
    fn with_library<R>(&self, diagnostics: &mut Diagnostics, f: impl FnOnce(&FragmentLibrary<'_>) -> R) -> R {
        let arena = Bump::new();
        let mut library = FragmentLibrary::new();

        for unit in &self.sources {
            match Parser::parse(&unit.text, &arena) {
                Ok(script) => {
                    let errors = CollectorPass::new(&self.ctx, unit.origin.clone())
                        .run(&script)
                        .register(&mut library);
                    for error in errors {
                        diagnostics.push_error(&unit.origin, error, Some(&*unit.text));
                    }
                }
                Err(errors) => {
                    for error in errors.into_vec() {
                        diagnostics.push_error(&unit.origin, error, Some(&*unit.text));
                    }
                }
            }
        }
        log::debug!("collected {} fragment types from {} units", library.len(), self.sources.len());

        let validation = ValidationPass::new(&self.ctx, &mut library).run();
        diagnostics.extend(validation.errors.iter().map(|e| self.diagnostic(e, None)));

        f(&library)
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn compile(&self, definitions: &[ShaderDefinition], pipeline: &PipelineDescriptor) -> CompileBatch {
        let mut library_diagnostics = Diagnostics::new();
        let shaders: Vec<CompiledShader> = self.with_library(&mut library_diagnostics, |library| {
            std::thread::scope(|scope| {
                let handles: Vec<_> = definitions
                    .iter()
                    .map(|definition| scope.spawn(move || self.compile_shader(library, definition, pipeline)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
                    .collect()
            })
        });
        CompileBatch {
            shaders,
            library: library_diagnostics,
        }
    }

    fn compile_shader(
        &self,
        library: &FragmentLibrary<'_>,
        definition: &ShaderDefinition,
        pipeline: &PipelineDescriptor,
    ) -> CompiledShader {
        let start = Instant::now();

        let output = ShaderCompiler::new(&self.ctx, library).compile(definition);
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(output.errors.iter().map(|e| self.diagnostic(e, None)));

        let composition_failed = diagnostics.has_errors();
        let stages = output
            .stages
            .into_iter()
            .map(|stage| self.finish_stage(stage, composition_failed, pipeline))
            .collect();

        let mut sources: Vec<(Arc<str>, ContentHash)> = Vec::new();
        let mut depends_on_all_sources = false;
        for fragment in &definition.fragments {
            let Some(origin) = library.find_type(fragment).map(|ty| ty.origin.clone()) else {
                depends_on_all_sources = true;
                continue;
            };
            if sources.iter().any(|(o, _)| *o == origin) {
                continue;
            }
            if let Some(unit) = self.source(&origin) {
                sources.push((origin, unit.hash));
            }
        }
        if depends_on_all_sources {
            sources = self.sources.iter().map(|u| (u.origin.clone(), u.hash)).collect();
        }

        let shader = CompiledShader {
            name: definition.name.clone(),
            stages,
            diagnostics,
            definition: definition.clone(),
            sources,
            depends_on_all_sources,
        };
        log::debug!(
            "shader '{}' finished in {:?}: {} of {} stages compiled",
            shader.name,
            start.elapsed(),
            shader.artifacts().count(),
            shader.stages.len()
        );
        shader
    }

    /// Run a stage's module through the pipeline. Composition errors fail
    /// every stage of the shader but stay on the shader's own diagnostics.
    fn finish_stage(&self, stage: StageOutput, composition_failed: bool, pipeline: &PipelineDescriptor) -> StageResult {
        let composite = stage.interface.composite.clone();
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(
            stage
                .all_errors()
                .map(|e| self.diagnostic(e, Some((composite.as_str(), stage.composite.as_str())))),
        );
        if composition_failed || diagnostics.has_errors() {
            log::warn!(
                "stage {:?} of '{}' skipped with {} stage errors",
                stage.stage,
                composite,
                diagnostics.error_count()
            );
            return Err(StageFailure {
                stage: stage.stage,
                composite_text: stage.composite,
                diagnostics,
            });
        }

        let module = &stage.lowered.module;
        match PassPipeline::new(pipeline.clone()).run(module, reflect_module(module)) {
            Ok(result) => Ok(StageArtifact::new(
                stage.stage,
                stage.fragments,
                stage.composite,
                stage.translated.text,
                stage.interface,
                result,
            )),
            Err(error) => {
                log::warn!("stage {:?} of '{}' failed in the pipeline: {error}", stage.stage, composite);
                let origin: Arc<str> = Arc::from(composite.as_str());
                diagnostics.push_error(&origin, error, None);
                Err(StageFailure {
                    stage: stage.stage,
                    composite_text: stage.composite,
                    diagnostics,
                })
            }
        }
    }
}

// ============================================================================
// Project
// ============================================================================

/// Fragment sources, shader definitions and their compiled artifacts.
pub struct ShaderProject {
    ctx: Arc<CompilerContext>,
    sources: Vec<SourceUnit>,
    definitions: Vec<ShaderDefinition>,
    compiled: FxHashMap<String, CompiledShader>,
    library_diagnostics: Diagnostics,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for ShaderProject {
    fn default() -> Self {
        Self::new(ShaderSettings::default())
    }
}

impl ShaderProject {
    /// A project compiling with `settings` and the default resolvers.
    pub fn new(settings: ShaderSettings) -> Self {
        Self::with_context(CompilerContext::new(settings))
    }

    pub fn with_context(ctx: CompilerContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            sources: Vec::new(),
            definitions: Vec::new(),
            compiled: FxHashMap::default(),
            library_diagnostics: Diagnostics::new(),
            sink: None,
        }
    }

    pub fn context(&self) -> &CompilerContext {
        &self.ctx
    }

    /// Forward every diagnostic raised from now on to `sink`.
    pub fn set_diagnostic_sink(&mut self, sink: impl DiagnosticSink + 'static) {
        self.sink = Some(Arc::new(sink));
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            ctx: self.ctx.clone(),
            sources: self.sources.clone(),
        }
    }

    fn forward(&self, diagnostics: &Diagnostics) {
        if let Some(sink) = &self.sink {
            diagnostics.forward(sink.as_ref());
        }
    }

    // ========================================================================
    // Sources
    // ========================================================================

    /// Add a source unit under `origin`.
    pub fn add_source(&mut self, origin: impl AsRef<str>, text: impl AsRef<str>) -> Result<()> {
        let origin = origin.as_ref();
        if self.has_source(origin) {
            return Err(ProjectError::DuplicateSource(origin.to_string()));
        }
        self.sources.push(SourceUnit::new(Arc::from(origin), text.as_ref()));
        Ok(())
    }

    /// Replace a unit's text. Returns whether the content hash changed.
    pub fn update_source(&mut self, origin: impl AsRef<str>, text: impl AsRef<str>) -> Result<bool> {
        let origin = origin.as_ref();
        let unit = self
            .sources
            .iter_mut()
            .find(|s| &*s.origin == origin)
            .ok_or_else(|| ProjectError::SourceNotFound(origin.to_string()))?;
        let updated = SourceUnit::new(unit.origin.clone(), text.as_ref());
        let changed = updated.hash != unit.hash;
        if changed {
            log::trace!("source '{origin}' changed: {} -> {}", unit.hash, updated.hash);
            *unit = updated;
        }
        Ok(changed)
    }

    pub fn remove_source(&mut self, origin: impl AsRef<str>) -> Result<()> {
        let origin = origin.as_ref();
        let index = self
            .sources
            .iter()
            .position(|s| &*s.origin == origin)
            .ok_or_else(|| ProjectError::SourceNotFound(origin.to_string()))?;
        self.sources.remove(index);
        Ok(())
    }

    pub fn has_source(&self, origin: &str) -> bool {
        self.sources.iter().any(|s| &*s.origin == origin)
    }

    pub fn source_hash(&self, origin: &str) -> Option<ContentHash> {
        self.sources.iter().find(|s| &*s.origin == origin).map(|s| s.hash)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Parse, collect and validate every source unit without composing any
    /// shader.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_library(&mut self) -> &Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let fragments = self.snapshot().with_library(&mut diagnostics, |library| library.len());
        log::debug!("library compiled: {fragments} types, {} errors", diagnostics.error_count());
        self.forward(&diagnostics);
        self.library_diagnostics = diagnostics;
        &self.library_diagnostics
    }

    /// Diagnostics of the last library compile.
    pub fn library_diagnostics(&self) -> &Diagnostics {
        &self.library_diagnostics
    }

    /// Record a shader, replacing any definition with the same name.
    pub fn define_shader(&mut self, definition: ShaderDefinition) -> Option<ShaderDefinition> {
        match self.definitions.iter_mut().find(|d| d.name == definition.name) {
            Some(existing) => Some(std::mem::replace(existing, definition)),
            None => {
                self.definitions.push(definition);
                None
            }
        }
    }

    /// Drop a shader definition and its artifacts.
    pub fn remove_shader(&mut self, name: &str) -> Result<()> {
        let index = self
            .definitions
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| ProjectError::ShaderNotDefined(name.to_string()))?;
        self.definitions.remove(index);
        self.compiled.remove(name);
        Ok(())
    }

    pub fn definitions(&self) -> &[ShaderDefinition] {
        &self.definitions
    }

    /// Compile every defined shader.
    pub fn compile(&mut self, pipeline: &PipelineDescriptor) -> CompileSummary {
        let batch = self.snapshot().compile(&self.definitions, pipeline);
        self.install(batch)
    }

    /// Compile every defined shader on a background thread. Pass the
    /// ticket's batch to [`install`](Self::install) to store it.
    pub fn compile_async(&self, pipeline: &PipelineDescriptor) -> Result<CompileTicket> {
        let snapshot = self.snapshot();
        let definitions = self.definitions.clone();
        let pipeline = pipeline.clone();
        let (sender, receiver) = mpsc::channel();
        std::thread::Builder::new()
            .name("shaderweave-compile".into())
            .spawn(move || {
                let batch = snapshot.compile(&definitions, &pipeline);
                if sender.send(batch).is_err() {
                    log::debug!("compile result dropped; ticket was discarded");
                }
            })?;
        Ok(CompileTicket { receiver })
    }

    /// Store a batch's shaders, replacing earlier artifacts.
    pub fn install(&mut self, batch: CompileBatch) -> CompileSummary {
        let mut diagnostics = batch.library.clone();
        let mut compiled = Vec::with_capacity(batch.shaders.len());
        for shader in batch.shaders {
            diagnostics.extend(shader.all_diagnostics().cloned());
            compiled.push(shader.name.clone());
            self.compiled.insert(shader.name.clone(), shader);
        }
        self.forward(&diagnostics);
        self.library_diagnostics = batch.library;
        CompileSummary { compiled, diagnostics }
    }

    /// Whether a shader's definition or fragment sources changed since it
    /// was compiled. Shaders never compiled are stale.
    pub fn is_stale(&self, name: &str) -> bool {
        let Some(shader) = self.compiled.get(name) else {
            return true;
        };
        if self.definitions.iter().all(|d| *d != shader.definition) {
            return true;
        }
        if shader.depends_on_all_sources && shader.sources.len() != self.sources.len() {
            return true;
        }
        shader
            .sources
            .iter()
            .any(|(origin, hash)| self.source_hash(origin) != Some(*hash))
    }

    /// Recompile only the shaders whose fragment sources changed.
    pub fn recompile_stale(&mut self, pipeline: &PipelineDescriptor) -> CompileSummary {
        let stale: Vec<ShaderDefinition> = self
            .definitions
            .iter()
            .filter(|d| self.is_stale(&d.name))
            .cloned()
            .collect();
        if stale.is_empty() {
            return CompileSummary::default();
        }
        log::debug!("recompiling {} stale shaders", stale.len());
        let batch = self.snapshot().compile(&stale, pipeline);
        self.install(batch)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn find_shader(&self, name: &str) -> Option<&CompiledShader> {
        self.compiled.get(name)
    }

    /// Final uniform location of `fragment.property` in one stage of a
    /// compiled shader.
    pub fn find_property(
        &self,
        shader: &str,
        stage: ShaderStage,
        fragment: &str,
        property: &str,
    ) -> Option<(&UniformBuffer, &UniformMember)> {
        self.find_shader(shader)?.find_property(stage, fragment, property)
    }

    pub fn find_sampler_bindings(
        &self,
        shader: &str,
        stage: ShaderStage,
        fragment: &str,
        property: &str,
    ) -> Vec<&ResourceBinding> {
        self.find_shader(shader)
            .map(|s| s.find_sampler_bindings(stage, fragment, property))
            .unwrap_or_default()
    }

    /// Zeroed input blocks for a compiled shader.
    pub fn shader_inputs(&self, shader: &str) -> Option<ShaderInputs<'_>> {
        self.find_shader(shader).map(ShaderInputs::new)
    }
}
