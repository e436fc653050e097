//! Stage Compositor - Merge the fragments of a shader into one program per
//! stage.
//!
//! Composition runs over five stages: the `Cpu` pseudo-stage (the vertex
//! buffer), `Vertex`, an optional `Geometry`, `Pixel` and the `Gpu`
//! pseudo-stage (the render targets).
//!
//! ## Steps
//!
//! 1. Partition the requested fragments by stage
//! 2. Record every stage's expected outputs and the last fragment writing
//!    each of them
//! 3. Resolve every input field of every fragment, walking its input
//!    attributes in order; the first one that can be satisfied wins
//! 4. Add geometry pass-throughs for values the pixel stage reads from the
//!    vertex stage without the geometry fragment producing them
//! 5. Link adjacent stages: each stage input becomes a computed output of
//!    the previous stage, and both sides get the same location
//! 6. Generate the composite source and the [`StageInterface`] of each
//!    stage
//!
//! The composite source is ordinary fragment-language text. It is compiled
//! like any other unit into a library layered over the fragment library.

mod composite;
mod interface;
mod stage_info;

pub(crate) use composite::emit_vertex_helper;
pub use interface::{
    BUILTIN_FRAGMENT, GeometryInterface, InterfaceField, ResourceField, SpecConstantField,
    StageInterface, UniformField,
};
pub use stage_info::{
    FieldKey, FieldMap, FieldResolution, FragmentInfo, InputKind, LinkEntry, LinkTag, StageInfo,
    StageKind,
};

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use shaderweave_core::{CompileError, Span};
use shaderweave_ir::ShaderStage;
use shaderweave_parser::ast::{Expr, LiteralKind, UnaryOp};

use crate::context::{CompilerContext, LocatedError};
use crate::core_types::ShaderType;
use crate::library::{Field, FieldFlags, FragmentLibrary, FragmentType};
use crate::settings::{Direction, Primitive};

/// A shader to compose: an ordered list of fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDefinition {
    pub name: String,
    pub fragments: Vec<String>,
    /// Overrides the configured render targets for this shader.
    pub render_targets: Option<Vec<String>>,
}

impl ShaderDefinition {
    pub fn new<I, S>(name: impl Into<String>, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fragments: fragments.into_iter().map(Into::into).collect(),
            render_targets: None,
        }
    }

    pub fn with_render_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.render_targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }
}

/// One composed stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedStage {
    pub stage: ShaderStage,
    pub info: StageInfo,
    pub interface: StageInterface,
    /// Source of the composite and its helper structs.
    pub text: String,
    /// Fragments composed into the stage, in order.
    pub fragments: Vec<String>,
}

/// Result of composing one shader.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionOutput {
    pub shader: String,
    /// Vertex, geometry (when present) and pixel, in pipeline order.
    pub stages: Vec<ComposedStage>,
    /// Collected errors (composition continues past them).
    pub errors: Vec<LocatedError>,
}

impl CompositionOutput {
    pub fn stage(&self, stage: ShaderStage) -> Option<&ComposedStage> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Stream shapes of the geometry fragment's `Main`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GeometryShape {
    /// Element struct of the input stream.
    pub input: String,
    /// Element struct of the output stream.
    pub output: String,
    pub input_stream: String,
    pub output_stream: String,
    pub input_primitive: Primitive,
    pub output_primitive: Primitive,
    pub max_vertices: u32,
}

/// Composes shaders out of a fragment library.
pub struct Compositor<'c, 'a> {
    ctx: &'c CompilerContext,
    library: &'c FragmentLibrary<'a>,
}

impl<'c, 'a> Compositor<'c, 'a> {
    pub fn new(ctx: &'c CompilerContext, library: &'c FragmentLibrary<'a>) -> Self {
        Self { ctx, library }
    }

    /// Compose every stage of `definition`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compose(&self, definition: &ShaderDefinition) -> CompositionOutput {
        let settings = self.ctx.settings();
        let render_targets = definition
            .render_targets
            .clone()
            .unwrap_or_else(|| settings.render_targets.clone());
        let mut run = Composition {
            ctx: self.ctx,
            library: self.library,
            shader: definition.name.clone(),
            origin: Arc::from(definition.name.as_str()),
            render_targets,
            errors: Vec::new(),
        };
        let stages = run.compose(&definition.fragments);
        log::debug!(
            "composed shader '{}': {} stages, {} errors",
            definition.name,
            stages.len(),
            run.errors.len()
        );
        CompositionOutput {
            shader: definition.name.clone(),
            stages,
            errors: run.errors,
        }
    }
}

// ============================================================================
// Composition run
// ============================================================================

struct Composition<'c, 'a> {
    ctx: &'c CompilerContext,
    library: &'c FragmentLibrary<'a>,
    shader: String,
    origin: Arc<str>,
    render_targets: Vec<String>,
    errors: Vec<LocatedError>,
}

impl<'c, 'a> Composition<'c, 'a> {
    fn error(&mut self, origin: &Arc<str>, error: CompileError) {
        self.errors.push(LocatedError::new(origin, error));
    }

    fn compose(&mut self, requested: &[String]) -> Vec<ComposedStage> {
        let library = self.library;
        let names = self.ctx.names();

        // 1. Partition by stage
        let mut vertex: Vec<&FragmentType<'a>> = Vec::new();
        let mut geometry: Vec<&FragmentType<'a>> = Vec::new();
        let mut pixel: Vec<&FragmentType<'a>> = Vec::new();
        for name in requested {
            let fragment = library.find_type(name);
            match fragment.and_then(|f| f.stage.shader_stage().map(|s| (f, s))) {
                Some((f, ShaderStage::Vertex)) => vertex.push(f),
                Some((f, ShaderStage::Geometry)) => geometry.push(f),
                Some((f, ShaderStage::Pixel)) => pixel.push(f),
                None => {
                    let origin = self.origin.clone();
                    self.error(
                        &origin,
                        CompileError::UnknownFragment {
                            name: name.clone(),
                            span: Span::default(),
                        },
                    );
                }
            }
        }
        if geometry.len() > 1 {
            let extra = geometry[1];
            self.error(
                &extra.origin,
                CompileError::AttributeCountExceeded {
                    attribute: names.geometry_attribute.clone(),
                    target: format!("shader '{}'", self.shader),
                    max: 1,
                    span: extra.span,
                },
            );
            geometry.truncate(1);
        }
        let geometry = match geometry.first().copied() {
            Some(g) => match self.geometry_shape(g) {
                Some(shape) => Some((g, shape)),
                None => {
                    let span = g.main_function().map_or(g.span, |m| m.span);
                    self.error(
                        &g.origin,
                        CompileError::InvalidMainSignature {
                            fragment: g.name.clone(),
                            message: "geometry Main must map a stream of structs to a stream of structs".into(),
                            span,
                        },
                    );
                    None
                }
            },
            None => None,
        };

        // 2. Expected outputs
        let mut cpu = StageInfo::new(StageKind::Cpu);
        for attribute in &self.ctx.settings().vertex_definitions {
            match ShaderType::from_name(&attribute.type_name) {
                Some(ty) => {
                    cpu.expected_outputs.find_or_create(&attribute.name, &ty);
                }
                None => log::warn!(
                    "vertex attribute '{}' has unknown type '{}'",
                    attribute.name,
                    attribute.type_name
                ),
            }
        }

        let mut vertex_info = StageInfo::new(StageKind::Vertex);
        for fragment in &vertex {
            self.collect_outputs(&mut vertex_info, fragment);
        }

        let mut geometry_info = None;
        let mut geometry_own_outputs = FieldMap::new();
        if let Some((fragment, shape)) = &geometry {
            let mut info = StageInfo::new(StageKind::Geometry);
            if let Some(output) = library.find_type(&shape.output) {
                for field in output.instance_fields() {
                    self.record_output(&mut info, &fragment.name, &field.name, &field.ty);
                }
            }
            geometry_own_outputs = info.expected_outputs.clone();
            info.expected_outputs.merge(&vertex_info.expected_outputs);
            geometry_info = Some(info);
        }

        let mut pixel_info = StageInfo::new(StageKind::Pixel);
        for fragment in &pixel {
            self.collect_outputs(&mut pixel_info, fragment);
        }

        let mut gpu = StageInfo::new(StageKind::Gpu);
        let target_type = ShaderType::vector(crate::core_types::ScalarType::Real, 4);
        for target in &self.render_targets {
            if pixel_info
                .expected_outputs
                .contains(&FieldKey::of(target, &target_type))
            {
                gpu.inputs
                    .find_or_create(target, &target_type)
                    .tag(LinkTag::StageInput);
            }
        }

        // 3. Input resolution
        self.resolve_stage(&mut vertex_info, Some(&cpu), &vertex);
        if let (Some(info), Some((fragment, shape))) = (geometry_info.as_mut(), &geometry) {
            self.resolve_stage(info, None, std::slice::from_ref(fragment));
            self.resolve_geometry_input(info, &vertex_info, shape);
        }
        self.resolve_stage(
            &mut pixel_info,
            Some(geometry_info.as_ref().unwrap_or(&vertex_info)),
            &pixel,
        );

        // 4. Geometry pass-through
        if let Some(info) = geometry_info.as_mut() {
            for entry in pixel_info.inputs.iter() {
                let key = entry.key();
                if vertex_info.expected_outputs.contains(&key) && !geometry_own_outputs.contains(&key) {
                    let mut input = LinkEntry::new(&entry.name, entry.ty.clone());
                    input.tag(LinkTag::StageInput);
                    info.inputs.insert(&input);
                    info.pass_through.insert(&input);
                }
            }
        }

        // 5. Linking, last stage first so earlier stages see every consumer
        self.link(&mut pixel_info, &mut gpu);
        match geometry_info.as_mut() {
            Some(info) => {
                self.link(info, &mut pixel_info);
                self.link(&mut vertex_info, info);
            }
            None => self.link(&mut vertex_info, &mut pixel_info),
        }
        self.link(&mut cpu, &mut vertex_info);

        // 6. Composites
        let mut binding = self.ctx.settings().layout.first_resource_binding;
        let mut stages = vec![self.finish_stage(ShaderStage::Vertex, vertex_info, &vertex, None, &mut binding)];
        if let (Some(info), Some((fragment, shape))) = (geometry_info, &geometry) {
            stages.push(self.finish_stage(
                ShaderStage::Geometry,
                info,
                std::slice::from_ref(fragment),
                Some(shape),
                &mut binding,
            ));
        }
        stages.push(self.finish_stage(ShaderStage::Pixel, pixel_info, &pixel, None, &mut binding));
        stages
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    fn collect_outputs(&mut self, info: &mut StageInfo, fragment: &FragmentType<'a>) {
        for field in fragment
            .fields
            .iter()
            .filter(|f| f.is_output() && !f.is_static() && !f.is_opaque())
        {
            self.record_output(info, &fragment.name, &field.name, &field.ty);
        }
    }

    fn record_output(&self, info: &mut StageInfo, fragment: &str, name: &str, ty: &ShaderType) {
        info.expected_outputs.find_or_create(name, ty);
        info.last_writers
            .insert(FieldKey::of(name, ty), fragment.to_string());

        let system_value = info.kind.shader_stage().and_then(|stage| {
            self.ctx
                .settings()
                .find_system_value(stage, name, &ty.name(), Direction::Output)
        });
        if let Some(system_value) = system_value {
            for map in [&mut info.system_values, &mut info.computed_outputs] {
                let entry = map.find_or_create(name, ty);
                entry.tag(LinkTag::SystemValueOutput);
                entry.system_value = Some(system_value.target.clone());
            }
        }
    }

    // ========================================================================
    // Input resolution
    // ========================================================================

    fn resolve_stage(
        &mut self,
        info: &mut StageInfo,
        previous: Option<&StageInfo>,
        fragments: &[&FragmentType<'a>],
    ) {
        // Outputs of the fragments resolved so far.
        let mut produced: FxHashMap<FieldKey, String> = FxHashMap::default();
        for fragment in fragments {
            let mut resolved = FragmentInfo::new(&fragment.name);
            for field in &fragment.fields {
                let resolution = self.resolve_field(info, previous, &produced, fragment, field);
                if field.is_output() {
                    produced.insert(FieldKey::of(&field.name, &field.ty), fragment.name.clone());
                }
                resolved.fields.push(resolution);
            }
            info.fragments.push(resolved);
        }
    }

    fn resolve_field(
        &mut self,
        info: &mut StageInfo,
        previous: Option<&StageInfo>,
        produced: &FxHashMap<FieldKey, String>,
        fragment: &FragmentType<'a>,
        field: &Field<'a>,
    ) -> FieldResolution {
        let ctx = self.ctx;
        let names = ctx.names();
        let resolution = |kind| FieldResolution {
            field: field.name.clone(),
            ty: field.ty.clone(),
            kind,
            unresolved: false,
        };

        if field.is_static() || field.flags.contains(FieldFlags::SPEC_CONSTANT) {
            return resolution(InputKind::Local);
        }
        if field.is_opaque() {
            // Opaque values cannot be copied; they are bound directly.
            return resolution(InputKind::Property);
        }
        if !field.is_input() {
            return resolution(InputKind::Local);
        }

        let key = FieldKey::of(&field.name, &field.ty);
        let type_name = field.type_name();
        for attribute in field.attributes.iter() {
            let attribute = attribute.name.as_str();
            if attribute == names.fragment_input_attribute {
                if let Some(source) = produced.get(&key) {
                    return resolution(InputKind::Fragment {
                        source: source.clone(),
                    });
                }
            } else if attribute == names.stage_input_attribute {
                if previous.is_some_and(|p| p.expected_outputs.contains(&key)) {
                    info.inputs
                        .find_or_create(&field.name, &field.ty)
                        .tag(LinkTag::StageInput);
                    return resolution(InputKind::Stage);
                }
            } else if attribute == names.builtin_input_attribute {
                if ctx.settings().find_builtin(&field.name, &type_name).is_some() {
                    info.builtins.find_or_create(&field.name, &field.ty);
                    return resolution(InputKind::BuiltIn);
                }
                let system_value = info.kind.shader_stage().and_then(|stage| {
                    ctx.settings()
                        .find_system_value(stage, &field.name, &type_name, Direction::Input)
                });
                if let Some(system_value) = system_value {
                    let entry = info.system_values.find_or_create(&field.name, &field.ty);
                    entry.tag(LinkTag::SystemValueInput);
                    entry.system_value = Some(system_value.target.clone());
                    return resolution(InputKind::BuiltIn);
                }
            } else if attribute == names.property_input_attribute {
                info.properties
                    .find_or_create(&names.mangle_property(&fragment.name, &field.name), &field.ty);
                return resolution(InputKind::Property);
            }
        }

        self.error(
            &fragment.origin,
            CompileError::UnresolvedInput {
                fragment: fragment.name.clone(),
                field: field.name.clone(),
                span: field.span,
            },
        );
        info.properties
            .find_or_create(&names.mangle_property(&fragment.name, &field.name), &field.ty);
        FieldResolution {
            unresolved: true,
            ..resolution(InputKind::Property)
        }
    }

    /// Every field of the geometry input struct is read from the vertex
    /// stage.
    fn resolve_geometry_input(&mut self, info: &mut StageInfo, vertex: &StageInfo, shape: &GeometryShape) {
        let Some(input) = self.library.find_type(&shape.input) else {
            return;
        };
        let mut resolved = FragmentInfo::new(&input.name);
        for field in input.instance_fields() {
            let key = FieldKey::of(&field.name, &field.ty);
            let found = vertex.expected_outputs.contains(&key);
            if found {
                info.inputs
                    .find_or_create(&field.name, &field.ty)
                    .tag(LinkTag::StageInput);
            } else {
                self.error(
                    &input.origin,
                    CompileError::UnresolvedInput {
                        fragment: input.name.clone(),
                        field: field.name.clone(),
                        span: field.span,
                    },
                );
            }
            resolved.fields.push(FieldResolution {
                field: field.name.clone(),
                ty: field.ty.clone(),
                kind: InputKind::Stage,
                unresolved: !found,
            });
        }
        info.fragments.push(resolved);
    }

    fn geometry_shape(&self, fragment: &FragmentType<'a>) -> Option<GeometryShape> {
        let main = fragment.main_function()?;
        let [input, output] = main.params.as_slice() else {
            return None;
        };
        let (ShaderType::Stream(input), ShaderType::Stream(output)) = (&input.ty, &output.ty) else {
            return None;
        };
        let (ShaderType::Struct(input_element), ShaderType::Struct(output_element)) =
            (input.element.as_ref(), output.element.as_ref())
        else {
            return None;
        };
        Some(GeometryShape {
            input: input_element.clone(),
            output: output_element.clone(),
            input_stream: input.name.clone(),
            output_stream: output.name.clone(),
            input_primitive: input.primitive,
            output_primitive: output.primitive,
            max_vertices: fragment.geometry.as_ref().map_or(0, |g| g.max_vertices),
        })
    }

    // ========================================================================
    // Linking
    // ========================================================================

    /// Make every input of `current` a computed output of `previous` and
    /// give both sides the same location.
    fn link(&self, previous: &mut StageInfo, current: &mut StageInfo) {
        for entry in current.inputs.iter() {
            previous
                .computed_outputs
                .find_or_create(&entry.name, &entry.ty)
                .tag(LinkTag::StageOutput);
        }

        let settings = self.ctx.settings();
        let mut next = 0;
        for entry in previous
            .computed_outputs
            .iter_mut()
            .filter(|e| e.has(LinkTag::StageOutput))
        {
            entry.location = match (previous.kind, current.kind) {
                (StageKind::Cpu, _) => settings
                    .vertex_definitions
                    .iter()
                    .position(|v| v.name == entry.name)
                    .map(|i| i as u32),
                (_, StageKind::Gpu) => self
                    .render_targets
                    .iter()
                    .position(|t| *t == entry.name)
                    .map(|i| i as u32),
                _ => {
                    next += 1;
                    Some(next - 1)
                }
            };
        }
        for entry in current.inputs.iter_mut() {
            entry.location = previous
                .computed_outputs
                .get(&entry.key())
                .and_then(|e| e.location);
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    fn finish_stage(
        &self,
        stage: ShaderStage,
        info: StageInfo,
        fragments: &[&FragmentType<'a>],
        geometry: Option<&GeometryShape>,
        binding: &mut u32,
    ) -> ComposedStage {
        let interface = self.build_interface(stage, &info, fragments, geometry, binding);
        let text = composite::write_composite(self.ctx, self.library, &info, &interface, fragments, geometry);
        ComposedStage {
            stage,
            info,
            interface,
            text,
            fragments: fragments.iter().map(|f| f.name.clone()).collect(),
        }
    }

    fn build_interface(
        &self,
        stage: ShaderStage,
        info: &StageInfo,
        fragments: &[&FragmentType<'a>],
        geometry: Option<&GeometryShape>,
        binding: &mut u32,
    ) -> StageInterface {
        let settings = self.ctx.settings();
        let names = self.ctx.names();
        let composite = names.composite_name(&self.shader, stage);
        let mut interface = StageInterface::new(stage, composite.clone());

        for entry in info.inputs.iter() {
            interface.inputs.push(InterfaceField {
                name: entry.name.clone(),
                ty: entry.ty.clone(),
                location: entry.location,
                system_value: None,
                global: Some(format!("in_{}", entry.name)),
            });
        }
        for entry in info
            .system_values
            .iter()
            .filter(|e| e.has(LinkTag::SystemValueInput))
        {
            interface.inputs.push(InterfaceField {
                name: entry.name.clone(),
                ty: entry.ty.clone(),
                location: None,
                system_value: entry.system_value.clone(),
                global: None,
            });
        }
        for entry in info.computed_outputs.iter() {
            let global = entry.has(LinkTag::StageOutput).then(|| {
                if stage == ShaderStage::Pixel {
                    entry.name.clone()
                } else {
                    format!("out_{}", entry.name)
                }
            });
            let system_value = entry
                .has(LinkTag::SystemValueOutput)
                .then(|| entry.system_value.clone())
                .flatten();
            interface.outputs.push(InterfaceField {
                name: entry.name.clone(),
                ty: entry.ty.clone(),
                location: entry.location,
                system_value,
                global,
            });
        }

        for entry in info.builtins.iter() {
            let is_static = settings
                .find_builtin(&entry.name, &entry.ty.name())
                .is_some_and(|b| b.is_static);
            interface.uniforms.push(UniformField {
                member: entry.name.clone(),
                ty: entry.ty.clone(),
                fragment: BUILTIN_FRAGMENT.to_string(),
                property: entry.name.clone(),
                is_static,
            });
        }

        let mut used_ids: FxHashSet<u32> = FxHashSet::default();
        let mut pending_ids = Vec::new();
        for fragment in fragments {
            let Some(resolved) = info.fragment(&fragment.name) else {
                continue;
            };
            for field in &fragment.fields {
                let mangled = names.mangle_property(&fragment.name, &field.name);
                if field.flags.contains(FieldFlags::SPEC_CONSTANT) {
                    let explicit = field
                        .attributes
                        .find(&names.spec_constant_attribute)
                        .and_then(|a| a.param("id").or(a.params.first()))
                        .and_then(|p| p.value.as_int())
                        .and_then(|id| u32::try_from(id).ok());
                    if let Some(id) = explicit {
                        used_ids.insert(id);
                    }
                    interface.spec_constants.push(SpecConstantField {
                        global: mangled,
                        ty: field.ty.clone(),
                        fragment: fragment.name.clone(),
                        property: field.name.clone(),
                        id: explicit.unwrap_or(u32::MAX),
                        default: field.default.and_then(literal_text),
                    });
                    if explicit.is_none() {
                        pending_ids.push(interface.spec_constants.len() - 1);
                    }
                    continue;
                }
                if resolved.field(&field.name).map(|r| &r.kind) != Some(&InputKind::Property) {
                    continue;
                }
                if field.is_opaque() {
                    interface.resources.push(ResourceField {
                        global: mangled,
                        ty: field.ty.clone(),
                        fragment: fragment.name.clone(),
                        property: field.name.clone(),
                        binding: *binding,
                    });
                    *binding += 1;
                } else {
                    interface.uniforms.push(UniformField {
                        member: mangled,
                        ty: field.ty.clone(),
                        fragment: fragment.name.clone(),
                        property: field.name.clone(),
                        is_static: false,
                    });
                }
            }
        }
        let mut next_id = 0;
        for index in pending_ids {
            while used_ids.contains(&next_id) {
                next_id += 1;
            }
            interface.spec_constants[index].id = next_id;
            used_ids.insert(next_id);
        }

        interface.geometry = geometry.map(|shape| GeometryInterface {
            input_struct: format!("{composite}{}Input", names.mangle_separator),
            output_struct: format!("{composite}{}Output", names.mangle_separator),
            input_primitive: shape.input_primitive,
            output_primitive: shape.output_primitive,
            max_vertices: shape.max_vertices,
            fragment_output: shape.output.clone(),
        });
        interface
    }
}

/// Target text of a literal default, possibly negated.
fn literal_text(expr: &Expr<'_>) -> Option<String> {
    match expr.unparen() {
        Expr::Literal(literal) => match literal.kind {
            LiteralKind::Int(value) => Some(value.to_string()),
            LiteralKind::Real(value) => Some(format!("{value:?}")),
            LiteralKind::Bool(value) => Some(value.to_string()),
            LiteralKind::String(_) => None,
        },
        Expr::Unary(unary) if unary.op == UnaryOp::Neg => literal_text(unary.operand).map(|t| format!("-{t}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{CollectorPass, ValidationPass};
    use bumpalo::Bump;
    use shaderweave_parser::Parser;

    fn compose_source(source: &str, fragments: &[&str]) -> CompositionOutput {
        let (validation, out) = compose_unvalidated(source, fragments);
        assert!(validation.is_empty(), "{validation:?}");
        out
    }

    /// Composes even when validation fails, returning the validation errors
    /// alongside.
    fn compose_unvalidated(source: &str, fragments: &[&str]) -> (Vec<LocatedError>, CompositionOutput) {
        let arena = Bump::new();
        let ctx = CompilerContext::default();
        let script = Parser::parse(source, &arena).expect("parse");
        let mut library = FragmentLibrary::new();
        let errors = CollectorPass::new(&ctx, Arc::from("test"))
            .run(&script)
            .register(&mut library);
        assert!(errors.is_empty(), "{errors:?}");
        let validation = ValidationPass::new(&ctx, &mut library).run();
        let out =
            Compositor::new(&ctx, &library).compose(&ShaderDefinition::new("Test", fragments.iter().copied()));
        (validation.errors, out)
    }

    const NORMAL_SCENARIO: &str = r#"
        [Vertex]
        struct A {
            [Output] var Normal : Real3;
            function Main() { this.Normal = Real3(0.0, 1.0, 0.0); }
        }
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() { this.Target0 = Real4(this.Normal, 1.0); }
        }
    "#;

    #[test]
    fn stage_output_links_to_next_stage_input() {
        let out = compose_source(NORMAL_SCENARIO, &["A", "B"]);
        assert!(out.errors.is_empty(), "{:?}", out.errors);

        let vertex = out.stage(ShaderStage::Vertex).unwrap();
        let normal = vertex
            .info
            .computed_outputs
            .get(&FieldKey::new("Normal", "Real3"))
            .unwrap();
        assert!(normal.has(LinkTag::StageOutput));
        assert_eq!(normal.location, Some(0));

        let pixel = out.stage(ShaderStage::Pixel).unwrap();
        assert_eq!(pixel.info.resolution("B", "Normal"), Some(&InputKind::Stage));
        assert_eq!(pixel.interface.inputs[0].location, Some(0));
        assert_eq!(pixel.interface.outputs[0].global.as_deref(), Some("Target0"));
        assert_eq!(pixel.interface.outputs[0].location, Some(0));
    }

    #[test]
    fn fragment_dependency_beats_stage_input() {
        let out = compose_source(
            r#"
            [Vertex]
            struct V { [Output] var Color : Real4; function Main() { } }
            [Pixel]
            struct A { [Output] var Color : Real4; function Main() { } }
            [Pixel]
            struct B { [Input] var Color : Real4; function Main() { } }
            "#,
            &["V", "A", "B"],
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let pixel = out.stage(ShaderStage::Pixel).unwrap();
        assert_eq!(
            pixel.info.resolution("B", "Color"),
            Some(&InputKind::Fragment { source: "A".into() })
        );
        assert!(pixel.info.inputs.is_empty());
        assert!(pixel.text.contains("b.Color = a.Color;"), "{}", pixel.text);
    }

    #[test]
    fn builtins_and_properties() {
        let out = compose_source(
            r#"
            [Vertex]
            struct T {
                [Input] var LocalToWorld : Real4x4;
                [Input] var FrameTime : Real;
                [Input] var Scale : Real;
                function Main() { }
            }
            "#,
            &["T"],
        );
        let vertex = out.stage(ShaderStage::Vertex).unwrap();
        assert_eq!(vertex.info.resolution("T", "LocalToWorld"), Some(&InputKind::BuiltIn));
        assert_eq!(vertex.info.resolution("T", "Scale"), Some(&InputKind::Property));
        let members: Vec<_> = vertex.interface.uniforms.iter().map(|u| u.member.as_str()).collect();
        assert_eq!(members, ["LocalToWorld", "FrameTime", "T_Scale"]);
        assert!(vertex.interface.uniforms[1].is_static);
        assert!(vertex.text.contains("t.FrameTime = Test_Vertex.FrameTime;"), "{}", vertex.text);
        assert!(vertex.text.contains("t.Scale = this.T_Scale;"), "{}", vertex.text);
    }

    #[test]
    fn unresolved_input_falls_back_to_property() {
        let out = compose_source(
            "[Pixel] struct P { [StageInput] var Missing : Real2; function Main() { } }",
            &["P"],
        );
        assert!(matches!(
            &out.errors[0].error,
            CompileError::UnresolvedInput { field, .. } if field == "Missing"
        ));
        let pixel = out.stage(ShaderStage::Pixel).unwrap();
        assert_eq!(pixel.info.resolution("P", "Missing"), Some(&InputKind::Property));
        assert!(pixel.interface.find_uniform("P_Missing").is_some());
    }

    #[test]
    fn system_value_output_is_also_a_varying_when_consumed() {
        let out = compose_source(
            r#"
            [Vertex]
            struct V { [Output] var PerspectivePosition : Real4; function Main() { } }
            [Pixel]
            struct P { [StageInput] var PerspectivePosition : Real4; function Main() { } }
            "#,
            &["V", "P"],
        );
        let vertex = out.stage(ShaderStage::Vertex).unwrap();
        let output = &vertex.interface.outputs[0];
        assert_eq!(output.system_value.as_deref(), Some("gl_Position"));
        assert_eq!(output.global.as_deref(), Some("out_PerspectivePosition"));
    }

    #[test]
    fn unknown_fragment_reported() {
        let out = compose_source("[Pixel] struct P { }", &["P", "Nope"]);
        assert!(matches!(&out.errors[0].error, CompileError::UnknownFragment { name, .. } if name == "Nope"));
        assert_eq!(&*out.errors[0].origin, "Test");
    }

    #[test]
    fn geometry_pass_through() {
        let out = compose_source(
            r#"
            [Vertex]
            struct V {
                [Output] var Position : Real4;
                [Output] var Uv : Real2;
                function Main() { }
            }
            struct GeoIn { var Position : Real4; }
            struct GeoOut { var PerspectivePosition : Real4; }
            [Geometry(maxVertices : 3)]
            struct G {
                function Main(input : TriangleInput[GeoIn], output : TriangleOutput[GeoOut]) { }
            }
            [Pixel]
            struct P { [StageInput] var Uv : Real2; function Main() { } }
            "#,
            &["V", "G", "P"],
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let geometry = out.stage(ShaderStage::Geometry).unwrap();
        let uv = FieldKey::new("Uv", "Real2");
        assert!(geometry.info.pass_through.contains(&uv));
        assert!(geometry.info.inputs.contains(&uv));
        assert!(geometry.info.computed_outputs.contains(&uv));
        assert!(geometry.text.contains("compositeOutput.Uv = inputVertex.Uv;"), "{}", geometry.text);

        let vertex = out.stage(ShaderStage::Vertex).unwrap();
        let names: Vec<_> = vertex.info.varying_outputs().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Position", "Uv"]);
    }

    #[test]
    fn later_fragment_owns_a_shared_output() {
        let out = compose_source(
            r#"
            [Vertex]
            struct A {
                [Output] var Normal : Real3;
                function Main() { this.Normal = Real3(1.0, 0.0, 0.0); }
            }
            [Vertex]
            struct Second {
                [Output] var Normal : Real3;
                function Main() { this.Normal = Real3(0.0, 0.0, 1.0); }
            }
            [Pixel]
            struct B {
                [StageInput] var Normal : Real3;
                [Output] var Target0 : Real4;
                function Main() { this.Target0 = Real4(this.Normal, 1.0); }
            }
            "#,
            &["A", "Second", "B"],
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let vertex = out.stage(ShaderStage::Vertex).unwrap();
        assert_eq!(
            vertex.info.last_writers.get(&FieldKey::new("Normal", "Real3")).map(String::as_str),
            Some("Second")
        );
        assert!(vertex.text.contains("this.Normal = second.Normal;"), "{}", vertex.text);
        assert!(!vertex.text.contains("this.Normal = a.Normal;"), "{}", vertex.text);
    }

    #[test]
    fn geometry_with_scalar_streams_is_reported() {
        let (validation, out) = compose_unvalidated(
            r#"
            [Vertex]
            struct V { [Output] var Position : Real4; function Main() { } }
            [Geometry(maxVertices : 3)]
            struct G {
                function Main(input : TriangleInput[Real4], output : TriangleOutput[Real4]) { }
            }
            [Pixel]
            struct P { [Output] var Target0 : Real4; function Main() { } }
            "#,
            &["V", "G", "P"],
        );
        assert!(
            validation
                .iter()
                .any(|e| matches!(&e.error, CompileError::InvalidMainSignature { fragment, .. } if fragment == "G"))
        );
        assert!(out.errors.iter().any(|e| matches!(
            &e.error,
            CompileError::InvalidMainSignature { fragment, .. } if fragment == "G"
        )));
        assert_eq!(&*out.errors[0].origin, "test");
        assert!(out.stage(ShaderStage::Geometry).is_none());
    }

    #[test]
    fn composition_is_deterministic() {
        let first = compose_source(NORMAL_SCENARIO, &["A", "B"]);
        let second = compose_source(NORMAL_SCENARIO, &["A", "B"]);
        assert_eq!(first, second);
    }
}
