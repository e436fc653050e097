//! Stage globals and the `main` entry point.

use shaderweave_ir::ShaderStage;

use crate::code_builder::{RangeMapping, ShaderCodeBuilder};
use crate::compositor::{InterfaceField, StageInterface, emit_vertex_helper};
use crate::context::CompilerContext;
use crate::core_types::{ScalarType, ShaderType};
use crate::passes::CONSTRUCTOR_NAME;

use super::{StageContext, mangle};

/// Writes the parts of a stage that live outside the composite's
/// functions.
pub(crate) struct EntryWriter<'w> {
    ctx: &'w CompilerContext,
    interface: &'w StageInterface,
    stage: &'w StageContext,
}

impl<'w> EntryWriter<'w> {
    pub fn new(ctx: &'w CompilerContext, interface: &'w StageInterface, stage: &'w StageContext) -> Self {
        Self { ctx, interface, stage }
    }

    fn type_name(&self, ty: &ShaderType) -> String {
        self.ctx.resolvers().type_name(ty)
    }

    fn composite_type(&self) -> String {
        self.type_name(&ShaderType::Struct(self.interface.composite.clone()))
    }

    /// Integer varyings cannot be interpolated.
    fn interpolation(&self, ty: &ShaderType, is_input: bool) -> &'static str {
        let integral = matches!(ty.scalar(), Some(ScalarType::Integer | ScalarType::Boolean));
        let reaches_pixel = if is_input {
            self.interface.stage == ShaderStage::Pixel
        } else {
            self.interface.stage != ShaderStage::Pixel
        };
        if integral && reaches_pixel { "flat " } else { "" }
    }

    fn vertex_count(&self) -> Option<u32> {
        self.interface
            .geometry
            .as_ref()
            .map(|g| g.input_primitive.vertex_count())
    }

    // ========================================================================
    // Globals
    // ========================================================================

    pub fn write_globals(&self, out: &mut ShaderCodeBuilder) {
        let settings = self.ctx.settings();
        let layout = settings.layout;
        let mut wrote = false;

        if let Some(geometry) = &self.interface.geometry {
            out.line(&format!("layout({}) in;", geometry.input_primitive.input_layout()));
            out.line(&format!(
                "layout({}, max_vertices = {}) out;",
                geometry.output_primitive.output_layout(),
                geometry.max_vertices
            ));
            wrote = true;
        }

        for input in self.interface.inputs.iter().filter(|f| f.is_varying()) {
            let Some(global) = &input.global else {
                continue;
            };
            let declarator = match self.vertex_count() {
                Some(count) => format!("{global}[{count}]"),
                None => global.clone(),
            };
            out.line(&format!(
                "{}{}in {} {declarator};",
                location_prefix(input),
                self.interpolation(&input.ty, true),
                self.type_name(&input.ty)
            ));
            wrote = true;
        }
        for output in &self.interface.outputs {
            let Some(global) = &output.global else {
                continue;
            };
            out.line(&format!(
                "{}{}out {} {global};",
                location_prefix(output),
                self.interpolation(&output.ty, false),
                self.type_name(&output.ty)
            ));
            wrote = true;
        }
        if wrote {
            out.newline();
        }

        if !self.interface.uniforms.is_empty() {
            let names = self.ctx.names();
            out.line(&format!(
                "layout(std140, set = {}, binding = {}) uniform {}",
                layout.set, layout.block_binding, names.uniform_block_type()
            ));
            out.begin_scope();
            for uniform in &self.interface.uniforms {
                out.line(&format!(
                    "{};",
                    self.ctx.resolvers().declare(&uniform.ty, &uniform.member)
                ));
            }
            out.end_scope_with(&format!(" {};", names.uniform_block));
            out.newline();
        }

        for resource in &self.interface.resources {
            out.line(&format!(
                "layout(set = {}, binding = {}) uniform {} {};",
                layout.set,
                resource.binding,
                self.type_name(&resource.ty),
                resource.global
            ));
        }
        for constant in &self.interface.spec_constants {
            out.line(&format!(
                "layout(constant_id = {}) const {} {} = {};",
                constant.id,
                self.type_name(&constant.ty),
                constant.global,
                constant
                    .default
                    .as_deref()
                    .unwrap_or_else(|| spec_constant_default(&constant.ty))
            ));
        }
        if !self.interface.resources.is_empty() || !self.interface.spec_constants.is_empty() {
            out.newline();
        }
    }

    // ========================================================================
    // Geometry append helper
    // ========================================================================

    pub fn append_prototype(&self) -> Option<String> {
        let helper = self.stage.append_helper.as_ref()?;
        let geometry = self.interface.geometry.as_ref()?;
        Some(format!(
            "void {helper}({} fragmentOutput, int vertexIndex)",
            self.type_name(&ShaderType::Struct(geometry.fragment_output.clone()))
        ))
    }

    /// `Append` copies one fragment vertex through the composite's output
    /// struct into the stage outputs and emits it.
    pub fn write_append_helper(&self, out: &mut ShaderCodeBuilder) {
        let (Some(prototype), Some(geometry)) = (self.append_prototype(), &self.interface.geometry) else {
            return;
        };
        let input_struct = self.type_name(&ShaderType::Struct(geometry.input_struct.clone()));
        let output_struct = self.type_name(&ShaderType::Struct(geometry.output_struct.clone()));
        let composite = &self.interface.composite;

        out.line(&prototype);
        out.begin_scope();
        out.line(&format!("{input_struct} inputVertex;"));
        for input in &self.interface.inputs {
            if let Some(global) = &input.global {
                out.line(&format!("inputVertex.{} = {global}[vertexIndex];", input.name));
            }
        }
        out.line(&format!("{output_struct} compositeOutput;"));
        out.line(&format!(
            "{}(fragmentOutput, inputVertex, compositeOutput);",
            mangle(self.ctx, composite, emit_vertex_helper())
        ));
        for output in self.written_outputs() {
            if let Some(global) = &output.global {
                out.line(&format!("{global} = compositeOutput.{};", output.name));
            }
            if let Some(target) = &output.system_value {
                out.line(&format!("{target} = compositeOutput.{};", output.name));
            }
        }
        out.line("EmitVertex();");
        out.end_scope();
        out.newline();
    }

    fn written_outputs(&self) -> impl Iterator<Item = &InterfaceField> {
        self.interface
            .outputs
            .iter()
            .filter(|o| o.global.is_some() || o.system_value.is_some())
    }

    // ========================================================================
    // main
    // ========================================================================

    /// Run static initializers, copy stage inputs and uniforms into a
    /// composite instance, call its `Main` and copy the outputs back.
    pub fn write_main(&self, out: &mut ShaderCodeBuilder, inits: &[&(String, Vec<RangeMapping>)]) {
        let names = self.ctx.names();
        let composite = &self.interface.composite;
        out.line("void main()");
        out.begin_scope();
        for (text, mappings) in inits.iter().map(|init| (&init.0, &init.1)) {
            out.write_indent();
            out.append_mapped(text, mappings);
        }

        out.line(&format!(
            "{} self = {}();",
            self.composite_type(),
            mangle(self.ctx, composite, CONSTRUCTOR_NAME)
        ));
        let is_geometry = self.interface.geometry.is_some();
        for input in &self.interface.inputs {
            match (&input.global, &input.system_value) {
                (Some(global), _) if !is_geometry => {
                    out.line(&format!("self.{} = {global};", input.name));
                }
                (None, Some(target)) => {
                    out.line(&format!("self.{} = {target};", input.name));
                }
                _ => {}
            }
        }
        for uniform in self.interface.uniforms.iter().filter(|u| !u.is_static) {
            out.line(&format!("self.{0} = {1}.{0};", uniform.member, names.uniform_block));
        }

        let main = mangle(self.ctx, composite, &names.main_function);
        match (&self.interface.geometry, self.vertex_count()) {
            (Some(geometry), Some(count)) => {
                let input_struct = self.type_name(&ShaderType::Struct(geometry.input_struct.clone()));
                out.line(&format!("{input_struct} vertices[{count}];"));
                out.line(&format!("for (int i = 0; i < {count}; ++i)"));
                out.begin_scope();
                for input in &self.interface.inputs {
                    if let Some(global) = &input.global {
                        out.line(&format!("vertices[i].{} = {global}[i];", input.name));
                    }
                }
                out.end_scope();
                out.line(&format!("{main}(self, vertices);"));
            }
            _ => {
                out.line(&format!("{main}(self);"));
                for output in self.written_outputs() {
                    if let Some(global) = &output.global {
                        out.line(&format!("{global} = self.{};", output.name));
                    }
                    if let Some(target) = &output.system_value {
                        out.line(&format!("{target} = self.{};", output.name));
                    }
                }
            }
        }
        out.end_scope();
    }
}

fn location_prefix(field: &InterfaceField) -> String {
    field
        .location
        .map(|location| format!("layout(location = {location}) "))
        .unwrap_or_default()
}

/// Literal a specialization constant without a default starts from.
fn spec_constant_default(ty: &ShaderType) -> &'static str {
    match ty.scalar() {
        Some(ScalarType::Real) => "0.0",
        Some(ScalarType::Integer) => "0",
        _ => "false",
    }
}
