//! Composite source generation.
//!
//! A composite is a fragment-language struct marked with the stage
//! attribute. Its `Main` constructs every fragment of the stage in order,
//! copies resolved inputs into it, runs the fragment's own `Main`, and
//! copies the last writer of each output back onto the composite.

use rustc_hash::FxHashSet;

use crate::code_builder::ShaderCodeBuilder;
use crate::context::CompilerContext;
use crate::core_types::ShaderType;
use crate::library::{FragmentLibrary, FragmentType};

use super::interface::StageInterface;
use super::stage_info::{FieldKey, InputKind, LinkEntry, LinkTag, StageInfo};
use super::GeometryShape;

/// Identifiers a fragment variable must never shadow.
const RESERVED: &[&str] = &[
    "struct", "class", "var", "function", "constructor", "return", "if", "else", "while", "do",
    "for", "foreach", "in", "break", "continue", "true", "false", "this", "ref", "i", "input",
    "output", "fragmentInput", "fragmentOutput", "inputVertex", "compositeOutput",
];

const HELPER_FUNCTION: &str = "EmitVertexHelper";

/// Write the composite for one stage.
pub(crate) fn write_composite(
    ctx: &CompilerContext,
    library: &FragmentLibrary<'_>,
    info: &StageInfo,
    interface: &StageInterface,
    fragments: &[&FragmentType<'_>],
    geometry: Option<&GeometryShape>,
) -> String {
    let writer = CompositeWriter {
        ctx,
        library,
        info,
        interface,
        variables: variable_names(fragments),
        out: ShaderCodeBuilder::new(),
    };
    match geometry {
        Some(shape) => writer.write_geometry(fragments, shape),
        None => writer.write_linear(fragments),
    }
}

/// Local variable name for each fragment: the lowercased name, made
/// unique against keywords and earlier fragments.
fn variable_names(fragments: &[&FragmentType<'_>]) -> Vec<(String, String)> {
    let mut used: FxHashSet<String> = RESERVED.iter().map(|s| s.to_string()).collect();
    let mut names = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let base = fragment.name.to_lowercase();
        let mut candidate = base.clone();
        let mut suffix = 1;
        while used.contains(&candidate) {
            candidate = format!("{base}{suffix}");
            suffix += 1;
        }
        used.insert(candidate.clone());
        names.push((fragment.name.clone(), candidate));
    }
    names
}

struct CompositeWriter<'w, 'a> {
    ctx: &'w CompilerContext,
    library: &'w FragmentLibrary<'a>,
    info: &'w StageInfo,
    interface: &'w StageInterface,
    variables: Vec<(String, String)>,
    out: ShaderCodeBuilder,
}

impl CompositeWriter<'_, '_> {
    fn variable<'s>(&'s self, fragment: &'s str) -> &'s str {
        self.variables
            .iter()
            .find(|(name, _)| name == fragment)
            .map_or(fragment, |(_, var)| var.as_str())
    }

    // ========================================================================
    // Vertex and pixel
    // ========================================================================

    fn write_linear(mut self, fragments: &[&FragmentType<'_>]) -> String {
        let info = self.info;
        let names = self.ctx.names();
        self.out.line(&format!("[{}]", names.stage_attribute(self.interface.stage)));
        self.out.line(&format!("struct {}", self.interface.composite));
        self.out.begin_scope();

        self.write_uniforms();
        for entry in info.stage_variables().iter() {
            self.write_stage_variable(entry);
        }

        self.out.newline();
        self.out.line(&format!("function {}()", names.main_function));
        self.out.begin_scope();
        for fragment in fragments {
            self.write_fragment_run(fragment, &[]);
        }
        for entry in info.computed_outputs.iter() {
            if let Some(writer) = info.last_writers.get(&entry.key()) {
                let line = format!("this.{0} = {1}.{0};", entry.name, self.variable(writer));
                self.out.line(&line);
            }
        }
        self.out.end_scope();
        self.out.end_scope();
        self.out.into_string()
    }

    fn write_uniforms(&mut self) {
        let names = self.ctx.names();
        for uniform in &self.interface.uniforms {
            let prefix = if uniform.is_static {
                format!("[{}][{}]", names.static_attribute, names.uniform_attribute)
            } else {
                format!("[{}]", names.uniform_attribute)
            };
            self.out
                .line(&format!("{prefix} var {} : {};", uniform.member, uniform.ty));
        }
    }

    fn write_stage_variable(&mut self, entry: &LinkEntry) {
        let names = self.ctx.names();
        let mut attributes = String::new();
        if entry.has(LinkTag::StageInput) {
            attributes.push_str(&format!("[{}]", names.stage_input_attribute));
        }
        if entry.has(LinkTag::StageOutput) {
            attributes.push_str(&format!("[{}]", names.stage_output_attribute));
        }
        if entry.has(LinkTag::SystemValueInput) || entry.has(LinkTag::SystemValueOutput) {
            if let Some(target) = &entry.system_value {
                attributes.push_str(&format!(
                    "[{}(name : \"{target}\")]",
                    names.system_value_attribute
                ));
            }
        }
        if attributes.is_empty() {
            self.out.line(&format!("var {} : {};", entry.name, entry.ty));
        } else {
            self.out
                .line(&format!("{attributes} var {} : {};", entry.name, entry.ty));
        }
    }

    /// Construct a fragment, copy its inputs and run its `Main`. `args` are
    /// the arguments passed to `Main`.
    fn write_fragment_run(&mut self, fragment: &FragmentType<'_>, args: &[&str]) {
        let info = self.info;
        let names = self.ctx.names();
        let var = self.variable(&fragment.name).to_string();
        self.out.line(&format!("var {var} = {}();", fragment.name));

        if let Some(resolved) = info.fragment(&fragment.name) {
            for resolution in &resolved.fields {
                let Some(field) = fragment.find_field(&resolution.field) else {
                    continue;
                };
                if field.is_opaque() || field.is_static() {
                    continue;
                }
                let source = match &resolution.kind {
                    InputKind::Local => continue,
                    InputKind::Fragment { source } => {
                        format!("{}.{}", self.variable(source), field.name)
                    }
                    InputKind::Stage => format!("this.{}", field.name),
                    InputKind::BuiltIn => match self.interface.find_uniform(&field.name) {
                        Some(uniform) if uniform.is_static => {
                            format!("{}.{}", self.interface.composite, field.name)
                        }
                        _ => format!("this.{}", field.name),
                    },
                    InputKind::Property => format!(
                        "this.{}",
                        names.mangle_property(&fragment.name, &field.name)
                    ),
                };
                self.out.line(&format!("{var}.{} = {source};", field.name));
            }
        }

        if fragment.main_function().is_some() {
            self.out
                .line(&format!("{var}.{}({});", names.main_function, args.join(", ")));
        }
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    fn write_geometry(mut self, fragments: &[&FragmentType<'_>], shape: &GeometryShape) -> String {
        let info = self.info;
        let library = self.library;
        let names = self.ctx.names();
        let Some(geometry) = self.interface.geometry.clone() else {
            return self.write_linear(fragments);
        };
        let composite = self.interface.composite.clone();

        // Wrapper structs for one input and one output vertex
        self.out.line(&format!("struct {}", geometry.input_struct));
        self.out.begin_scope();
        for entry in info.inputs.iter() {
            self.out.line(&format!("var {} : {};", entry.name, entry.ty));
        }
        self.out.end_scope();
        self.out.newline();

        let outputs: Vec<&LinkEntry> = info
            .computed_outputs
            .iter()
            .filter(|e| e.has(LinkTag::StageOutput) || e.has(LinkTag::SystemValueOutput))
            .collect();
        self.out.line(&format!("struct {}", geometry.output_struct));
        self.out.begin_scope();
        for entry in &outputs {
            self.out.line(&format!("var {} : {};", entry.name, entry.ty));
        }
        self.out.end_scope();
        self.out.newline();

        self.out.line(&format!(
            "[{}({} : {}, {} : {}, {} : {})]",
            names.geometry_attribute,
            names.max_vertices_parameter,
            geometry.max_vertices,
            names.input_parameter,
            shape.input_stream,
            names.output_parameter,
            shape.output_stream
        ));
        self.out.line(&format!("struct {composite}"));
        self.out.begin_scope();
        self.write_uniforms();
        for entry in info.system_values.iter() {
            if entry.has(LinkTag::SystemValueInput) {
                self.write_stage_variable(entry);
            }
        }

        // Per-vertex output copy, invoked for every appended vertex
        let fragment_output = library.find_type(&shape.output);
        self.out.newline();
        self.out.line(&format!("[{}]", names.static_attribute));
        self.out.line(&format!(
            "function {HELPER_FUNCTION}(fragmentOutput : {}, inputVertex : {}, compositeOutput : ref {})",
            shape.output, geometry.input_struct, geometry.output_struct
        ));
        self.out.begin_scope();
        for entry in &outputs {
            let from_fragment = fragment_output.is_some_and(|t| {
                t.instance_fields()
                    .any(|f| FieldKey::of(&f.name, &f.ty) == entry.key())
            });
            if from_fragment {
                self.out
                    .line(&format!("compositeOutput.{0} = fragmentOutput.{0};", entry.name));
            } else if info.inputs.contains(&entry.key()) {
                self.out
                    .line(&format!("compositeOutput.{0} = inputVertex.{0};", entry.name));
            }
        }
        self.out.end_scope();

        self.out.newline();
        self.out.line(&format!(
            "function {}(input : {}[{}], output : {}[{}])",
            names.main_function,
            shape.input_stream,
            geometry.input_struct,
            shape.output_stream,
            geometry.output_struct
        ));
        self.out.begin_scope();
        let input_fields: Vec<(String, ShaderType)> = library
            .find_type(&shape.input)
            .map(|t| t.instance_fields().map(|f| (f.name.clone(), f.ty.clone())).collect())
            .unwrap_or_default();
        self.out.line(&format!(
            "var fragmentInput = {}[{}]();",
            shape.input_stream, shape.input
        ));
        self.out.line(&format!(
            "for (var i = 0; i < {}; ++i)",
            shape.input_primitive.vertex_count()
        ));
        self.out.begin_scope();
        for (name, _) in &input_fields {
            self.out.line(&format!("fragmentInput[i].{name} = input[i].{name};"));
        }
        self.out.end_scope();
        self.out.line(&format!(
            "var fragmentOutput = {}[{}]();",
            shape.output_stream, shape.output
        ));
        for fragment in fragments {
            self.write_fragment_run(fragment, &["fragmentInput", "fragmentOutput"]);
        }
        self.out.end_scope();
        self.out.end_scope();
        self.out.into_string()
    }
}

/// Name of the static per-vertex helper on geometry composites.
pub(crate) fn emit_vertex_helper() -> &'static str {
    HELPER_FUNCTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn variable_names_avoid_keywords_and_collisions() {
        let a = FragmentType::new("For", Arc::from("t"), Default::default());
        let b = FragmentType::new("FOR", Arc::from("t"), Default::default());
        let c = FragmentType::new("Tint", Arc::from("t"), Default::default());
        let names = variable_names(&[&a, &b, &c]);
        assert_eq!(names[0].1, "for1");
        assert_eq!(names[1].1, "for2");
        assert_eq!(names[2].1, "tint");
    }
}
