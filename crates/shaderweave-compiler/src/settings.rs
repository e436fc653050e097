//! Compiler configuration.
//!
//! [`ShaderSettings`] is a plain value passed into every compile. Nothing
//! in the compiler reads global state, environment variables or files;
//! hosts start from `Default` and adjust it with the `with_*` builders.

use shaderweave_ir::ShaderStage;

/// Every attribute and keyword name the compiler recognizes, plus naming
/// conventions for generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSettings {
    // === Stage markers ===
    pub vertex_attribute: String,
    pub geometry_attribute: String,
    pub pixel_attribute: String,

    // === Field attributes ===
    pub input_attribute: String,
    pub fragment_input_attribute: String,
    pub stage_input_attribute: String,
    pub builtin_input_attribute: String,
    pub property_input_attribute: String,
    pub output_attribute: String,
    pub static_attribute: String,
    pub spec_constant_attribute: String,

    // === Type and function attributes ===
    pub extension_attribute: String,
    pub implements_attribute: String,
    pub intrinsic_attribute: String,
    pub shared_attribute: String,
    pub non_copyable_attribute: String,
    pub main_attribute: String,
    pub unit_test_attribute: String,

    // === Attributes written on composites ===
    pub uniform_attribute: String,
    pub stage_output_attribute: String,
    pub system_value_attribute: String,

    // === Attribute parameters ===
    pub max_vertices_parameter: String,
    pub input_parameter: String,
    pub output_parameter: String,

    /// Name of a fragment's entry function.
    pub main_function: String,
    /// Joins fragment and field names when mangling properties.
    pub mangle_separator: String,
    /// Name of the uniform block instance holding properties and built-ins.
    pub uniform_block: String,
    /// Extra attribute names hosts allow on declarations.
    pub custom_attributes: Vec<String>,
}

impl Default for NameSettings {
    fn default() -> Self {
        Self {
            vertex_attribute: "Vertex".into(),
            geometry_attribute: "Geometry".into(),
            pixel_attribute: "Pixel".into(),
            input_attribute: "Input".into(),
            fragment_input_attribute: "FragmentInput".into(),
            stage_input_attribute: "StageInput".into(),
            builtin_input_attribute: "BuiltInInput".into(),
            property_input_attribute: "PropertyInput".into(),
            output_attribute: "Output".into(),
            static_attribute: "Static".into(),
            spec_constant_attribute: "SpecConstant".into(),
            extension_attribute: "Extension".into(),
            implements_attribute: "Implements".into(),
            intrinsic_attribute: "Intrinsic".into(),
            shared_attribute: "Shared".into(),
            non_copyable_attribute: "NonCopyable".into(),
            main_attribute: "Main".into(),
            unit_test_attribute: "UnitTest".into(),
            uniform_attribute: "Uniform".into(),
            stage_output_attribute: "StageOutput".into(),
            system_value_attribute: "SystemValue".into(),
            max_vertices_parameter: "maxVertices".into(),
            input_parameter: "input".into(),
            output_parameter: "output".into(),
            main_function: "Main".into(),
            mangle_separator: "_".into(),
            uniform_block: "Material".into(),
            custom_attributes: Vec::new(),
        }
    }
}

impl NameSettings {
    /// The stage marker attribute for a stage.
    pub fn stage_attribute(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex_attribute,
            ShaderStage::Geometry => &self.geometry_attribute,
            ShaderStage::Pixel => &self.pixel_attribute,
        }
    }

    /// The stage a marker attribute names, if it is one.
    pub fn stage_of_attribute(&self, name: &str) -> Option<ShaderStage> {
        ShaderStage::ALL
            .into_iter()
            .find(|stage| self.stage_attribute(*stage) == name)
    }

    /// The four input attributes in resolution priority order.
    pub fn input_sequence(&self) -> [&str; 4] {
        [
            &self.fragment_input_attribute,
            &self.stage_input_attribute,
            &self.builtin_input_attribute,
            &self.property_input_attribute,
        ]
    }

    /// Every attribute name the compiler understands.
    pub fn known_attributes(&self) -> Vec<&str> {
        let mut names = vec![
            self.vertex_attribute.as_str(),
            &self.geometry_attribute,
            &self.pixel_attribute,
            &self.input_attribute,
            &self.fragment_input_attribute,
            &self.stage_input_attribute,
            &self.builtin_input_attribute,
            &self.property_input_attribute,
            &self.output_attribute,
            &self.static_attribute,
            &self.spec_constant_attribute,
            &self.extension_attribute,
            &self.implements_attribute,
            &self.intrinsic_attribute,
            &self.shared_attribute,
            &self.non_copyable_attribute,
            &self.main_attribute,
            &self.unit_test_attribute,
            &self.uniform_attribute,
            &self.stage_output_attribute,
            &self.system_value_attribute,
        ];
        names.extend(self.custom_attributes.iter().map(String::as_str));
        names
    }

    pub fn is_known_attribute(&self, name: &str) -> bool {
        self.known_attributes().contains(&name)
    }

    /// Name a fragment property is declared under on a composite.
    pub fn mangle_property(&self, fragment: &str, field: &str) -> String {
        format!("{fragment}{}{field}", self.mangle_separator)
    }

    /// Name of the composite type for one stage of a shader.
    pub fn composite_name(&self, shader: &str, stage: ShaderStage) -> String {
        format!("{shader}{}{}", self.mangle_separator, stage.as_str())
    }

    /// Name of the uniform block struct.
    pub fn uniform_block_type(&self) -> String {
        format!("{}{}Block", self.uniform_block, self.mangle_separator)
    }
}

/// A uniform supplied by the host, e.g. transformation matrices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltInUniform {
    pub name: String,
    /// Fragment-language type name.
    pub type_name: String,
    /// Static built-ins are shared by every instance and referenced through
    /// the composite type.
    pub is_static: bool,
}

impl BuiltInUniform {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, is_static: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_static,
        }
    }
}

/// Whether a system value is read or written by its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// A fragment field that maps onto a target system value instead of a
/// stage variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemValue {
    pub stage: ShaderStage,
    pub name: String,
    pub type_name: String,
    pub direction: Direction,
    /// Target-language name, e.g. `gl_Position`.
    pub target: String,
}

impl SystemValue {
    pub fn new(
        stage: ShaderStage,
        name: impl Into<String>,
        type_name: impl Into<String>,
        direction: Direction,
        target: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            name: name.into(),
            type_name: type_name.into(),
            direction,
            target: target.into(),
        }
    }
}

/// One attribute of the CPU-side vertex layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub type_name: String,
}

impl VertexAttribute {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Primitive kind of a geometry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Point,
    Line,
    Triangle,
}

impl Primitive {
    /// Vertices per input primitive.
    pub fn vertex_count(&self) -> u32 {
        match self {
            Primitive::Point => 1,
            Primitive::Line => 2,
            Primitive::Triangle => 3,
        }
    }

    /// Input layout qualifier.
    pub fn input_layout(&self) -> &'static str {
        match self {
            Primitive::Point => "points",
            Primitive::Line => "lines",
            Primitive::Triangle => "triangles",
        }
    }

    /// Output layout qualifier.
    pub fn output_layout(&self) -> &'static str {
        match self {
            Primitive::Point => "points",
            Primitive::Line => "line_strip",
            Primitive::Triangle => "triangle_strip",
        }
    }
}

/// A generic geometry stream type such as `TriangleInput[T]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamType {
    pub name: String,
    pub primitive: Primitive,
    pub is_output: bool,
}

impl StreamType {
    pub fn new(name: impl Into<String>, primitive: Primitive, is_output: bool) -> Self {
        Self {
            name: name.into(),
            primitive,
            is_output,
        }
    }
}

/// Name and version of the textual target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLanguage {
    pub name: String,
    pub version: u32,
}

impl Default for TargetLanguage {
    fn default() -> Self {
        Self {
            name: "glsl".into(),
            version: 450,
        }
    }
}

/// Binding assignment rules for uniform resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayout {
    /// Binding of the uniform block.
    pub block_binding: u32,
    /// First binding handed to samplers and images, in declaration order.
    pub first_resource_binding: u32,
    /// Descriptor set of every resource.
    pub set: u32,
}

impl Default for UniformLayout {
    fn default() -> Self {
        Self {
            block_binding: 0,
            first_resource_binding: 1,
            set: 0,
        }
    }
}

/// Everything a compile needs to know about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSettings {
    pub names: NameSettings,
    pub builtins: Vec<BuiltInUniform>,
    pub system_values: Vec<SystemValue>,
    /// Render target names, all typed `Real4`. The index is the location.
    pub render_targets: Vec<String>,
    pub vertex_definitions: Vec<VertexAttribute>,
    pub streams: Vec<StreamType>,
    pub language: TargetLanguage,
    pub layout: UniformLayout,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        let builtins = vec![
            BuiltInUniform::new("LocalToWorld", "Real4x4", false),
            BuiltInUniform::new("WorldToView", "Real4x4", false),
            BuiltInUniform::new("ViewToPerspective", "Real4x4", false),
            BuiltInUniform::new("LocalToPerspective", "Real4x4", false),
            BuiltInUniform::new("FrameTime", "Real", true),
            BuiltInUniform::new("LogicTime", "Real", true),
        ];
        let system_values = vec![
            SystemValue::new(ShaderStage::Vertex, "VertexId", "Integer", Direction::Input, "gl_VertexIndex"),
            SystemValue::new(ShaderStage::Vertex, "PerspectivePosition", "Real4", Direction::Output, "gl_Position"),
            SystemValue::new(ShaderStage::Geometry, "PrimitiveId", "Integer", Direction::Input, "gl_PrimitiveIDIn"),
            SystemValue::new(ShaderStage::Geometry, "PerspectivePosition", "Real4", Direction::Output, "gl_Position"),
            SystemValue::new(ShaderStage::Pixel, "PixelPosition", "Real4", Direction::Input, "gl_FragCoord"),
        ];
        let vertex_definitions = vec![
            VertexAttribute::new("LocalPosition", "Real3"),
            VertexAttribute::new("LocalNormal", "Real3"),
            VertexAttribute::new("Uv", "Real2"),
            VertexAttribute::new("Color", "Real4"),
            VertexAttribute::new("LocalTangent", "Real3"),
        ];
        let streams = vec![
            StreamType::new("PointInput", Primitive::Point, false),
            StreamType::new("LineInput", Primitive::Line, false),
            StreamType::new("TriangleInput", Primitive::Triangle, false),
            StreamType::new("PointOutput", Primitive::Point, true),
            StreamType::new("LineOutput", Primitive::Line, true),
            StreamType::new("TriangleOutput", Primitive::Triangle, true),
        ];
        Self {
            names: NameSettings::default(),
            builtins,
            system_values,
            render_targets: (0..8).map(|i| format!("Target{i}")).collect(),
            vertex_definitions,
            streams,
            language: TargetLanguage::default(),
            layout: UniformLayout::default(),
        }
    }
}

impl ShaderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(mut self, names: NameSettings) -> Self {
        self.names = names;
        self
    }

    /// Allow a host-defined attribute on declarations.
    pub fn with_custom_attribute(mut self, name: impl Into<String>) -> Self {
        self.names.custom_attributes.push(name.into());
        self
    }

    pub fn with_builtin(mut self, builtin: BuiltInUniform) -> Self {
        self.builtins.push(builtin);
        self
    }

    pub fn with_system_value(mut self, value: SystemValue) -> Self {
        self.system_values.push(value);
        self
    }

    pub fn with_render_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.render_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vertex_definitions(mut self, definitions: Vec<VertexAttribute>) -> Self {
        self.vertex_definitions = definitions;
        self
    }

    pub fn with_stream(mut self, stream: StreamType) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_language(mut self, language: TargetLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_layout(mut self, layout: UniformLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Find a built-in by name and type.
    pub fn find_builtin(&self, name: &str, type_name: &str) -> Option<&BuiltInUniform> {
        self.builtins
            .iter()
            .find(|b| b.name == name && b.type_name == type_name)
    }

    /// Find a system value of a stage.
    pub fn find_system_value(
        &self,
        stage: ShaderStage,
        name: &str,
        type_name: &str,
        direction: Direction,
    ) -> Option<&SystemValue> {
        self.system_values.iter().find(|s| {
            s.stage == stage && s.name == name && s.type_name == type_name && s.direction == direction
        })
    }

    pub fn find_stream(&self, name: &str) -> Option<&StreamType> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Location of a render target.
    pub fn render_target_index(&self, name: &str) -> Option<u32> {
        self.render_targets
            .iter()
            .position(|t| t == name)
            .map(|i| i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attribute_names() {
        let names = NameSettings::default();
        assert!(names.is_known_attribute("Vertex"));
        assert!(names.is_known_attribute("SystemValue"));
        assert!(!names.is_known_attribute("Bogus"));
        assert_eq!(names.stage_of_attribute("Pixel"), Some(ShaderStage::Pixel));
        assert_eq!(names.stage_of_attribute("Output"), None);
    }

    #[test]
    fn custom_attributes_are_known() {
        let settings = ShaderSettings::new().with_custom_attribute("Hidden");
        assert!(settings.names.is_known_attribute("Hidden"));
    }

    #[test]
    fn mangling() {
        let names = NameSettings::default();
        assert_eq!(names.mangle_property("Surface", "Strength"), "Surface_Strength");
        assert_eq!(names.composite_name("Opaque", ShaderStage::Vertex), "Opaque_Vertex");
        assert_eq!(names.uniform_block_type(), "Material_Block");
    }

    #[test]
    fn lookups() {
        let settings = ShaderSettings::default().with_render_targets(["Color", "Normal"]);
        assert_eq!(settings.render_target_index("Normal"), Some(1));
        assert!(settings.find_builtin("FrameTime", "Real").is_some_and(|b| b.is_static));
        assert!(settings.find_builtin("FrameTime", "Real2").is_none());
        let position = settings.find_system_value(
            ShaderStage::Vertex,
            "PerspectivePosition",
            "Real4",
            Direction::Output,
        );
        assert_eq!(position.map(|s| s.target.as_str()), Some("gl_Position"));
        assert_eq!(settings.find_stream("TriangleInput").map(|s| s.primitive.vertex_count()), Some(3));
    }
}
