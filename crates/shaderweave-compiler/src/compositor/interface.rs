//! The external interface of one composed stage.
//!
//! Both backends build their entry points from a [`StageInterface`]: the
//! text translator declares globals from it and the IR lowering decorates
//! globals with the same locations and bindings, so the reflection of
//! either output describes the same program.

use shaderweave_ir::{PropertyDescription, PropertyKind, ShaderStage};

use crate::core_types::ShaderType;
use crate::settings::Primitive;

/// Fragment name reported for built-in uniforms.
pub const BUILTIN_FRAGMENT: &str = "BuiltIn";

/// A stage input or output.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceField {
    /// Member name on the composite.
    pub name: String,
    pub ty: ShaderType,
    pub location: Option<u32>,
    /// Target system value the member is copied to or from.
    pub system_value: Option<String>,
    /// Name of the location-bound global, when the field is a varying.
    pub global: Option<String>,
}

impl InterfaceField {
    pub fn is_varying(&self) -> bool {
        self.global.is_some()
    }
}

/// A member of the uniform block.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    /// Member name in the block, equal to the composite field name.
    pub member: String,
    pub ty: ShaderType,
    pub fragment: String,
    pub property: String,
    /// Referenced through the composite type instead of copied into it.
    pub is_static: bool,
}

/// A sampler or image property.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceField {
    /// Global name, `Fragment_Property`.
    pub global: String,
    pub ty: ShaderType,
    pub fragment: String,
    pub property: String,
    pub binding: u32,
}

/// A `[SpecConstant]` field.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecConstantField {
    pub global: String,
    pub ty: ShaderType,
    pub fragment: String,
    pub property: String,
    pub id: u32,
    /// Literal default value, when the field declares one.
    pub default: Option<String>,
}

/// Extra shape of a geometry stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryInterface {
    /// Composite wrapper struct of one input vertex.
    pub input_struct: String,
    /// Composite wrapper struct of one output vertex.
    pub output_struct: String,
    pub input_primitive: Primitive,
    pub output_primitive: Primitive,
    pub max_vertices: u32,
    /// Element type of the fragment's output stream.
    pub fragment_output: String,
}

/// Everything outside the composite a stage reads or writes.
#[derive(Debug, Clone, PartialEq)]
pub struct StageInterface {
    pub stage: ShaderStage,
    /// Composite type name.
    pub composite: String,
    pub inputs: Vec<InterfaceField>,
    pub outputs: Vec<InterfaceField>,
    pub uniforms: Vec<UniformField>,
    pub resources: Vec<ResourceField>,
    pub spec_constants: Vec<SpecConstantField>,
    pub geometry: Option<GeometryInterface>,
}

impl StageInterface {
    pub fn new(stage: ShaderStage, composite: impl Into<String>) -> Self {
        Self {
            stage,
            composite: composite.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            uniforms: Vec::new(),
            resources: Vec::new(),
            spec_constants: Vec::new(),
            geometry: None,
        }
    }

    pub fn find_uniform(&self, member: &str) -> Option<&UniformField> {
        self.uniforms.iter().find(|u| u.member == member)
    }

    pub fn find_resource(&self, global: &str) -> Option<&ResourceField> {
        self.resources.iter().find(|r| r.global == global)
    }

    /// Descriptions the reflection simplifier traces, keyed by fragment
    /// and property name.
    pub fn property_descriptions(&self) -> Vec<PropertyDescription> {
        let uniforms = self.uniforms.iter().map(|u| PropertyDescription {
            fragment: u.fragment.clone(),
            property: u.property.clone(),
            resource: u.member.clone(),
            kind: PropertyKind::Uniform,
        });
        let resources = self.resources.iter().filter_map(|r| {
            let kind = match r.ty {
                ShaderType::Sampler => PropertyKind::Sampler,
                ShaderType::Image2d => PropertyKind::Image,
                ShaderType::SampledImage2d => PropertyKind::SampledImage,
                ShaderType::StorageImage2d => PropertyKind::StorageImage,
                _ => return None,
            };
            Some(PropertyDescription {
                fragment: r.fragment.clone(),
                property: r.property.clone(),
                resource: r.global.clone(),
                kind,
            })
        });
        uniforms.chain(resources).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_cover_uniforms_and_resources() {
        let mut interface = StageInterface::new(ShaderStage::Pixel, "Opaque_Pixel");
        interface.uniforms.push(UniformField {
            member: "Tint_Strength".into(),
            ty: ShaderType::REAL,
            fragment: "Tint".into(),
            property: "Strength".into(),
            is_static: false,
        });
        interface.resources.push(ResourceField {
            global: "Tint_Albedo".into(),
            ty: ShaderType::SampledImage2d,
            fragment: "Tint".into(),
            property: "Albedo".into(),
            binding: 1,
        });
        let descriptions = interface.property_descriptions();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[0].resource, "Tint_Strength");
        assert_eq!(descriptions[1].kind, PropertyKind::SampledImage);
    }
}
