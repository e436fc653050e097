//! Reflection simplifier.
//!
//! Passes may rename, merge or drop resources, so the reflection of the
//! first pass does not describe the final program and the last pass no
//! longer knows the original names. [`SimplifiedReflection`] traces every
//! fragment property from its first-pass resource through each pass to its
//! final location, and answers lookups by (fragment, property).

use rustc_hash::FxHashMap;

use crate::passes::PipelineResult;
use crate::reflection::{ResourceBinding, ShaderReflection, SpecConstantInfo, UniformBuffer, UniformMember};

/// What kind of resource a fragment property became.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Uniform,
    Sampler,
    Image,
    SampledImage,
    StorageImage,
    StorageBuffer,
}

/// A fragment property and the name of the resource it was emitted as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescription {
    pub fragment: String,
    pub property: String,
    /// Uniform member or resource name in the first pass.
    pub resource: String,
    pub kind: PropertyKind,
}

/// Final location of a uniform property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub buffer: usize,
    pub member: usize,
}

/// Final indices of an opaque property. One property may end up in several
/// resources when a pass splits it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OpaqueIds {
    samplers: Vec<usize>,
    images: Vec<usize>,
    sampled_images: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FragmentLookup {
    uniforms: FxHashMap<String, UniformLocation>,
    opaque: FxHashMap<String, OpaqueIds>,
    storage_images: FxHashMap<String, usize>,
    storage_buffers: FxHashMap<String, usize>,
}

/// Final reflection of one compiled stage, queryable by original names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimplifiedReflection {
    reflection: ShaderReflection,
    fragments: FxHashMap<String, FragmentLookup>,
}

impl SimplifiedReflection {
    /// Build from a pipeline run.
    pub fn from_result(properties: &[PropertyDescription], result: &PipelineResult) -> Self {
        let passes: Vec<&ShaderReflection> = result.reflections().collect();
        Self::build(properties, &passes)
    }

    /// Build from per-pass reflection records, first pass first.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build(properties: &[PropertyDescription], passes: &[&ShaderReflection]) -> Self {
        let (Some(first), Some(last)) = (passes.first(), passes.last()) else {
            return Self::default();
        };

        let member_maps: Vec<_> = passes.iter().map(|p| p.member_index_map()).collect();
        let samplers = index_of(&last.samplers);
        let images = index_of(&last.images);
        let sampled_images = index_of(&last.sampled_images);
        let storage_images = index_of(&last.storage_images);
        let storage_buffers = index_of(&last.storage_buffers);

        let mut fragments: FxHashMap<String, FragmentLookup> = FxHashMap::default();
        for property in properties {
            let lookup = fragments.entry(property.fragment.clone()).or_default();
            let key = property.property.clone();
            match property.kind {
                PropertyKind::Uniform => {
                    if let Some(location) = trace_member(&property.resource, passes, &member_maps) {
                        lookup.uniforms.insert(key, location);
                    }
                }
                PropertyKind::Sampler | PropertyKind::Image | PropertyKind::SampledImage => {
                    let in_first = first
                        .samplers
                        .iter()
                        .chain(&first.images)
                        .chain(&first.sampled_images)
                        .any(|r| r.name == property.resource);
                    if !in_first {
                        continue;
                    }
                    let names = trace_names(vec![property.resource.clone()], passes, 1);
                    let mut ids = OpaqueIds::default();
                    for name in &names {
                        if let Some(&i) = samplers.get(name.as_str()) {
                            ids.samplers.push(i);
                        }
                        if let Some(&i) = images.get(name.as_str()) {
                            ids.images.push(i);
                        }
                        if let Some(&i) = sampled_images.get(name.as_str()) {
                            ids.sampled_images.push(i);
                        }
                    }
                    lookup.opaque.insert(key, ids);
                }
                PropertyKind::StorageImage => {
                    if let Some(&i) = storage_images.get(property.resource.as_str()) {
                        lookup.storage_images.insert(key, i);
                    }
                }
                PropertyKind::StorageBuffer => {
                    if let Some(&i) = storage_buffers.get(property.resource.as_str()) {
                        lookup.storage_buffers.insert(key, i);
                    }
                }
            }
        }

        Self {
            reflection: (*last).clone(),
            fragments,
        }
    }

    /// The last pass's reflection.
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Final buffer and member index of a uniform property.
    pub fn find_uniform_location(&self, fragment: &str, property: &str) -> Option<UniformLocation> {
        self.fragments.get(fragment)?.uniforms.get(property).copied()
    }

    /// Buffer and member of a uniform property.
    pub fn find_uniform(&self, fragment: &str, property: &str) -> Option<(&UniformBuffer, &UniformMember)> {
        let location = self.find_uniform_location(fragment, property)?;
        let buffer = self.reflection.uniform_buffers.get(location.buffer)?;
        let member = buffer.members.get(location.member)?;
        Some((buffer, member))
    }

    /// Member reflection of a uniform property.
    pub fn find_member(&self, fragment: &str, property: &str) -> Option<&UniformMember> {
        self.find_uniform(fragment, property).map(|(_, member)| member)
    }

    fn opaque(&self, fragment: &str, property: &str) -> Option<&OpaqueIds> {
        self.fragments.get(fragment)?.opaque.get(property)
    }

    /// Final resources of one kind an opaque property maps to. `ids` picks
    /// the traced indices and `list` the matching reflection list.
    fn opaque_bindings<'s>(
        &'s self,
        fragment: &str,
        property: &str,
        ids: impl Fn(&OpaqueIds) -> &[usize],
        list: &'s [ResourceBinding],
    ) -> Vec<&'s ResourceBinding> {
        self.opaque(fragment, property)
            .map(|found| ids(found).iter().filter_map(|&i| list.get(i)).collect())
            .unwrap_or_default()
    }

    pub fn find_sampler_bindings(&self, fragment: &str, property: &str) -> Vec<&ResourceBinding> {
        self.opaque_bindings(fragment, property, |ids| &ids.samplers, &self.reflection.samplers)
    }

    pub fn find_image_bindings(&self, fragment: &str, property: &str) -> Vec<&ResourceBinding> {
        self.opaque_bindings(fragment, property, |ids| &ids.images, &self.reflection.images)
    }

    pub fn find_sampled_image_bindings(&self, fragment: &str, property: &str) -> Vec<&ResourceBinding> {
        self.opaque_bindings(fragment, property, |ids| &ids.sampled_images, &self.reflection.sampled_images)
    }

    pub fn find_storage_image(&self, fragment: &str, property: &str) -> Option<&ResourceBinding> {
        let index = *self.fragments.get(fragment)?.storage_images.get(property)?;
        self.reflection.storage_images.get(index)
    }

    pub fn find_storage_buffer(&self, fragment: &str, property: &str) -> Option<&ResourceBinding> {
        let index = *self.fragments.get(fragment)?.storage_buffers.get(property)?;
        self.reflection.storage_buffers.get(index)
    }

    /// Specialization constants the final pass still exposes.
    pub fn spec_constants(&self) -> &[SpecConstantInfo] {
        &self.reflection.spec_constants
    }

    /// Fragments with at least one traced property.
    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }
}

fn index_of(list: &[ResourceBinding]) -> FxHashMap<&str, usize> {
    list.iter().enumerate().map(|(i, r)| (r.name.as_str(), i)).collect()
}

/// Follow a uniform member by name through every pass.
fn trace_member(
    name: &str,
    passes: &[&ShaderReflection],
    member_maps: &[FxHashMap<&str, (usize, usize)>],
) -> Option<UniformLocation> {
    let mut current = name.to_string();
    let mut location = *member_maps.first()?.get(current.as_str())?;
    for (pass, map) in passes.iter().zip(member_maps).skip(1) {
        current = pass.successors(&current).into_iter().next()?;
        location = *map.get(current.as_str())?;
    }
    Some(UniformLocation {
        buffer: location.0,
        member: location.1,
    })
}

/// Follow opaque resource names through passes `from..`, expanding splits.
fn trace_names(names: Vec<String>, passes: &[&ShaderReflection], from: usize) -> Vec<String> {
    let Some(pass) = passes.get(from) else {
        return names;
    };
    let mut out = Vec::new();
    for name in names {
        out.extend(trace_names(pass.successors(&name), passes, from + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_module::pixel_module;
    use crate::passes::{BindingRenamePass, DeadResourceElimination, PassPipeline, PipelineDescriptor, TextBackend};
    use crate::reflection::{Remapping, reflect_module};

    fn properties() -> Vec<PropertyDescription> {
        let uniform = |fragment: &str, property: &str| PropertyDescription {
            fragment: fragment.into(),
            property: property.into(),
            resource: format!("{fragment}_{property}"),
            kind: PropertyKind::Uniform,
        };
        vec![
            uniform("Surface", "Strength"),
            uniform("Surface", "Unused"),
            uniform("Other", "Unused"),
            PropertyDescription {
                fragment: "Surface".into(),
                property: "Albedo".into(),
                resource: "Surface_Albedo".into(),
                kind: PropertyKind::SampledImage,
            },
        ]
    }

    fn run(descriptor: PipelineDescriptor) -> SimplifiedReflection {
        let module = pixel_module();
        let result = PassPipeline::new(descriptor)
            .run(&module, reflect_module(&module))
            .unwrap();
        SimplifiedReflection::from_result(&properties(), &result)
    }

    #[test]
    fn unrenamed_and_renamed_properties_agree() {
        let plain = run(PipelineDescriptor::default());
        let renamed = run(PipelineDescriptor::new(TextBackend::default()).with_pass(BindingRenamePass::new("r_")));
        let a = plain.find_uniform_location("Surface", "Strength").unwrap();
        let b = renamed.find_uniform_location("Surface", "Strength").unwrap();
        assert_eq!(a, b);
        assert_eq!(plain.find_member("Surface", "Strength").unwrap().offset, 4);
        assert_eq!(renamed.find_member("Surface", "Strength").unwrap().name, "r_Surface_Strength");
    }

    #[test]
    fn eliminated_members_are_absent() {
        let simplified = run(PipelineDescriptor::new(TextBackend::default()).with_pass(DeadResourceElimination));
        assert!(simplified.find_member("Surface", "Unused").is_none());
        assert!(simplified.find_member("Other", "Unused").is_none());
        let member = simplified.find_member("Surface", "Strength").unwrap();
        assert_eq!(member.offset, 0);
    }

    #[test]
    fn removal_then_rename_stays_absent() {
        let simplified = run(
            PipelineDescriptor::new(TextBackend::default())
                .with_pass(DeadResourceElimination)
                .with_pass(BindingRenamePass::new("r_")),
        );
        assert!(simplified.find_member("Surface", "Unused").is_none());
        assert!(simplified.find_member("Surface", "Strength").is_some());
        let bindings = simplified.find_sampled_image_bindings("Surface", "Albedo");
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name, "r_Surface_Albedo");
        assert_eq!(bindings[0].binding, 1);
    }

    #[test]
    fn split_resources_list_every_binding() {
        let module = pixel_module();
        let first = reflect_module(&module);
        let mut second = first.clone();
        let original = second.sampled_images[1].clone();
        second.sampled_images.push(ResourceBinding {
            name: "Surface_Albedo_B".into(),
            binding: 7,
            ..original
        });
        second.remappings.push(Remapping {
            from: "Surface_Albedo".into(),
            to: vec!["Surface_Albedo".into(), "Surface_Albedo_B".into()],
        });
        let simplified = SimplifiedReflection::build(&properties(), &[&first, &second]);
        let bindings: Vec<u32> = simplified
            .find_sampled_image_bindings("Surface", "Albedo")
            .iter()
            .map(|b| b.binding)
            .collect();
        assert_eq!(bindings, vec![2, 7]);
    }

    #[test]
    fn opaque_lookups_are_keyed_by_kind() {
        let simplified = run(PipelineDescriptor::default());
        assert_eq!(simplified.find_sampled_image_bindings("Surface", "Albedo").len(), 1);
        assert!(simplified.find_sampler_bindings("Surface", "Albedo").is_empty());
        assert!(simplified.find_image_bindings("Surface", "Albedo").is_empty());
    }

    #[test]
    fn unknown_lookups_are_absent() {
        let simplified = run(PipelineDescriptor::default());
        assert!(simplified.find_member("Nobody", "Strength").is_none());
        assert!(simplified.find_sampler_bindings("Surface", "Nothing").is_empty());
        assert!(simplified.find_storage_buffer("Surface", "Strength").is_none());
        assert_eq!(simplified.spec_constants().len(), 1);
    }
}
