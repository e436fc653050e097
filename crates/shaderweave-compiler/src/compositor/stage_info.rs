//! Per-stage composition bookkeeping.

use rustc_hash::FxHashMap;
use shaderweave_ir::ShaderStage;

use crate::core_types::ShaderType;

/// Identifies a linked variable: name plus fragment-language type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub name: String,
    pub type_name: String,
}

impl FieldKey {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn of(name: &str, ty: &ShaderType) -> Self {
        Self::new(name, ty.name())
    }
}

/// Role of a stage variable, recorded as attributes on the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkTag {
    StageInput,
    StageOutput,
    SystemValueInput,
    SystemValueOutput,
}

/// A variable linked across a stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEntry {
    pub name: String,
    pub ty: ShaderType,
    /// Tags in first-insertion order.
    pub tags: Vec<LinkTag>,
    /// Target name of the system value this entry is bound to.
    pub system_value: Option<String>,
    pub location: Option<u32>,
}

impl LinkEntry {
    pub fn new(name: impl Into<String>, ty: ShaderType) -> Self {
        Self {
            name: name.into(),
            ty,
            tags: Vec::new(),
            system_value: None,
            location: None,
        }
    }

    pub fn key(&self) -> FieldKey {
        FieldKey::of(&self.name, &self.ty)
    }

    pub fn tag(&mut self, tag: LinkTag) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn has(&self, tag: LinkTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Whether this entry needs a location-bound stage variable, as opposed
    /// to being carried only by a system value.
    pub fn is_varying(&self) -> bool {
        self.has(LinkTag::StageInput) || self.has(LinkTag::StageOutput)
    }

    fn merge(&mut self, other: &LinkEntry) {
        for tag in &other.tags {
            self.tag(*tag);
        }
        if self.system_value.is_none() {
            self.system_value.clone_from(&other.system_value);
        }
        if self.location.is_none() {
            self.location = other.location;
        }
    }
}

/// Insertion-ordered map of linked variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<LinkEntry>,
    index: FxHashMap<FieldKey, usize>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `name : ty`, created empty when missing.
    pub fn find_or_create(&mut self, name: &str, ty: &ShaderType) -> &mut LinkEntry {
        let key = FieldKey::of(name, ty);
        let index = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.entries.push(LinkEntry::new(name, ty.clone()));
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    /// Insert `entry`, unioning tags into an existing entry of the same key.
    pub fn insert(&mut self, entry: &LinkEntry) {
        self.find_or_create(&entry.name, &entry.ty).merge(entry);
    }

    /// Insert every entry of `other` in its order.
    pub fn merge(&mut self, other: &FieldMap) {
        for entry in &other.entries {
            self.insert(entry);
        }
    }

    pub fn get(&self, key: &FieldKey) -> Option<&LinkEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, key: &FieldKey) -> Option<&mut LinkEntry> {
        self.index.get(key).map(|&i| &mut self.entries[i])
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn position(&self, key: &FieldKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LinkEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a fragment field's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Computed by the fragment itself.
    Local,
    /// Output of an earlier fragment in the same stage.
    Fragment { source: String },
    /// Output of the previous stage.
    Stage,
    /// A host built-in or system value.
    BuiltIn,
    /// Set by the host per material.
    Property,
}

/// Resolution of one fragment field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldResolution {
    pub field: String,
    pub ty: ShaderType,
    pub kind: InputKind,
    /// The field asked for input that nothing could supply; it was treated
    /// as a property.
    pub unresolved: bool,
}

/// Resolutions for one fragment, in field order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FragmentInfo {
    pub name: String,
    pub fields: Vec<FieldResolution>,
}

impl FragmentInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldResolution> {
        self.fields.iter().find(|f| f.field == name)
    }
}

/// A composition stage. `Cpu` and `Gpu` stand for the vertex buffer and
/// the render targets so that linking treats every boundary alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Cpu,
    Vertex,
    Geometry,
    Pixel,
    Gpu,
}

impl StageKind {
    /// The pipeline stage whose system values apply.
    pub fn shader_stage(&self) -> Option<ShaderStage> {
        match self {
            StageKind::Vertex => Some(ShaderStage::Vertex),
            StageKind::Geometry => Some(ShaderStage::Geometry),
            StageKind::Pixel => Some(ShaderStage::Pixel),
            StageKind::Cpu | StageKind::Gpu => None,
        }
    }
}

/// Everything composition learns about one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageInfo {
    pub kind: StageKind,
    pub fragments: Vec<FragmentInfo>,
    /// Everything this stage could hand to the next one.
    pub expected_outputs: FieldMap,
    /// What the next stage actually consumes, plus written system values.
    pub computed_outputs: FieldMap,
    pub inputs: FieldMap,
    /// Mangled property members.
    pub properties: FieldMap,
    pub builtins: FieldMap,
    /// System values read or written by fragments directly.
    pub system_values: FieldMap,
    /// Geometry inputs copied straight to the outputs for the next stage.
    pub pass_through: FieldMap,
    /// Last fragment, in composition order, to output each key.
    pub last_writers: FxHashMap<FieldKey, String>,
}

impl StageInfo {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            fragments: Vec::new(),
            expected_outputs: FieldMap::new(),
            computed_outputs: FieldMap::new(),
            inputs: FieldMap::new(),
            properties: FieldMap::new(),
            builtins: FieldMap::new(),
            system_values: FieldMap::new(),
            pass_through: FieldMap::new(),
            last_writers: FxHashMap::default(),
        }
    }

    pub fn fragment(&self, name: &str) -> Option<&FragmentInfo> {
        self.fragments.iter().find(|f| f.name == name)
    }

    pub fn fragment_mut(&mut self, name: &str) -> &mut FragmentInfo {
        let index = match self.fragments.iter().position(|f| f.name == name) {
            Some(i) => i,
            None => {
                self.fragments.push(FragmentInfo::new(name));
                self.fragments.len() - 1
            }
        };
        &mut self.fragments[index]
    }

    /// Resolution of `field` on `fragment`.
    pub fn resolution(&self, fragment: &str, field: &str) -> Option<&InputKind> {
        self.fragment(fragment)
            .and_then(|f| f.field(field))
            .map(|r| &r.kind)
    }

    /// Stage inputs, computed outputs and system values merged into the
    /// variables the composite declares.
    pub fn stage_variables(&self) -> FieldMap {
        let mut merged = FieldMap::new();
        merged.merge(&self.inputs);
        merged.merge(&self.computed_outputs);
        merged.merge(&self.system_values);
        merged
    }

    /// Outputs that need a location-bound variable, in location order.
    pub fn varying_outputs(&self) -> impl Iterator<Item = &LinkEntry> {
        self.computed_outputs
            .iter()
            .filter(|e| e.has(LinkTag::StageOutput))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_and_tag_union() {
        let mut map = FieldMap::new();
        map.find_or_create("Uv", &ShaderType::vector(crate::core_types::ScalarType::Real, 2))
            .tag(LinkTag::StageInput);
        map.find_or_create("Normal", &ShaderType::vector(crate::core_types::ScalarType::Real, 3));
        let mut again = LinkEntry::new("Uv", ShaderType::vector(crate::core_types::ScalarType::Real, 2));
        again.tag(LinkTag::StageOutput);
        again.tag(LinkTag::StageInput);
        map.insert(&again);

        let names: Vec<_> = map.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Uv", "Normal"]);
        let uv = map.get(&FieldKey::new("Uv", "Real2")).unwrap();
        assert_eq!(uv.tags, [LinkTag::StageInput, LinkTag::StageOutput]);
    }

    #[test]
    fn keys_distinguish_types() {
        let mut map = FieldMap::new();
        map.find_or_create("Color", &ShaderType::REAL);
        map.find_or_create("Color", &ShaderType::INTEGER);
        assert_eq!(map.len(), 2);
    }
}
