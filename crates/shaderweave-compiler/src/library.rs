//! The fragment library: every collected type, its fields, functions and
//! attributes, plus the extension and implements tables built by the
//! validator.
//!
//! A [`FragmentLibrary`] borrows function bodies and default values from
//! the arena its sources were parsed into. Libraries can be layered: the
//! composites generated for one shader live in a child library whose
//! lookups fall through to the shared fragment library, so composition
//! never mutates shared state.

use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use shaderweave_core::Span;
use shaderweave_ir::ShaderStage;
use shaderweave_parser::ast::{Attribute, AttributeValue, Block, Expr};

use crate::core_types::ShaderType;

// ============================================================================
// Attributes
// ============================================================================

/// An owned attribute argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
    Bool(bool),
    String(String),
    Ident(String),
}

impl ParamValue {
    /// Literal type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "Integer",
            ParamValue::Real(_) => "Real",
            ParamValue::Bool(_) => "Boolean",
            ParamValue::String(_) => "String",
            ParamValue::Ident(_) => "Identifier",
        }
    }

    /// Text of string and identifier values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) | ParamValue::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&AttributeValue<'_>> for ParamValue {
    fn from(value: &AttributeValue<'_>) -> Self {
        match value {
            AttributeValue::Int(v) => ParamValue::Int(*v),
            AttributeValue::Real(v) => ParamValue::Real(*v),
            AttributeValue::Bool(v) => ParamValue::Bool(*v),
            AttributeValue::String(s) => ParamValue::String((*s).to_string()),
            AttributeValue::Ident(s) => ParamValue::Ident((*s).to_string()),
        }
    }
}

/// One attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeParam {
    /// Name for `name : value` arguments.
    pub name: Option<String>,
    pub value: ParamValue,
    pub span: Span,
}

/// An attribute as collected from source or synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    pub name: String,
    pub params: Vec<AttributeParam>,
    pub span: Span,
}

impl AttributeData {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            span,
        }
    }

    pub fn from_ast(attribute: &Attribute<'_>) -> Self {
        Self {
            name: attribute.name.name.to_string(),
            params: attribute
                .args
                .iter()
                .map(|arg| AttributeParam {
                    name: arg.name.map(|n| n.name.to_string()),
                    value: ParamValue::from(&arg.value),
                    span: arg.span,
                })
                .collect(),
            span: attribute.span,
        }
    }

    /// Find a named parameter.
    pub fn param(&self, name: &str) -> Option<&AttributeParam> {
        self.params.iter().find(|p| p.name.as_deref() == Some(name))
    }

    /// The first parameter, named or not.
    pub fn first_value(&self) -> Option<&ParamValue> {
        self.params.first().map(|p| &p.value)
    }
}

/// Ordered attributes of a declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeList {
    items: Vec<AttributeData>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ast(attributes: &[Attribute<'_>]) -> Self {
        Self {
            items: attributes.iter().map(AttributeData::from_ast).collect(),
        }
    }

    pub fn push(&mut self, attribute: AttributeData) {
        self.items.push(attribute);
    }

    pub fn has(&self, name: &str) -> bool {
        self.items.iter().any(|a| a.name == name)
    }

    pub fn find(&self, name: &str) -> Option<&AttributeData> {
        self.items.iter().find(|a| a.name == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.items.iter().filter(|a| a.name == name).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeData> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace every attribute named `name` with `replacement`, in place.
    pub fn expand(&mut self, name: &str, replacement: impl Fn(&AttributeData) -> Vec<AttributeData>) {
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if item.name == name {
                items.extend(replacement(&item));
            } else {
                items.push(item);
            }
        }
        self.items = items;
    }
}

// ============================================================================
// Flags
// ============================================================================

bitflags! {
    /// Properties of a collected field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u16 {
        /// Carries at least one input attribute.
        const INPUT = 1 << 0;
        /// Carries `[Output]`.
        const OUTPUT = 1 << 1;
        /// Carries `[Static]`.
        const STATIC = 1 << 2;
        /// Sampler or image typed.
        const OPAQUE = 1 << 3;
        /// The input attributes came from expanding `[Input]`.
        const EXPANDED_INPUT = 1 << 4;
        /// Carries `[SpecConstant]`.
        const SPEC_CONSTANT = 1 << 5;
    }
}

bitflags! {
    /// Properties of a collected function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u16 {
        /// No instance parameter.
        const STATIC = 1 << 0;
        /// The stage entry function.
        const MAIN = 1 << 1;
        /// Synthesized from a property getter.
        const GETTER = 1 << 2;
        const CONSTRUCTOR = 1 << 3;
        /// Carries `[Extension]`.
        const EXTENSION = 1 << 4;
        /// Carries `[Implements]`.
        const IMPLEMENTS = 1 << 5;
        const UNIT_TEST = 1 << 6;
        /// Generated rather than written.
        const SYNTHESIZED = 1 << 7;
    }
}

bitflags! {
    /// Properties of a collected type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        const SHARED = 1 << 0;
        const INTRINSIC = 1 << 1;
        const EXTENSION = 1 << 2;
        const NON_COPYABLE = 1 << 3;
        /// Generated by the compositor.
        const COMPOSITE = 1 << 4;
    }
}

// ============================================================================
// Fragment types
// ============================================================================

/// Pipeline role of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FragmentStage {
    /// A helper type with no stage.
    #[default]
    None,
    Vertex,
    Geometry,
    Pixel,
    /// A helper type backed by target intrinsics.
    NoneIntrinsic,
}

impl FragmentStage {
    pub fn from_stage(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => FragmentStage::Vertex,
            ShaderStage::Geometry => FragmentStage::Geometry,
            ShaderStage::Pixel => FragmentStage::Pixel,
        }
    }

    pub fn shader_stage(&self) -> Option<ShaderStage> {
        match self {
            FragmentStage::Vertex => Some(ShaderStage::Vertex),
            FragmentStage::Geometry => Some(ShaderStage::Geometry),
            FragmentStage::Pixel => Some(ShaderStage::Pixel),
            FragmentStage::None | FragmentStage::NoneIntrinsic => None,
        }
    }
}

/// Parameters of a `[Geometry]` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryInfo {
    pub max_vertices: u32,
    /// Input stream type name, when given.
    pub input: Option<String>,
    /// Output stream type name, when given.
    pub output: Option<String>,
}

/// A data field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<'ast> {
    pub name: String,
    pub ty: ShaderType,
    pub attributes: AttributeList,
    pub flags: FieldFlags,
    pub default: Option<&'ast Expr<'ast>>,
    pub span: Span,
}

impl Field<'_> {
    /// Key used by stage bookkeeping.
    pub fn type_name(&self) -> String {
        self.ty.name()
    }

    pub fn is_input(&self) -> bool {
        self.flags.contains(FieldFlags::INPUT)
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(FieldFlags::OUTPUT)
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }

    pub fn is_opaque(&self) -> bool {
        self.flags.contains(FieldFlags::OPAQUE)
    }

    pub fn is_spec_constant(&self) -> bool {
        self.flags.contains(FieldFlags::SPEC_CONSTANT)
    }

    /// Stored in struct instances rather than as a module global.
    pub fn is_instance(&self) -> bool {
        !self
            .flags
            .intersects(FieldFlags::STATIC | FieldFlags::OPAQUE | FieldFlags::SPEC_CONSTANT)
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: ShaderType,
    pub is_ref: bool,
    pub span: Span,
}

/// Body of a function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionBody<'ast> {
    Block(Block<'ast>),
    /// Initializes every field from its default value.
    DefaultConstructor,
}

/// A member function, getter or constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct Function<'ast> {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: ShaderType,
    pub attributes: AttributeList,
    pub flags: FunctionFlags,
    pub body: FunctionBody<'ast>,
    /// Type this function extends, for `[Extension(T)]` functions.
    pub extension: Option<String>,
    pub span: Span,
}

impl Function<'_> {
    pub fn is_static(&self) -> bool {
        self.flags.contains(FunctionFlags::STATIC)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of arguments a caller writes. Extension methods on values
    /// take their receiver as the first parameter.
    pub fn call_arity(&self) -> usize {
        if self.has_receiver() {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        }
    }

    /// Whether this is an extension method whose first parameter is the
    /// value it was called on.
    pub fn has_receiver(&self) -> bool {
        self.extension
            .as_deref()
            .is_some_and(|target| target != crate::core_types::MATH_TYPE)
    }

    /// Human-readable signature for candidate lists.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.is_ref {
                    format!("{} : ref {}", p.name, p.ty)
                } else {
                    format!("{} : {}", p.name, p.ty)
                }
            })
            .collect();
        format!("{}({}) : {}", self.name, params.join(", "), self.return_type)
    }
}

/// One collected struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentType<'ast> {
    pub name: String,
    pub stage: FragmentStage,
    pub geometry: Option<GeometryInfo>,
    pub fields: Vec<Field<'ast>>,
    pub functions: Vec<Function<'ast>>,
    pub constructors: Vec<Function<'ast>>,
    pub attributes: AttributeList,
    pub flags: TypeFlags,
    /// Source unit the type was declared in.
    pub origin: Arc<str>,
    pub span: Span,
}

impl<'ast> FragmentType<'ast> {
    pub fn new(name: impl Into<String>, origin: Arc<str>, span: Span) -> Self {
        Self {
            name: name.into(),
            stage: FragmentStage::None,
            geometry: None,
            fields: Vec::new(),
            functions: Vec::new(),
            constructors: Vec::new(),
            attributes: AttributeList::new(),
            flags: TypeFlags::empty(),
            origin,
            span,
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.stage.shader_stage().is_some()
    }

    pub fn is_composite(&self) -> bool {
        self.flags.contains(TypeFlags::COMPOSITE)
    }

    pub fn find_field(&self, name: &str) -> Option<&Field<'ast>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Fields stored in instances. Static, opaque and specialization
    /// constant fields live outside the struct.
    pub fn instance_fields(&self) -> impl Iterator<Item = &Field<'ast>> {
        self.fields.iter().filter(|f| f.is_instance())
    }

    /// Position of `name` among the instance fields.
    pub fn instance_index(&self, name: &str) -> Option<usize> {
        self.instance_fields().position(|f| f.name == name)
    }

    pub fn find_function(&self, name: &str, arity: usize) -> Option<&Function<'ast>> {
        self.functions
            .iter()
            .find(|f| f.name == name && f.call_arity() == arity)
    }

    pub fn functions_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Function<'ast>> + 's {
        self.functions.iter().filter(move |f| f.name == name)
    }

    pub fn find_constructor(&self, arity: usize) -> Option<&Function<'ast>> {
        self.constructors.iter().find(|c| c.arity() == arity)
    }

    /// The function flagged as the stage entry.
    pub fn main_function(&self) -> Option<&Function<'ast>> {
        self.functions
            .iter()
            .find(|f| f.flags.contains(FunctionFlags::MAIN))
    }
}

// ============================================================================
// Library
// ============================================================================

/// Identifies a function inside a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub owner: String,
    pub index: usize,
}

/// Key of an `[Implements]` binding: the extended type, the function name
/// and the number of arguments callers pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImplementsKey {
    pub type_name: String,
    pub function: String,
    pub arity: usize,
}

/// A set of collected fragment types.
#[derive(Debug, Default)]
pub struct FragmentLibrary<'a> {
    parent: Option<&'a FragmentLibrary<'a>>,
    types: Vec<FragmentType<'a>>,
    index: FxHashMap<String, usize>,
    extensions: FxHashMap<String, Vec<FunctionRef>>,
    implements: FxHashMap<ImplementsKey, FunctionRef>,
}

impl<'a> FragmentLibrary<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library whose lookups fall through to `parent`.
    pub fn with_parent(parent: &'a FragmentLibrary<'a>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<&'a FragmentLibrary<'a>> {
        self.parent
    }

    /// Add a type. Fails with the existing type's span when the name is
    /// already taken here or in a parent.
    pub fn add_type(&mut self, ty: FragmentType<'a>) -> Result<usize, Span> {
        if let Some(existing) = self.find_type(&ty.name) {
            return Err(existing.span);
        }
        let index = self.types.len();
        self.index.insert(ty.name.clone(), index);
        self.types.push(ty);
        Ok(index)
    }

    pub fn find_type(&self, name: &str) -> Option<&FragmentType<'a>> {
        match self.index.get(name) {
            Some(&i) => self.types.get(i),
            None => self.parent.and_then(|p| p.find_type(name)),
        }
    }

    pub fn contains_type(&self, name: &str) -> bool {
        self.find_type(name).is_some()
    }

    /// Mutable access to a type owned by this library (not a parent).
    pub fn find_type_mut(&mut self, name: &str) -> Option<&mut FragmentType<'a>> {
        let index = *self.index.get(name)?;
        self.types.get_mut(index)
    }

    /// Types owned by this library in insertion order.
    pub fn types(&self) -> &[FragmentType<'a>] {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut [FragmentType<'a>] {
        &mut self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn function(&self, function: &FunctionRef) -> Option<(&FragmentType<'a>, &Function<'a>)> {
        let owner = self.find_type(&function.owner)?;
        owner.functions.get(function.index).map(|f| (owner, f))
    }

    // === Extensions ===

    pub fn register_extension(&mut self, target: impl Into<String>, function: FunctionRef) {
        self.extensions.entry(target.into()).or_default().push(function);
    }

    /// Extension methods of `target` named `name` taking `arity` arguments,
    /// searching this library first.
    pub fn find_extension(
        &self,
        target: &str,
        name: &str,
        arity: usize,
    ) -> Option<(&FragmentType<'a>, &Function<'a>)> {
        let local = self.extensions.get(target).and_then(|refs| {
            refs.iter()
                .filter_map(|r| self.function(r))
                .find(|(_, f)| f.name == name && f.call_arity() == arity)
        });
        local.or_else(|| self.parent.and_then(|p| p.find_extension(target, name, arity)))
    }

    /// Every extension function registered for `target`.
    pub fn extensions_of(&self, target: &str) -> Vec<(&FragmentType<'a>, &Function<'a>)> {
        let mut out = self
            .parent
            .map(|p| p.extensions_of(target))
            .unwrap_or_default();
        if let Some(refs) = self.extensions.get(target) {
            out.extend(refs.iter().filter_map(|r| self.function(r)));
        }
        out
    }

    // === Implements ===

    pub fn register_implements(&mut self, key: ImplementsKey, function: FunctionRef) -> Option<FunctionRef> {
        self.implements.insert(key, function)
    }

    /// The function implementing `type_name.function` for `arity` arguments.
    pub fn find_implements(
        &self,
        type_name: &str,
        function: &str,
        arity: usize,
    ) -> Option<(&FragmentType<'a>, &Function<'a>)> {
        let key = ImplementsKey {
            type_name: type_name.to_string(),
            function: function.to_string(),
            arity,
        };
        match self.implements.get(&key) {
            Some(r) => self.function(r),
            None => self
                .parent
                .and_then(|p| p.find_implements(type_name, function, arity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> FragmentType<'static> {
        FragmentType::new(name, Arc::from("test"), Span::default())
    }

    fn function(name: &str, params: usize, extension: Option<&str>) -> Function<'static> {
        Function {
            name: name.into(),
            params: (0..params)
                .map(|i| Parameter {
                    name: format!("p{i}"),
                    ty: ShaderType::REAL,
                    is_ref: false,
                    span: Span::default(),
                })
                .collect(),
            return_type: ShaderType::REAL,
            attributes: AttributeList::new(),
            flags: FunctionFlags::STATIC,
            body: FunctionBody::DefaultConstructor,
            extension: extension.map(String::from),
            span: Span::default(),
        }
    }

    #[test]
    fn duplicate_types_rejected_across_layers() {
        let mut base = FragmentLibrary::new();
        base.add_type(ty("A")).unwrap();
        let mut child = FragmentLibrary::with_parent(&base);
        assert!(child.add_type(ty("A")).is_err());
        child.add_type(ty("B")).unwrap();
        assert!(child.find_type("A").is_some());
        assert!(child.find_type("B").is_some());
        assert!(base.find_type("B").is_none());
        assert_eq!(child.types().len(), 1);
    }

    #[test]
    fn extension_lookup_uses_call_arity() {
        let mut library = FragmentLibrary::new();
        let mut helpers = ty("Helpers");
        helpers.functions.push(function("Luminance", 1, Some("Real3")));
        helpers.functions.push(function("Twice", 1, Some("Math")));
        library.add_type(helpers).unwrap();
        library.register_extension("Real3", FunctionRef { owner: "Helpers".into(), index: 0 });
        library.register_extension("Math", FunctionRef { owner: "Helpers".into(), index: 1 });

        assert!(library.find_extension("Real3", "Luminance", 0).is_some());
        assert!(library.find_extension("Real3", "Luminance", 1).is_none());
        assert!(library.find_extension("Math", "Twice", 1).is_some());
        assert_eq!(library.extensions_of("Real3").len(), 1);
    }

    #[test]
    fn attribute_expansion_keeps_order() {
        let mut list = AttributeList::new();
        list.push(AttributeData::new("Static", Span::default()));
        list.push(AttributeData::new("Input", Span::default()));
        list.push(AttributeData::new("Output", Span::default()));
        list.expand("Input", |a| {
            vec![
                AttributeData::new("FragmentInput", a.span),
                AttributeData::new("PropertyInput", a.span),
            ]
        });
        let names: Vec<_> = list.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Static", "FragmentInput", "PropertyInput", "Output"]);
    }
}
