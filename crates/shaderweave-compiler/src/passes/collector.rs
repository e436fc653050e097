//! Collection Pass - Turn parsed type declarations into fragment types.
//!
//! The collector looks at one source unit at a time and never consults the
//! library, so independent units can be collected in parallel. Its output
//! is merged into a [`FragmentLibrary`] afterwards, which is where duplicate
//! definitions across units are detected.
//!
//! ## Responsibilities
//!
//! - One [`FragmentType`] per `struct`; `class` declarations are rejected
//! - Stage markers (at most one per type) and type flags
//! - Fields with syntactically resolved types and expanded `[Input]`
//! - Getters collapse to `get_Name` functions; setters are rejected
//! - Functions and constructors, with a default constructor synthesized
//!   when none is declared
//!
//! Type names that are not built in are assumed to be structs here. The
//! validator checks that they exist once every unit has been collected.

use std::sync::Arc;

use shaderweave_core::CompileError;
use shaderweave_parser::ast::{
    Attribute, ConstructorDecl, FieldDecl, FunctionDecl, Member, Param, PropertyDecl, Script, TypeDecl,
    TypeDeclKind, TypeExpr,
};

use crate::context::CompilerContext;
use crate::core_types::{ShaderType, resolve_type};
use crate::library::{
    AttributeData, AttributeList, Field, FieldFlags, FragmentLibrary, FragmentStage, FragmentType,
    Function, FunctionBody, FunctionFlags, Parameter, TypeFlags,
};

/// Name given to every constructor.
pub const CONSTRUCTOR_NAME: &str = "Construct";

/// Prefix of synthesized getter functions.
pub const GETTER_PREFIX: &str = "get_";

/// Output of the collection pass.
#[derive(Debug, Default)]
pub struct CollectorOutput<'ast> {
    /// Collected types in declaration order.
    pub types: Vec<FragmentType<'ast>>,
    /// Number of functions collected, constructors included.
    pub functions_collected: usize,
    /// Collected errors (collection continues past them).
    pub errors: Vec<CompileError>,
}

impl<'ast> CollectorOutput<'ast> {
    /// Move the collected types into a library, reporting names that are
    /// already taken.
    pub fn register(self, library: &mut FragmentLibrary<'ast>) -> Vec<CompileError> {
        let mut errors = self.errors;
        for ty in self.types {
            let name = ty.name.clone();
            let span = ty.span;
            if library.add_type(ty).is_err() {
                errors.push(CompileError::DuplicateDefinition { name, span });
            }
        }
        errors
    }
}

/// Collects the types of one source unit.
pub struct CollectorPass<'c> {
    ctx: &'c CompilerContext,
    origin: Arc<str>,
    functions_collected: usize,
    errors: Vec<CompileError>,
}

impl<'c> CollectorPass<'c> {
    /// Create a collector for the unit named `origin`.
    pub fn new(ctx: &'c CompilerContext, origin: Arc<str>) -> Self {
        Self {
            ctx,
            origin,
            functions_collected: 0,
            errors: Vec::new(),
        }
    }

    /// Run the pass over a parsed unit.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run<'ast>(mut self, script: &Script<'ast>) -> CollectorOutput<'ast> {
        let mut types = Vec::with_capacity(script.types().len());
        for decl in script.types() {
            if let Some(ty) = self.visit_type(decl) {
                if types.iter().any(|t: &FragmentType<'_>| t.name == ty.name) {
                    self.errors.push(CompileError::DuplicateDefinition {
                        name: ty.name.clone(),
                        span: ty.span,
                    });
                    continue;
                }
                types.push(ty);
            }
        }

        log::trace!(
            "collected {} types and {} functions from '{}'",
            types.len(),
            self.functions_collected,
            self.origin
        );

        CollectorOutput {
            types,
            functions_collected: self.functions_collected,
            errors: self.errors,
        }
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn visit_type<'ast>(&mut self, decl: &TypeDecl<'ast>) -> Option<FragmentType<'ast>> {
        if decl.kind == TypeDeclKind::Class {
            self.errors.push(CompileError::ClassNotAllowed {
                name: decl.name.name.to_string(),
                span: decl.span,
            });
            return None;
        }

        let ctx = self.ctx;
        let names = ctx.names();
        let mut ty = FragmentType::new(decl.name.name, self.origin.clone(), decl.span);
        ty.attributes = self.collect_attributes(decl.attributes);

        // Stage markers
        let markers: Vec<&AttributeData> = ty
            .attributes
            .iter()
            .filter(|a| names.stage_of_attribute(&a.name).is_some())
            .collect();
        if markers.len() > 1 {
            self.errors.push(CompileError::DuplicateStageAttribute {
                type_name: ty.name.clone(),
                names: format!(
                    "[{}], [{}] or [{}]",
                    names.vertex_attribute, names.geometry_attribute, names.pixel_attribute
                ),
                span: markers[1].span,
            });
        }
        if let Some(stage) = markers.first().and_then(|m| names.stage_of_attribute(&m.name)) {
            ty.stage = FragmentStage::from_stage(stage);
        }

        let flag_attributes = [
            (&names.shared_attribute, TypeFlags::SHARED),
            (&names.intrinsic_attribute, TypeFlags::INTRINSIC),
            (&names.extension_attribute, TypeFlags::EXTENSION),
            (&names.non_copyable_attribute, TypeFlags::NON_COPYABLE),
        ];
        for (name, flag) in flag_attributes {
            if ty.attributes.has(name) {
                ty.flags |= flag;
            }
        }
        if ty.stage == FragmentStage::None && ty.flags.contains(TypeFlags::INTRINSIC) {
            ty.stage = FragmentStage::NoneIntrinsic;
        }

        for member in decl.members {
            match member {
                Member::Field(field) => {
                    if let Some(field) = self.visit_field(field) {
                        self.add_field(&mut ty, field);
                    }
                }
                Member::Property(property) => {
                    if let Some(getter) = self.visit_property(property) {
                        self.add_function(&mut ty, getter);
                    }
                }
                Member::Function(function) => {
                    if let Some(function) = self.visit_function(function) {
                        self.add_function(&mut ty, function);
                    }
                }
                Member::Constructor(ctor) => {
                    if let Some(ctor) = self.visit_constructor(&ty.name, ctor) {
                        if ty.find_constructor(ctor.arity()).is_some() {
                            self.errors.push(CompileError::DuplicateDefinition {
                                name: format!("{}.{}", ty.name, CONSTRUCTOR_NAME),
                                span: ctor.span,
                            });
                        } else {
                            self.functions_collected += 1;
                            ty.constructors.push(ctor);
                        }
                    }
                }
            }
        }

        if ty.constructors.is_empty() {
            ty.constructors.push(Function {
                name: CONSTRUCTOR_NAME.to_string(),
                params: Vec::new(),
                return_type: ShaderType::Struct(ty.name.clone()),
                attributes: AttributeList::new(),
                flags: FunctionFlags::CONSTRUCTOR | FunctionFlags::SYNTHESIZED,
                body: FunctionBody::DefaultConstructor,
                extension: None,
                span: ty.span,
            });
        }

        Some(ty)
    }

    fn add_field<'ast>(&mut self, ty: &mut FragmentType<'ast>, field: Field<'ast>) {
        let clashes = ty.find_field(&field.name).is_some()
            || ty.functions.iter().any(|f| f.name == field.name);
        if clashes {
            self.errors.push(CompileError::DuplicateDefinition {
                name: format!("{}.{}", ty.name, field.name),
                span: field.span,
            });
            return;
        }
        ty.fields.push(field);
    }

    fn add_function<'ast>(&mut self, ty: &mut FragmentType<'ast>, function: Function<'ast>) {
        let clashes = ty.find_field(&function.name).is_some()
            || ty
                .functions
                .iter()
                .any(|f| f.name == function.name && f.arity() == function.arity());
        if clashes {
            self.errors.push(CompileError::DuplicateDefinition {
                name: format!("{}.{}", ty.name, function.name),
                span: function.span,
            });
            return;
        }
        self.functions_collected += 1;
        ty.functions.push(function);
    }

    // ========================================================================
    // Members
    // ========================================================================

    fn visit_field<'ast>(&mut self, decl: &FieldDecl<'ast>) -> Option<Field<'ast>> {
        let ctx = self.ctx;
        let names = ctx.names();
        let ty = self.resolve(&decl.ty)?;
        let mut attributes = self.collect_attributes(decl.attributes);
        let mut flags = FieldFlags::empty();

        let inputs = names.input_sequence();
        let explicit_input = attributes.iter().any(|a| inputs.contains(&a.name.as_str()));
        if attributes.has(&names.input_attribute) {
            if explicit_input {
                attributes.expand(&names.input_attribute, |_| Vec::new());
            } else {
                attributes.expand(&names.input_attribute, |input| {
                    inputs
                        .iter()
                        .map(|name| AttributeData::new(*name, input.span))
                        .collect()
                });
                flags |= FieldFlags::EXPANDED_INPUT;
            }
        }

        if attributes.iter().any(|a| inputs.contains(&a.name.as_str())) {
            flags |= FieldFlags::INPUT;
        }
        if attributes.has(&names.output_attribute) {
            flags |= FieldFlags::OUTPUT;
        }
        if attributes.has(&names.static_attribute) {
            flags |= FieldFlags::STATIC;
        }
        if attributes.has(&names.spec_constant_attribute) {
            flags |= FieldFlags::SPEC_CONSTANT;
        }
        if ty.is_opaque() {
            flags |= FieldFlags::OPAQUE;
        }

        Some(Field {
            name: decl.name.name.to_string(),
            ty,
            attributes,
            flags,
            default: decl.default,
            span: decl.span,
        })
    }

    fn visit_property<'ast>(&mut self, decl: &PropertyDecl<'ast>) -> Option<Function<'ast>> {
        if let Some(setter) = &decl.setter {
            self.errors.push(CompileError::SetterNotSupported {
                name: decl.name.name.to_string(),
                span: setter.span,
            });
        }
        let getter = decl.getter?;
        let return_type = self.resolve(&decl.ty)?;
        let attributes = self.collect_attributes(decl.attributes);
        let mut flags = FunctionFlags::GETTER;
        if attributes.has(&self.ctx.names().static_attribute) {
            flags |= FunctionFlags::STATIC;
        }
        Some(Function {
            name: format!("{GETTER_PREFIX}{}", decl.name.name),
            params: Vec::new(),
            return_type,
            attributes,
            flags,
            body: FunctionBody::Block(getter),
            extension: None,
            span: decl.span,
        })
    }

    fn visit_function<'ast>(&mut self, decl: &FunctionDecl<'ast>) -> Option<Function<'ast>> {
        let ctx = self.ctx;
        let names = ctx.names();
        let attributes = self.collect_attributes(decl.attributes);
        let params = self.visit_params(decl.params)?;
        let return_type = match &decl.return_type {
            Some(ty) => self.resolve(ty)?,
            None => ShaderType::Void,
        };

        let mut flags = FunctionFlags::empty();
        let mut extension = None;
        if attributes.has(&names.static_attribute) {
            flags |= FunctionFlags::STATIC;
        }
        if let Some(ext) = attributes.find(&names.extension_attribute) {
            // Extension methods never see an instance of their owner.
            flags |= FunctionFlags::EXTENSION | FunctionFlags::STATIC;
            extension = ext.first_value().and_then(|v| v.as_str()).map(String::from);
        }
        if attributes.has(&names.implements_attribute) {
            flags |= FunctionFlags::IMPLEMENTS;
        }
        if attributes.has(&names.unit_test_attribute) {
            flags |= FunctionFlags::UNIT_TEST;
        }
        let is_main = decl.name.name == names.main_function || attributes.has(&names.main_attribute);
        if is_main && !flags.contains(FunctionFlags::STATIC) {
            flags |= FunctionFlags::MAIN;
        }

        Some(Function {
            name: decl.name.name.to_string(),
            params,
            return_type,
            attributes,
            flags,
            body: FunctionBody::Block(decl.body),
            extension,
            span: decl.span,
        })
    }

    fn visit_constructor<'ast>(
        &mut self,
        owner: &str,
        decl: &ConstructorDecl<'ast>,
    ) -> Option<Function<'ast>> {
        Some(Function {
            name: CONSTRUCTOR_NAME.to_string(),
            params: self.visit_params(decl.params)?,
            return_type: ShaderType::Struct(owner.to_string()),
            attributes: self.collect_attributes(decl.attributes),
            flags: FunctionFlags::CONSTRUCTOR,
            body: FunctionBody::Block(decl.body),
            extension: None,
            span: decl.span,
        })
    }

    fn visit_params(&mut self, params: &[Param<'_>]) -> Option<Vec<Parameter>> {
        let mut out = Vec::with_capacity(params.len());
        let mut ok = true;
        for param in params {
            match self.resolve(&param.ty) {
                Some(ty) => out.push(Parameter {
                    name: param.name.name.to_string(),
                    ty,
                    is_ref: param.is_ref,
                    span: param.span,
                }),
                None => ok = false,
            }
        }
        ok.then_some(out)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn collect_attributes(&mut self, attributes: &[Attribute<'_>]) -> AttributeList {
        let ctx = self.ctx;
        let names = ctx.names();
        for attribute in attributes {
            if !names.is_known_attribute(attribute.name.name) {
                self.errors.push(CompileError::UnknownAttribute {
                    name: attribute.name.name.to_string(),
                    span: attribute.span,
                });
            }
        }
        AttributeList::from_ast(attributes)
    }

    fn resolve(&mut self, expr: &TypeExpr<'_>) -> Option<ShaderType> {
        match resolve_type(expr, self.ctx.settings(), &|_| true) {
            Ok(ty) => Some(ty),
            Err(error) => {
                self.errors.push(error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use shaderweave_parser::Parser;

    fn collect<'ast>(source: &str, arena: &'ast Bump) -> CollectorOutput<'ast> {
        let ctx = CompilerContext::default();
        let script = Parser::parse(source, arena).expect("parse");
        CollectorPass::new(&ctx, Arc::from("test")).run(&script)
    }

    #[test]
    fn collects_struct_with_stage() {
        let arena = Bump::new();
        let out = collect(
            r#"
            [Pixel]
            struct Tint {
                [Input] var Color : Real4;
                [Output] var Target0 : Real4;
                function Main() { this.Target0 = this.Color; }
            }
            "#,
            &arena,
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let ty = &out.types[0];
        assert_eq!(ty.stage, FragmentStage::Pixel);
        assert_eq!(ty.fields.len(), 2);
        assert!(ty.main_function().is_some());
        assert_eq!(ty.constructors.len(), 1);
        assert!(ty.constructors[0].flags.contains(FunctionFlags::SYNTHESIZED));
    }

    #[test]
    fn input_expands_to_resolution_sequence() {
        let arena = Bump::new();
        let out = collect(
            "[Pixel] struct A { [Input] var Uv : Real2; [Input][StageInput] var Normal : Real3; }",
            &arena,
        );
        let ty = &out.types[0];
        let uv = ty.find_field("Uv").unwrap();
        let names: Vec<_> = uv.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["FragmentInput", "StageInput", "BuiltInInput", "PropertyInput"]);
        assert!(uv.flags.contains(FieldFlags::EXPANDED_INPUT | FieldFlags::INPUT));

        let normal = ty.find_field("Normal").unwrap();
        let names: Vec<_> = normal.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["StageInput"]);
        assert!(!normal.flags.contains(FieldFlags::EXPANDED_INPUT));
    }

    #[test]
    fn class_is_rejected() {
        let arena = Bump::new();
        let out = collect("class Foo { var X : Real; }", &arena);
        assert!(out.types.is_empty());
        assert!(matches!(out.errors[0], CompileError::ClassNotAllowed { .. }));
    }

    #[test]
    fn two_stage_markers_are_fatal() {
        let arena = Bump::new();
        let out = collect("[Vertex][Pixel] struct Both { }", &arena);
        assert!(matches!(out.errors[0], CompileError::DuplicateStageAttribute { .. }));
    }

    #[test]
    fn setter_is_reported_and_getter_kept() {
        let arena = Bump::new();
        let out = collect(
            "struct P { var Half : Real { get { return 0.5; } set { } } }",
            &arena,
        );
        assert!(matches!(out.errors[0], CompileError::SetterNotSupported { .. }));
        let getter = out.types[0].find_function("get_Half", 0).unwrap();
        assert!(getter.flags.contains(FunctionFlags::GETTER));
        assert_eq!(getter.return_type, ShaderType::REAL);
    }

    #[test]
    fn unknown_attribute_reported() {
        let arena = Bump::new();
        let out = collect("[Shiny] struct S { }", &arena);
        assert!(matches!(&out.errors[0], CompileError::UnknownAttribute { name, .. } if name == "Shiny"));
    }

    #[test]
    fn duplicate_across_units_reported_on_register() {
        let arena = Bump::new();
        let mut library = FragmentLibrary::new();
        let first = collect("struct S { }", &arena);
        assert!(first.register(&mut library).is_empty());
        let second = collect("struct S { }", &arena);
        let errors = second.register(&mut library);
        assert!(matches!(errors[0], CompileError::DuplicateDefinition { .. }));
    }
}
