//! Validation Pass - Check attributes and resolve cross-type bindings.
//!
//! Runs after every unit has been collected into a library. It checks
//! attribute legality and parameters, confirms that every named type
//! exists, checks `Main` signatures and registers extension methods and
//! `[Implements]` redirects in the library.
//!
//! The checks read the library immutably; registrations are gathered and
//! applied at the end so a type's checks never observe half-applied state.

use shaderweave_core::{CompileError, Span};

use crate::context::{CompilerContext, LocatedError};
use crate::core_types::{MATH_INTRINSICS, MATH_TYPE, ShaderType, find_intrinsic};
use crate::library::{
    AttributeData, FieldFlags, FragmentLibrary, FragmentStage, FragmentType, Function, FunctionRef,
    GeometryInfo, ImplementsKey, ParamValue,
};

/// Output of the validation pass.
#[derive(Debug, Default)]
pub struct ValidationOutput {
    pub extensions_registered: usize,
    pub implements_registered: usize,
    /// Collected errors, located in the unit of the type they concern
    /// (validation continues past them).
    pub errors: Vec<LocatedError>,
}

/// Validates the types a library owns and registers their bindings.
pub struct ValidationPass<'c, 'a> {
    ctx: &'c CompilerContext,
    library: &'c mut FragmentLibrary<'a>,
}

impl<'c, 'a> ValidationPass<'c, 'a> {
    pub fn new(ctx: &'c CompilerContext, library: &'c mut FragmentLibrary<'a>) -> Self {
        Self { ctx, library }
    }

    /// Run the pass over every type the library owns.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(self) -> ValidationOutput {
        let library = &*self.library;
        let mut checker = Checker {
            ctx: self.ctx,
            library,
            errors: Vec::new(),
            pending: Pending::default(),
        };
        let mut errors = Vec::new();
        for ty in library.types() {
            checker.check_type(ty);
            errors.extend(checker.errors.drain(..).map(|e| LocatedError::new(&ty.origin, e)));
        }
        let pending = checker.pending;

        let extensions_registered = pending.extensions.len();
        let implements_registered = pending.implements.len();
        for (name, info) in pending.geometry {
            if let Some(ty) = self.library.find_type_mut(&name) {
                ty.geometry = Some(info);
            }
        }
        for (target, function) in pending.extensions {
            self.library.register_extension(target, function);
        }
        for (key, function) in pending.implements {
            self.library.register_implements(key, function);
        }

        log::trace!(
            "validated {} types: {} extensions, {} implements, {} errors",
            self.library.len(),
            extensions_registered,
            implements_registered,
            errors.len()
        );

        ValidationOutput {
            extensions_registered,
            implements_registered,
            errors,
        }
    }
}

// ============================================================================
// Attribute signatures
// ============================================================================

/// Literal shape an attribute parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Integer,
    String,
    /// A type name, written as an identifier or string.
    TypeName,
}

impl ParamKind {
    fn accepts(&self, value: &ParamValue) -> bool {
        match self {
            ParamKind::Integer => matches!(value, ParamValue::Int(_)),
            ParamKind::String => matches!(value, ParamValue::String(_)),
            ParamKind::TypeName => matches!(value, ParamValue::String(_) | ParamValue::Ident(_)),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Integer => "Integer",
            ParamKind::String => "String",
            ParamKind::TypeName => "Type",
        }
    }
}

#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    kind: ParamKind,
    required: bool,
}

impl ParamSpec {
    fn new(name: impl Into<String>, kind: ParamKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
        }
    }
}

/// Where an attribute was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Type,
    Field,
    Function,
}

impl Target {
    fn as_str(&self) -> &'static str {
        match self {
            Target::Type => "types",
            Target::Field => "fields",
            Target::Function => "functions",
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    geometry: Vec<(String, GeometryInfo)>,
    extensions: Vec<(String, FunctionRef)>,
    implements: Vec<(ImplementsKey, FunctionRef)>,
}

// ============================================================================
// Checks
// ============================================================================

struct Checker<'c, 'a> {
    ctx: &'c CompilerContext,
    library: &'c FragmentLibrary<'a>,
    errors: Vec<CompileError>,
    pending: Pending,
}

impl<'a> Checker<'_, 'a> {
    /// Parameter signature of a known attribute. `None` accepts anything.
    fn signature(&self, attribute: &str) -> Option<Vec<ParamSpec>> {
        let names = self.ctx.names();
        if attribute == names.geometry_attribute {
            Some(vec![
                ParamSpec::new(&names.max_vertices_parameter, ParamKind::Integer, true),
                ParamSpec::new(&names.input_parameter, ParamKind::TypeName, false),
                ParamSpec::new(&names.output_parameter, ParamKind::TypeName, false),
            ])
        } else if attribute == names.extension_attribute {
            Some(vec![ParamSpec::new("type", ParamKind::TypeName, true)])
        } else if attribute == names.system_value_attribute {
            Some(vec![ParamSpec::new("name", ParamKind::String, true)])
        } else if attribute == names.spec_constant_attribute {
            Some(vec![ParamSpec::new("id", ParamKind::Integer, false)])
        } else if names.custom_attributes.iter().any(|c| c == attribute) {
            None
        } else if names.is_known_attribute(attribute) {
            Some(Vec::new())
        } else {
            // Unknown names were reported by the collector.
            None
        }
    }

    /// Which declarations an attribute may be written on.
    fn allowed_on(&self, attribute: &str, target: Target) -> bool {
        let names = self.ctx.names();
        let type_only = [
            &names.vertex_attribute,
            &names.geometry_attribute,
            &names.pixel_attribute,
            &names.shared_attribute,
            &names.intrinsic_attribute,
            &names.non_copyable_attribute,
        ];
        let function_only = [
            &names.implements_attribute,
            &names.main_attribute,
            &names.unit_test_attribute,
        ];
        let field_only = [
            &names.input_attribute,
            &names.fragment_input_attribute,
            &names.stage_input_attribute,
            &names.builtin_input_attribute,
            &names.property_input_attribute,
            &names.output_attribute,
            &names.spec_constant_attribute,
            &names.uniform_attribute,
            &names.stage_output_attribute,
            &names.system_value_attribute,
        ];
        let is = |list: &[&String]| list.iter().any(|n| n.as_str() == attribute);
        match target {
            Target::Type => !is(&function_only) && !is(&field_only),
            Target::Field => !is(&type_only) && !is(&function_only) && attribute != names.extension_attribute,
            Target::Function => !is(&type_only) && !is(&field_only),
        }
    }

    fn check_attribute(&mut self, attribute: &AttributeData, target: Target) {
        if !self.allowed_on(&attribute.name, target) {
            self.errors.push(CompileError::AttributeNotAllowed {
                attribute: attribute.name.clone(),
                target: target.as_str().to_string(),
                span: attribute.span,
            });
            return;
        }
        let Some(signature) = self.signature(&attribute.name) else {
            return;
        };

        let mut seen = vec![false; signature.len()];
        for (position, param) in attribute.params.iter().enumerate() {
            let index = match &param.name {
                Some(name) => signature.iter().position(|s| &s.name == name),
                None => (position < signature.len()).then_some(position),
            };
            let Some(index) = index else {
                self.errors.push(CompileError::UnknownAttributeParameter {
                    attribute: attribute.name.clone(),
                    parameter: param.name.clone().unwrap_or_else(|| position.to_string()),
                    span: param.span,
                });
                continue;
            };
            let spec = &signature[index];
            seen[index] = true;
            if !spec.kind.accepts(&param.value) {
                self.errors.push(CompileError::InvalidAttributeParameter {
                    parameter: spec.name.clone(),
                    expected: spec.kind.as_str().to_string(),
                    span: param.span,
                });
            }
        }
        for (spec, seen) in signature.iter().zip(seen) {
            if spec.required && !seen {
                self.errors.push(CompileError::MissingAttributeParameter {
                    attribute: attribute.name.clone(),
                    parameter: spec.name.clone(),
                    span: attribute.span,
                });
            }
        }
    }

    /// Report struct names that no library type declares.
    fn check_type_exists(&mut self, ty: &ShaderType, span: Span) {
        match ty {
            ShaderType::Struct(name) => {
                if !self.library.contains_type(name) {
                    self.errors.push(CompileError::UnknownType {
                        name: name.clone(),
                        span,
                    });
                }
            }
            ShaderType::Array(element, _) => self.check_type_exists(element, span),
            ShaderType::Stream(stream) => self.check_type_exists(&stream.element, span),
            _ => {}
        }
    }

    // === Types ===

    fn check_type(&mut self, ty: &FragmentType<'a>) {
        let ctx = self.ctx;
        let names = ctx.names();
        for attribute in ty.attributes.iter() {
            self.check_attribute(attribute, Target::Type);
        }

        if ty.is_fragment() {
            for forbidden in [&names.intrinsic_attribute, &names.extension_attribute] {
                if let Some(attribute) = ty.attributes.find(forbidden) {
                    self.errors.push(CompileError::AttributeNotAllowed {
                        attribute: attribute.name.clone(),
                        target: "fragment types".to_string(),
                        span: attribute.span,
                    });
                }
            }
        }
        if ty.attributes.count(&names.shared_attribute) > 1 {
            self.errors.push(CompileError::AttributeCountExceeded {
                attribute: names.shared_attribute.clone(),
                target: format!("type '{}'", ty.name),
                max: 1,
                span: ty.span,
            });
        }

        if ty.stage == FragmentStage::Geometry {
            self.check_geometry(ty);
        }

        for field in &ty.fields {
            for attribute in field.attributes.iter() {
                self.check_attribute(attribute, Target::Field);
            }
            self.check_type_exists(&field.ty, field.span);
            let explicit_builtin = field.attributes.has(&names.builtin_input_attribute)
                && !field.flags.contains(FieldFlags::EXPANDED_INPUT);
            if explicit_builtin
                && self
                    .ctx
                    .settings()
                    .find_builtin(&field.name, &field.type_name())
                    .is_none()
            {
                self.errors.push(CompileError::InvalidBuiltIn {
                    name: field.name.clone(),
                    type_name: field.type_name(),
                    span: field.span,
                });
            }
        }

        for (index, function) in ty.functions.iter().enumerate() {
            self.check_function(ty, index, function);
        }
        for ctor in &ty.constructors {
            for attribute in ctor.attributes.iter() {
                self.check_attribute(attribute, Target::Function);
            }
            for param in &ctor.params {
                self.check_type_exists(&param.ty, param.span);
            }
        }

        if ty.is_fragment() {
            self.check_main(ty);
        }
    }

    fn check_geometry(&mut self, ty: &FragmentType<'a>) {
        let ctx = self.ctx;
        let names = ctx.names();
        let Some(marker) = ty.attributes.find(&names.geometry_attribute) else {
            return;
        };
        let max_vertices = marker
            .param(&names.max_vertices_parameter)
            .or_else(|| marker.params.first().filter(|p| p.name.is_none()))
            .and_then(|p| p.value.as_int())
            .unwrap_or(0);
        let stream = |parameter: &str| -> Option<(String, Span)> {
            marker
                .param(parameter)
                .and_then(|p| p.value.as_str().map(|s| (s.to_string(), p.span)))
        };
        let input = stream(&names.input_parameter);
        let output = stream(&names.output_parameter);

        for (name, span) in input.iter().chain(output.iter()) {
            if ctx.settings().find_stream(name).is_none() {
                self.errors.push(CompileError::InvalidAttributeParameter {
                    parameter: name.clone(),
                    expected: "stream type".to_string(),
                    span: *span,
                });
            }
        }

        self.pending.geometry.push((
            ty.name.clone(),
            GeometryInfo {
                max_vertices: u32::try_from(max_vertices).unwrap_or(0),
                input: input.map(|(n, _)| n),
                output: output.map(|(n, _)| n),
            },
        ));
    }

    fn check_main(&mut self, ty: &FragmentType<'a>) {
        let main = ty.main_function();
        let invalid = |message: &str, span: Span| CompileError::InvalidMainSignature {
            fragment: ty.name.clone(),
            message: message.to_string(),
            span,
        };
        match (ty.stage, main) {
            (FragmentStage::Geometry, None) => {
                self.errors.push(invalid(
                    "geometry fragments must declare Main(input stream, output stream)",
                    ty.span,
                ));
            }
            (FragmentStage::Geometry, Some(main)) => {
                let ok = match main.params.as_slice() {
                    [input, output] => match (&input.ty, &output.ty) {
                        (ShaderType::Stream(i), ShaderType::Stream(o)) if !i.is_output && o.is_output => {
                            if !matches!(
                                (i.element.as_ref(), o.element.as_ref()),
                                (ShaderType::Struct(_), ShaderType::Struct(_))
                            ) {
                                self.errors
                                    .push(invalid("geometry stream elements must be struct types", main.span));
                            }
                            true
                        }
                        _ => false,
                    },
                    _ => false,
                };
                if !ok {
                    self.errors.push(invalid(
                        "geometry Main takes exactly an input stream and an output stream",
                        main.span,
                    ));
                }
            }
            (_, Some(main)) if !main.params.is_empty() => {
                self.errors.push(invalid("Main must not take parameters", main.span));
            }
            _ => {}
        }
        if let Some(main) = main.filter(|m| !m.return_type.is_void()) {
            self.errors.push(invalid("Main must not return a value", main.span));
        }
    }

    // === Functions ===

    fn check_function(&mut self, owner: &FragmentType<'a>, index: usize, function: &Function<'a>) {
        let ctx = self.ctx;
        let names = ctx.names();
        for attribute in function.attributes.iter() {
            self.check_attribute(attribute, Target::Function);
        }
        for param in &function.params {
            self.check_type_exists(&param.ty, param.span);
        }
        self.check_type_exists(&function.return_type, function.span);

        let implements = function.attributes.find(&names.implements_attribute);
        let extension = function.attributes.find(&names.extension_attribute);

        if let (Some(implements), None) = (implements, extension) {
            self.errors.push(CompileError::ImplementsWithoutExtension {
                implements: implements.name.clone(),
                extension: names.extension_attribute.clone(),
                span: implements.span,
            });
            return;
        }
        let Some(extension) = extension else {
            return;
        };
        let Some(target) = function.extension.clone() else {
            // Missing parameter was reported with the signature check.
            return;
        };

        let exists = target == MATH_TYPE
            || ShaderType::from_name(&target).is_some()
            || self.library.contains_type(&target);
        if !exists {
            self.errors.push(CompileError::InvalidExtensionTarget {
                type_name: target,
                span: extension.span,
            });
            return;
        }
        if target != MATH_TYPE {
            let receiver_matches = function
                .params
                .first()
                .is_some_and(|p| p.ty.name() == target);
            if !receiver_matches {
                self.errors.push(CompileError::TypeMismatch {
                    message: format!(
                        "extension '{}' must take a '{}' as its first parameter",
                        function.name, target
                    ),
                    span: function.span,
                });
                return;
            }
        }

        let function_ref = FunctionRef {
            owner: owner.name.clone(),
            index,
        };
        self.pending.extensions.push((target.clone(), function_ref.clone()));

        if implements.is_some() {
            self.check_implements(&target, function, function_ref);
        }
    }

    fn check_implements(&mut self, target: &str, function: &Function<'a>, function_ref: FunctionRef) {
        let arity = function.call_arity();
        let found = if target == MATH_TYPE {
            find_intrinsic(&function.name, arity).is_some()
        } else {
            self.library
                .find_type(target)
                .and_then(|t| t.find_function(&function.name, arity))
                .is_some()
        };

        if !found {
            let candidates: Vec<String> = if target == MATH_TYPE {
                MATH_INTRINSICS
                    .iter()
                    .filter(|i| i.name == function.name)
                    .map(|i| format!("{}({} args)", i.name, i.arity))
                    .collect()
            } else {
                self.library
                    .find_type(target)
                    .map(|t| t.functions_named(&function.name).map(Function::signature).collect())
                    .unwrap_or_default()
            };
            let candidates = if candidates.is_empty() {
                "No functions with that name exist.".to_string()
            } else {
                format!("Possible matches: {}", candidates.join(", "))
            };
            self.errors.push(CompileError::ImplementsTargetMissing {
                function: function.name.clone(),
                type_name: target.to_string(),
                candidates,
                span: function.span,
            });
            return;
        }

        let key = ImplementsKey {
            type_name: target.to_string(),
            function: function.name.clone(),
            arity,
        };
        if self.pending.implements.iter().any(|(k, _)| *k == key)
            || self.library.find_implements(target, &function.name, arity).is_some()
        {
            self.errors.push(CompileError::DuplicateDefinition {
                name: format!("{target}.{} implementation", function.name),
                span: function.span,
            });
            return;
        }
        self.pending.implements.push((key, function_ref));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::collector::CollectorPass;
    use bumpalo::Bump;
    use shaderweave_parser::Parser;
    use std::sync::Arc;

    fn validate(source: &str) -> (Vec<CompileError>, usize, usize) {
        let arena = Bump::new();
        let ctx = CompilerContext::default();
        let script = Parser::parse(source, &arena).expect("parse");
        let mut library = FragmentLibrary::new();
        let mut errors = CollectorPass::new(&ctx, Arc::from("test"))
            .run(&script)
            .register(&mut library);
        let out = ValidationPass::new(&ctx, &mut library).run();
        errors.extend(out.errors.into_iter().map(|e| e.error));
        (errors, out.extensions_registered, out.implements_registered)
    }

    #[test]
    fn geometry_requires_max_vertices() {
        let (errors, ..) = validate(
            r#"
            struct GeoIn { var P : Real4; }
            [Geometry(input : TriangleInput)]
            struct Geo {
                function Main(input : TriangleInput[GeoIn], output : TriangleOutput[GeoIn]) { }
            }
            "#,
        );
        assert!(errors.iter().any(|e| matches!(
            e,
            CompileError::MissingAttributeParameter { parameter, .. } if parameter == "maxVertices"
        )));
    }

    #[test]
    fn wrong_parameter_type() {
        let (errors, ..) = validate("[Geometry(maxVertices : \"three\")] struct G { }");
        assert!(errors.iter().any(|e| matches!(
            e,
            CompileError::InvalidAttributeParameter { expected, .. } if expected == "Integer"
        )));
    }

    #[test]
    fn unknown_parameter() {
        let (errors, ..) = validate("[Pixel(speed : 3)] struct P { }");
        assert!(matches!(errors[0], CompileError::UnknownAttributeParameter { .. }));
    }

    #[test]
    fn unknown_field_type() {
        let (errors, ..) = validate("struct A { var B : Missing; }");
        assert!(matches!(&errors[0], CompileError::UnknownType { name, .. } if name == "Missing"));
    }

    #[test]
    fn builtin_input_must_be_registered() {
        let (errors, ..) = validate(
            "[Vertex] struct V { [BuiltInInput] var LocalToWorld : Real4x4; [BuiltInInput] var Nope : Real; }",
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], CompileError::InvalidBuiltIn { name, .. } if name == "Nope"));
    }

    #[test]
    fn fragment_cannot_be_intrinsic() {
        let (errors, ..) = validate("[Pixel][Intrinsic] struct P { }");
        assert!(matches!(errors[0], CompileError::AttributeNotAllowed { .. }));
    }

    #[test]
    fn shared_at_most_once() {
        let (errors, ..) = validate("[Shared][Shared] struct S { }");
        assert!(matches!(errors[0], CompileError::AttributeCountExceeded { max: 1, .. }));
    }

    #[test]
    fn implements_needs_extension() {
        let (errors, ..) = validate("struct H { [Static][Implements] function Saturate(x : Real) : Real { return x; } }");
        assert!(matches!(errors[0], CompileError::ImplementsWithoutExtension { .. }));
    }

    #[test]
    fn implements_registers_math_redirect() {
        let (errors, extensions, implements) = validate(
            r#"
            struct H {
                [Static][Extension(Math)][Implements]
                function Saturate(x : Real) : Real { return Math.Clamp(x, 0.0, 1.0); }
            }
            "#,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!((extensions, implements), (1, 1));
    }

    #[test]
    fn implements_missing_target_lists_candidates() {
        let (errors, ..) = validate(
            r#"
            struct H {
                [Static][Extension(Math)][Implements]
                function Saturate(x : Real, y : Real) : Real { return x; }
            }
            "#,
        );
        match &errors[0] {
            CompileError::ImplementsTargetMissing { candidates, .. } => {
                assert!(candidates.contains("Saturate(1 args)"), "{candidates}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extension_target_must_exist() {
        let (errors, ..) = validate("struct H { [Extension(Nowhere)] function F(v : Real) { } }");
        assert!(errors.iter().any(|e| matches!(e, CompileError::InvalidExtensionTarget { .. })));
    }

    #[test]
    fn main_signatures() {
        let (errors, ..) = validate("[Pixel] struct P { function Main(x : Real) { } }");
        assert!(matches!(errors[0], CompileError::InvalidMainSignature { .. }));

        let (errors, ..) = validate("struct E { var P : Real4; } [Geometry(maxVertices : 3)] struct G { function Main(a : TriangleInput[E]) { } }");
        assert!(errors.iter().any(|e| matches!(e, CompileError::InvalidMainSignature { .. })));
    }

    #[test]
    fn geometry_stream_elements_must_be_structs() {
        let (errors, ..) = validate(
            r#"
            [Geometry(maxVertices : 3)]
            struct G {
                function Main(input : TriangleInput[Real4], output : TriangleOutput[Real4]) { }
            }
            "#,
        );
        assert!(errors.iter().any(|e| matches!(
            e,
            CompileError::InvalidMainSignature { fragment, message, .. }
                if fragment == "G" && message.contains("struct")
        )));
    }
}
