use std::sync::Arc;

use bumpalo::Bump;
use shaderweave_core::CompileError;
use shaderweave_ir::ShaderStage;
use shaderweave_parser::Parser;

use crate::code_builder::find_mapping;
use crate::compositor::ShaderDefinition;
use crate::context::CompilerContext;
use crate::library::FragmentLibrary;
use crate::passes::{CollectorPass, ValidationPass};
use crate::{ShaderCompiler, ShaderOutput};

use super::TranslatedStage;

fn compile(source: &str, fragments: &[&str]) -> ShaderOutput {
    let arena = Bump::new();
    let ctx = CompilerContext::default();
    let script = Parser::parse(source, &arena).expect("parse");
    let mut library = FragmentLibrary::new();
    let errors = CollectorPass::new(&ctx, Arc::from("test"))
        .run(&script)
        .register(&mut library);
    assert!(errors.is_empty(), "{errors:?}");
    let validation = ValidationPass::new(&ctx, &mut library).run();
    assert!(validation.errors.is_empty(), "{:?}", validation.errors);
    ShaderCompiler::new(&ctx, &library).compile(&ShaderDefinition::new("Test", fragments.iter().copied()))
}

fn translated(output: &ShaderOutput, stage: ShaderStage) -> &TranslatedStage {
    &output.stage(stage).expect("stage").translated
}

fn pixel_fragment(body: &str) -> String {
    format!(
        r#"
        [Vertex]
        struct A {{
            [Output] var Normal : Real3;
            function Main() {{ this.Normal = Real3(0.0, 1.0, 0.0); }}
        }}
        [Pixel]
        struct B {{
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() {{
                {body}
            }}
        }}
        "#
    )
}

#[test]
fn stage_globals_and_entry_point() {
    let output = compile(&pixel_fragment("this.Target0 = Real4(this.Normal, 1.0);"), &["A", "B"]);
    assert!(!output.has_errors());

    let vertex = &translated(&output, ShaderStage::Vertex).text;
    assert!(vertex.starts_with("#version"), "{vertex}");
    assert!(vertex.contains("layout(location = 0) out vec3 out_Normal;"), "{vertex}");
    assert!(vertex.contains("out_Normal = self.Normal;"), "{vertex}");

    let pixel = &translated(&output, ShaderStage::Pixel).text;
    assert!(pixel.contains("layout(location = 0) in vec3 in_Normal;"), "{pixel}");
    assert!(pixel.contains("layout(location = 0) out vec4 Target0;"), "{pixel}");
    assert!(pixel.contains("void B_Main(inout B self)"), "{pixel}");
    assert!(pixel.contains("self.Target0 = vec4(self.Normal, 1.0);"), "{pixel}");
    assert!(pixel.contains("void main()"), "{pixel}");
    assert!(pixel.contains("self.Normal = in_Normal;"), "{pixel}");
    assert!(pixel.contains("Target0 = self.Target0;"), "{pixel}");
}

#[test]
fn operators_keep_source_evaluation_order() {
    let output = compile(
        &pixel_fragment(
            r#"
            var a = this.Normal;
            var b = Real3(2.0);
            var c = (a + b) * 0.5;
            var d = a - (b - c);
            var e = a * b + c;
            var f = (a - b) - c;
            this.Target0 = Real4(d + e + f, 1.0);
            "#,
        ),
        &["A", "B"],
    );
    let pixel = translated(&output, ShaderStage::Pixel);
    assert!(pixel.errors.is_empty(), "{:?}", pixel.errors);
    let text = &pixel.text;
    assert!(text.contains("vec3 b = vec3(2.0);"), "{text}");
    assert!(text.contains("vec3 c = (a + b) * 0.5;"), "{text}");
    assert!(text.contains("vec3 d = a - (b - c);"), "{text}");
    assert!(text.contains("vec3 e = a * b + c;"), "{text}");
    assert!(text.contains("vec3 f = a - b - c;"), "{text}");
}

#[test]
fn resolvers_rewrite_operators_and_intrinsics() {
    let source = pixel_fragment(
        r#"
            var a = this.Normal;
            var b = Real3(0.5);
            var mask = a < b;
            var s = Math.Saturate(a.x);
            var output = Math.Lerp(a, b, s);
            this.Target0 = Real4(output, 1.0);
            "#,
    );
    let output = compile(&source, &["A", "B"]);
    let pixel = translated(&output, ShaderStage::Pixel);
    assert!(pixel.errors.is_empty(), "{:?}", pixel.errors);
    let text = &pixel.text;
    assert!(text.contains("bvec3 mask = lessThan(a, b);"), "{text}");
    assert!(text.contains("float s = clamp(a.x, 0.0, 1.0);"), "{text}");
    // `output` is reserved by the target
    assert!(text.contains("vec3 output_ = mix(a, b, s);"), "{text}");
    assert!(text.contains("vec4(output_, 1.0)"), "{text}");
}

#[test]
fn mappings_point_back_at_fragment_source() {
    let source = pixel_fragment(
        r#"
            var mask = this.Normal < Real3(0.5);
            this.Target0 = Real4(1.0);
            "#,
    );
    let output = compile(&source, &["A", "B"]);
    let pixel = translated(&output, ShaderStage::Pixel);
    let at = pixel.text.find("lessThan(").expect("comparison");

    let mapping = find_mapping(&pixel.mappings, at).expect("mapping");
    assert_eq!(&*mapping.origin, "test");
    let expected = source.find("this.Normal < Real3(0.5)").unwrap();
    assert_eq!(mapping.source.offset as usize, expected);
    assert!(mapping.dest.contains(&at));
}

#[test]
fn statics_become_initialized_globals() {
    let source = format!(
        "struct Counter {{ [Static] var Total : Integer = 2; }}\n{}",
        pixel_fragment("this.Target0 = Real4(Real(Counter.Total));")
    );
    let output = compile(&source, &["A", "B"]);
    let pixel = translated(&output, ShaderStage::Pixel);
    assert!(pixel.errors.is_empty(), "{:?}", pixel.errors);
    let text = &pixel.text;
    assert!(text.contains("int Counter_Total;"), "{text}");
    assert!(text.contains("Counter_Total = 2;"), "{text}");
    assert!(text.contains("vec4(float(Counter_Total))"), "{text}");
}

#[test]
fn untranslatable_constructs_are_reported_per_statement() {
    let output = compile(
        &pixel_fragment(
            r#"
            var values = FixedArray[Real, 2]();
            values[1] *= 2.0;
            foreach (var v in values) { }
            this.Target0 = Real4(1.0);
            "#,
        ),
        &["A", "B"],
    );
    let pixel = translated(&output, ShaderStage::Pixel);
    assert!(
        pixel
            .errors
            .iter()
            .any(|e| matches!(e.error, CompileError::CompoundIndexedAssignment { .. }))
    );
    assert!(pixel.errors.iter().any(|e| matches!(
        &e.error,
        CompileError::Untranslatable { construct, .. } if construct == "foreach"
    )));
    // Later statements still translate
    assert!(pixel.text.contains("self.Target0 = vec4(1.0);"), "{}", pixel.text);
}

#[test]
fn bad_condition_still_translates_its_body() {
    let output = compile(
        &pixel_fragment(
            r#"
            var values = FixedArray[Real, 2]();
            if (1.0) { foreach (var v in values) { } }
            while (2.0) { foreach (var w in values) { } }
            this.Target0 = Real4(1.0);
            "#,
        ),
        &["A", "B"],
    );
    let pixel = translated(&output, ShaderStage::Pixel);
    let mismatches = pixel
        .errors
        .iter()
        .filter(|e| matches!(e.error, CompileError::TypeMismatch { .. }))
        .count();
    let foreach = pixel
        .errors
        .iter()
        .filter(|e| matches!(&e.error, CompileError::Untranslatable { construct, .. } if construct == "foreach"))
        .count();
    assert_eq!(mismatches, 2, "{:?}", pixel.errors);
    assert_eq!(foreach, 2, "{:?}", pixel.errors);
    assert!(pixel.text.contains("if (false)"), "{}", pixel.text);
    assert!(pixel.text.contains("while (false)"), "{}", pixel.text);
}
