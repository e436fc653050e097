use std::sync::Arc;

use bumpalo::Bump;
use shaderweave_core::CompileError;
use shaderweave_ir::eval::{BasicIntrinsics, EvalError, Evaluator, IntrinsicHandler, Value};
use shaderweave_ir::{IrModule, ShaderStage, verify_module};
use shaderweave_parser::Parser;

use crate::compositor::ShaderDefinition;
use crate::context::CompilerContext;
use crate::library::FragmentLibrary;
use crate::passes::{CollectorPass, ValidationPass};
use crate::{ShaderCompiler, ShaderOutput};

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

fn pixel_module(output: &ShaderOutput) -> &IrModule {
    stage_module(output, ShaderStage::Pixel)
}

fn stage_module(output: &ShaderOutput, stage: ShaderStage) -> &IrModule {
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    let compiled = output.stage(stage).expect("stage");
    let errors: Vec<_> = compiled.all_errors().collect();
    assert!(errors.is_empty(), "{errors:?}");
    let module = &compiled.lowered.module;
    if let Err(errors) = verify_module(module) {
        panic!("invalid module: {errors:?}");
    }
    module
}

fn floats(value: Option<&Value>) -> Vec<f32> {
    value.and_then(Value::as_floats).expect("float vector")
}

const VERTEX: &str = r#"
    [Vertex]
    struct A {
        [Output] var Normal : Real3;
        function Main() { this.Normal = Real3(0.0, 1.0, 0.0); }
    }
"#;

fn with_vertex(pixel: &str) -> String {
    format!("{VERTEX}\n{pixel}")
}

#[test]
fn pixel_stage_copies_input_to_output() {
    let source = with_vertex(
        r#"
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() { this.Target0 = Real4(this.Normal, 1.0); }
        }
        "#,
    );
    let output = compile(&source, &["A", "B"]);
    let module = pixel_module(&output);

    let mut eval = Evaluator::new(module, BasicIntrinsics);
    eval.set_global("in_Normal", Value::vector(&[0.5, 0.25, 1.0])).unwrap();
    eval.run_entry().unwrap();
    assert_eq!(floats(eval.global("Target0")), vec![0.5, 0.25, 1.0, 1.0]);
}

#[test]
fn loops_statics_and_swizzle_assignment() {
    let source = with_vertex(
        r#"
        struct Counter {
            [Static] var Total : Integer = 2;
        }
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() {
                var sum = 0.0;
                for (var i = 0; i < 4; ++i) {
                    if (i == 2) { continue; }
                    sum += 1.0;
                }
                var n = 0;
                while (true) {
                    n += 1;
                    if (n >= Counter.Total) { break; }
                }
                var k = 0;
                do { k++; } while (k < 5);
                var color = Real4(0.0);
                color.xy = Real2(sum, Real(n));
                color.z = Real(k);
                color.w = 1.0;
                this.Target0 = color;
            }
        }
        "#,
    );
    let output = compile(&source, &["A", "B"]);
    let module = pixel_module(&output);

    let mut eval = Evaluator::new(module, BasicIntrinsics);
    eval.run_entry().unwrap();
    assert_eq!(floats(eval.global("Target0")), vec![3.0, 2.0, 5.0, 1.0]);
    assert_eq!(eval.global("Counter_Total"), Some(&Value::Int(2)));
}

#[test]
fn short_circuit_skips_right_operand() {
    let source = with_vertex(
        r#"
        struct Tracker {
            [Static] var Calls : Integer = 0;
            [Static] function Touch() : Boolean {
                Tracker.Calls += 1;
                return true;
            }
        }
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() {
                var a = false && Tracker.Touch();
                var b = true || Tracker.Touch();
                var c = true && Tracker.Touch();
                var hits = 0.0;
                if (a) { hits += 1.0; }
                if (b) { hits += 10.0; }
                if (c) { hits += 100.0; }
                this.Target0 = Real4(hits, Real(Tracker.Calls), 0.0, 1.0);
            }
        }
        "#,
    );
    let output = compile(&source, &["A", "B"]);
    let module = pixel_module(&output);

    let mut eval = Evaluator::new(module, BasicIntrinsics);
    eval.run_entry().unwrap();
    assert_eq!(floats(eval.global("Target0")), vec![110.0, 1.0, 0.0, 1.0]);
    assert_eq!(eval.global("Tracker_Calls"), Some(&Value::Int(1)));
}

#[test]
fn reference_parameters_write_back() {
    let source = with_vertex(
        r#"
        struct Math2 {
            [Static] function Double(value : ref Real) { value = value * 2.0; }
        }
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            var Scale : Real = 1.5;
            function Main() {
                Math2.Double(this.Scale);
                var local = 4.0;
                Math2.Double(local);
                this.Target0 = Real4(this.Scale, local, this.Normal.y, 1.0);
            }
        }
        "#,
    );
    let output = compile(&source, &["A", "B"]);
    let module = pixel_module(&output);

    let mut eval = Evaluator::new(module, BasicIntrinsics);
    eval.set_global("in_Normal", Value::vector(&[0.0, 7.0, 0.0])).unwrap();
    eval.run_entry().unwrap();
    assert_eq!(floats(eval.global("Target0")), vec![3.0, 8.0, 7.0, 1.0]);
}

#[test]
fn untranslatable_statements_are_reported() {
    let source = with_vertex(
        r#"
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() {
                var values = FixedArray[Real, 2]();
                values[0] += 1.0;
                foreach (var v in values) { }
                this.Target0 = Real4(1.0);
            }
        }
        "#,
    );
    let output = compile(&source, &["A", "B"]);
    let pixel = output.stage(ShaderStage::Pixel).unwrap();
    let errors = &pixel.lowered.errors;
    assert!(
        errors
            .iter()
            .any(|e| matches!(e.error, CompileError::CompoundIndexedAssignment { .. }))
    );
    assert!(
        errors
            .iter()
            .any(|e| matches!(e.error, CompileError::Untranslatable { .. }))
    );
}

#[test]
fn bad_condition_still_lowers_its_body() {
    let source = with_vertex(
        r#"
        [Pixel]
        struct B {
            [StageInput] var Normal : Real3;
            [Output] var Target0 : Real4;
            function Main() {
                var values = FixedArray[Real, 2]();
                if (1.0) { foreach (var v in values) { } }
                do { foreach (var w in values) { } } while (2.0);
                this.Target0 = Real4(1.0);
            }
        }
        "#,
    );
    let output = compile(&source, &["A", "B"]);
    let pixel = output.stage(ShaderStage::Pixel).unwrap();
    let errors = &pixel.lowered.errors;
    let mismatches = errors
        .iter()
        .filter(|e| matches!(e.error, CompileError::TypeMismatch { .. }))
        .count();
    let untranslatable = errors
        .iter()
        .filter(|e| matches!(e.error, CompileError::Untranslatable { .. }))
        .count();
    assert_eq!(mismatches, 2, "{errors:?}");
    assert_eq!(untranslatable, 2, "{errors:?}");
}

/// Counts emitted geometry vertices.
#[derive(Default)]
struct EmitCounter {
    emitted: usize,
}

impl IntrinsicHandler for EmitCounter {
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
        match name {
            "EmitVertex" => {
                self.emitted += 1;
                Ok(None)
            }
            _ => BasicIntrinsics.call(name, args),
        }
    }
}

/// Interface global carrying `field` into or out of a stage.
fn interface_global(output: &ShaderOutput, stage: ShaderStage, field: &str, input: bool) -> String {
    let interface = &output.stage(stage).expect("stage").interface;
    let entries = if input { &interface.inputs } else { &interface.outputs };
    entries
        .iter()
        .find(|e| e.name == field)
        .and_then(|e| e.global.clone())
        .unwrap_or_else(|| panic!("no {field} global on {stage:?}"))
}

#[test]
fn geometry_passes_values_from_vertex_to_pixel() {
    let source = r#"
        [Vertex]
        struct V {
            [Output] var Position : Real4;
            [Output] var Uv : Real2;
            function Main() {
                this.Position = Real4(1.0, 2.0, 3.0, 1.0);
                this.Uv = Real2(0.25, 0.75);
            }
        }
        struct GeoIn { var Position : Real4; }
        struct GeoOut { var PerspectivePosition : Real4; }
        [Geometry(maxVertices : 3)]
        struct G {
            function Main(input : TriangleInput[GeoIn], output : TriangleOutput[GeoOut]) {
                for (var i = 0; i < 3; ++i) {
                    var vertex = GeoOut();
                    vertex.PerspectivePosition = input[i].Position;
                    output.Append(vertex, i);
                }
            }
        }
        [Pixel]
        struct P {
            [StageInput] var Uv : Real2;
            [Output] var Target0 : Real4;
            function Main() { this.Target0 = Real4(this.Uv, 0.0, 1.0); }
        }
    "#;
    let output = compile(source, &["V", "G", "P"]);

    let mut vertex = Evaluator::new(stage_module(&output, ShaderStage::Vertex), BasicIntrinsics);
    vertex.run_entry().unwrap();
    let uv = vertex
        .global(&interface_global(&output, ShaderStage::Vertex, "Uv", false))
        .cloned()
        .expect("vertex Uv");
    assert_eq!(uv.as_floats(), Some(vec![0.25, 0.75]));

    let mut geometry = Evaluator::new(stage_module(&output, ShaderStage::Geometry), EmitCounter::default());
    geometry
        .set_global(
            &interface_global(&output, ShaderStage::Geometry, "Uv", true),
            Value::Composite(vec![uv.clone(), uv.clone(), uv]),
        )
        .unwrap();
    geometry.run_entry().unwrap();
    let passed = geometry
        .global(&interface_global(&output, ShaderStage::Geometry, "Uv", false))
        .cloned()
        .expect("geometry Uv");
    assert_eq!(geometry.handler().emitted, 3);

    let mut pixel = Evaluator::new(pixel_module(&output), BasicIntrinsics);
    pixel
        .set_global(&interface_global(&output, ShaderStage::Pixel, "Uv", true), passed)
        .unwrap();
    pixel.run_entry().unwrap();
    assert_eq!(floats(pixel.global("Target0")), vec![0.25, 0.75, 0.0, 1.0]);
}
