//! Performance benchmarks for project compilation.
//!
//! - Library: parse, collect and validate only
//! - Shaders: full compiles of 1 to 64 shaders through the default pipeline
//! - Recompile: one edited unit out of many
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect per-phase timings:
//!
//! ```bash
//! cargo bench --bench compile_benchmarks --features profile-with-puffin -- --profile-time 5
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use shaderweave::{PipelineDescriptor, ShaderDefinition, ShaderProject};
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

/// Call at the end of each iteration to flush profiling data.
#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    let Some(frame_view) = FRAME_VIEW.get() else {
        return;
    };
    let view = frame_view.lock();
    println!("\n=== puffin: {} frames recorded ===", view.recent_frames().count());
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

const VERTEX: &str = include_str!("../test_fragments/vertex.frag");

/// One unit per pixel fragment, named `fragment{i}.frag`.
fn pixel_unit(i: usize) -> String {
    format!(
        r#"
[Pixel]
struct Fragment{i} {{
    [StageInput] var Normal : Real3;
    [Input] var Scale : Real;
    [Output] var Target0 : Real4;

    function Weight(x : Real) : Real {{
        var total = 0.0;
        for (var j = 0; j < 4; ++j) {{
            total += x * this.Scale;
        }}
        return total;
    }}

    function Main() {{
        var w = this.Weight(this.Normal.y);
        this.Target0 = Real4(this.Normal * w, 1.0);
    }}
}}
"#
    )
}

/// A project with `count` shaders, each the shared vertex fragment plus
/// its own pixel fragment.
fn project(count: usize) -> ShaderProject {
    let mut project = ShaderProject::default();
    project.add_source("vertex.frag", VERTEX).unwrap();
    for i in 0..count {
        project.add_source(format!("fragment{i}.frag"), pixel_unit(i)).unwrap();
        project.define_shader(ShaderDefinition::new(format!("Shader{i}"), ["A".to_string(), format!("Fragment{i}")]));
    }
    project
}

fn library_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("compile/library");

    for count in [1, 16, 64] {
        let mut project = project(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let errors = project.compile_library().error_count();
                end_profiling_frame();
                black_box(errors)
            });
        });
    }

    group.finish();
}

fn shader_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let pipeline = PipelineDescriptor::default();
    let mut group = c.benchmark_group("compile/shaders");

    for count in [1, 16, 64] {
        let mut project = project(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let summary = project.compile(black_box(&pipeline));
                end_profiling_frame();
                black_box(summary.compiled.len())
            });
        });
    }

    group.finish();
    print_profiling_stats();
}

fn recompile_benchmarks(c: &mut Criterion) {
    let pipeline = PipelineDescriptor::default();
    let mut project = project(64);
    project.compile(&pipeline);

    let original = pixel_unit(0);
    let edited = format!("{original}\n// edited\n");
    let mut flip = false;

    c.bench_function("compile/recompile_one_of_64", |b| {
        b.iter(|| {
            flip = !flip;
            let text = if flip { &edited } else { &original };
            project.update_source("fragment0.frag", text).unwrap();
            let summary = project.recompile_stale(black_box(&pipeline));
            end_profiling_frame();
            black_box(summary.compiled.len())
        });
    });
}

criterion_group!(benches, library_benchmarks, shader_benchmarks, recompile_benchmarks);
criterion_main!(benches);
