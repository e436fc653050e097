//! Performance benchmarks for the fragment parser.
//!
//! - Fixture files from `test_fragments/`
//! - Generated sources from 10 to 1000 fragment types

use bumpalo::Bump;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use shaderweave_parser::Parser;
use std::hint::black_box;

/// A source with `count` pixel fragments, each with a property, a helper
/// function and a loop.
fn generated_source(count: usize) -> String {
    let mut source = String::new();
    for i in 0..count {
        source.push_str(&format!(
            r#"
[Pixel]
struct Fragment{i} {{
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
        var w = this.Weight({i}.0);
        this.Target0 = Real4(w, w * 0.5, 0.0, 1.0);
    }}
}}
"#
        ));
    }
    source
}

fn fixture_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser/fixtures");

    let fixtures = [
        ("vertex", include_str!("../test_fragments/vertex.frag")),
        ("lit", include_str!("../test_fragments/lit.frag")),
        ("tint", include_str!("../test_fragments/tint.frag")),
    ];
    for (name, source) in fixtures {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let arena = Bump::new();
                let script = Parser::parse(black_box(source), &arena).ok();
                black_box(script.map(|s| s.types().len()))
            });
        });
    }

    group.finish();
}

fn generated_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser/generated");

    for count in [10, 100, 1000] {
        let source = generated_source(count);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(format!("{count}_fragments"), |b| {
            b.iter(|| {
                let arena = Bump::new();
                let script = Parser::parse(black_box(&source), &arena).ok();
                black_box(script.map(|s| s.types().len()))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, fixture_benchmarks, generated_benchmarks);
criterion_main!(benches);
