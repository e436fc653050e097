mod test_harness;

use shaderweave::passes::{BindingRenamePass, DeadResourceElimination};
use shaderweave::prelude::*;
use shaderweave::{InputError, PassError, PassInput, PassOutput, ProjectError, TranslationPass};
use test_harness::{CollectingSink, FragmentHarness, assert_clean};

// ============================================================================
// Project flow
// ============================================================================

#[test]
fn test_standard_project_compiles() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();

    let summary = project.compile(&PipelineDescriptor::default());
    assert_clean(&summary.diagnostics);
    assert_eq!(summary.compiled, ["Lit", "Tinted"]);

    let lit = project.find_shader("Lit").unwrap();
    assert!(lit.is_complete());
    let pixel = lit.artifact(ShaderStage::Pixel).unwrap();
    assert_eq!(pixel.fragments, ["B"]);
    assert!(!pixel.binary.is_empty());
    assert!(pixel.backend_text.is_some());
    assert!(pixel.translated_text.contains("out vec4 Target0;"), "{}", pixel.translated_text);
    assert_eq!(pixel.passes.first().map(String::as_str), Some("emit"));

    let vertex = lit.artifact(ShaderStage::Vertex).unwrap();
    assert_eq!(vertex.fragments, ["A"]);
}

#[test]
fn test_duplicate_and_missing_sources() {
    let harness = FragmentHarness::new();
    let mut project = harness.project(&["vertex.frag"]);

    let err = project.add_source("vertex.frag", "").unwrap_err();
    assert!(matches!(err, ProjectError::DuplicateSource(ref o) if o == "vertex.frag"));

    let err = project.update_source("missing.frag", "").unwrap_err();
    assert!(matches!(err, ProjectError::SourceNotFound(_)));

    project.remove_source("vertex.frag").unwrap();
    assert_eq!(project.source_count(), 0);
    assert!(project.remove_shader("Nope").is_err());
}

#[test]
fn test_redefining_a_shader_replaces_it() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();

    let previous = project.define_shader(ShaderDefinition::new("Lit", ["A", "C"]));
    assert_eq!(previous.map(|d| d.fragments), Some(vec!["A".to_string(), "B".to_string()]));
    assert_eq!(project.definitions().len(), 2);
}

#[test]
fn test_library_diagnostics_name_their_unit() {
    let harness = FragmentHarness::new();
    let mut project = harness.project(&["vertex.frag", "broken.frag"]);

    let diagnostics = project.compile_library();
    assert!(diagnostics.has_errors());
    assert!(diagnostics.iter().all(|d| &*d.origin == "broken.frag"));
    assert_eq!(diagnostics.for_origin("vertex.frag").count(), 0);
}

#[test]
fn test_unknown_fragment_fails_the_shader() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    project.define_shader(ShaderDefinition::new("Broken", ["A", "Nope"]));

    let summary = project.compile(&PipelineDescriptor::default());
    assert!(summary.diagnostics.has_errors());

    let broken = project.find_shader("Broken").unwrap();
    assert!(!broken.is_complete());
    assert!(broken.artifacts().next().is_none());
    assert!(broken.all_diagnostics().any(|d| d.short_message.contains("Nope")));

    // Other shaders are unaffected
    assert!(project.find_shader("Lit").unwrap().is_complete());
}

#[test]
fn test_composition_errors_are_reported_once() {
    let harness = FragmentHarness::new();
    let mut project = harness.project(&["vertex.frag"]);
    project
        .add_source(
            "fog.frag",
            r#"
            [Pixel]
            struct Fogged {
                [StageInput] var FogDepth : Real;
                [Output] var Target0 : Real4;
                function Main() { this.Target0 = Real4(this.FogDepth, 0.0, 0.0, 1.0); }
            }
            "#,
        )
        .unwrap();
    project.define_shader(ShaderDefinition::new("Fogged", ["A", "Fogged"]));

    let summary = project.compile(&PipelineDescriptor::default());
    assert_eq!(summary.diagnostics.error_count(), 1, "{}", summary.diagnostics);

    let fogged = project.find_shader("Fogged").unwrap();
    assert_eq!(fogged.diagnostics.error_count(), 1);
    assert_eq!(fogged.all_diagnostics().count(), 1);
    assert_eq!(fogged.failures().count(), 2);
    assert!(fogged.failures().all(|f| f.diagnostics.is_empty()));
}

#[test]
fn test_diagnostics_are_forwarded_to_sink() {
    let harness = FragmentHarness::new();
    let mut project = harness.project(&["broken.frag"]);
    let sink = CollectingSink::default();
    sink.install(&mut project);

    project.compile_library();
    assert!(sink.count() > 0);
}

// ============================================================================
// Properties and inputs
// ============================================================================

#[test]
fn test_find_property() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    assert_clean(&project.compile(&PipelineDescriptor::default()).diagnostics);

    let (buffer, member) = project
        .find_property("Tinted", ShaderStage::Pixel, "C", "Tint")
        .expect("Tint property");
    assert_eq!(member.size, 16);
    assert_eq!(member.offset % 16, 0);
    assert!(buffer.size >= member.offset + member.size);

    assert!(project.find_property("Tinted", ShaderStage::Vertex, "C", "Tint").is_none());
    assert!(project.find_property("Lit", ShaderStage::Pixel, "C", "Tint").is_none());
    assert!(project.find_property("Nope", ShaderStage::Pixel, "C", "Tint").is_none());
}

#[test]
fn test_find_property_after_rename() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    let pipeline = PipelineDescriptor::default()
        .with_pass(DeadResourceElimination)
        .with_pass(BindingRenamePass::new("renamed_"));
    assert_clean(&project.compile(&pipeline).diagnostics);

    let plain = {
        let mut plain = harness.standard_project();
        plain.compile(&PipelineDescriptor::default());
        plain
            .find_property("Tinted", ShaderStage::Pixel, "C", "Tint")
            .map(|(_, m)| (m.offset, m.size))
    };
    let renamed = project
        .find_property("Tinted", ShaderStage::Pixel, "C", "Tint")
        .map(|(_, m)| (m.offset, m.size));
    assert!(renamed.is_some());
    assert_eq!(renamed, plain);
}

#[test]
fn test_shader_inputs() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    assert_clean(&project.compile(&PipelineDescriptor::default()).diagnostics);

    let (buffer, member) = project
        .find_property("Tinted", ShaderStage::Pixel, "C", "Tint")
        .unwrap();
    let offset = member.offset as usize;
    let buffer = buffer.name.clone();

    let mut inputs = project.shader_inputs("Tinted").unwrap();
    assert_eq!(inputs.set("C", "Tint", [1.0f32, 0.5, 0.25, 1.0]), Ok(1));

    let block = inputs
        .stage_blocks(ShaderStage::Pixel)
        .find(|b| b.buffer == buffer)
        .unwrap();
    assert_eq!(&block.bytes[offset..offset + 4], &1.0f32.to_le_bytes());
    assert_eq!(&block.bytes[offset + 8..offset + 12], &0.25f32.to_le_bytes());

    assert_eq!(
        inputs.set("C", "Missing", 1.0f32),
        Err(InputError::NotPresent {
            fragment: "C".into(),
            property: "Missing".into(),
        })
    );
    assert!(matches!(
        inputs.set("C", "Tint", 1.0f32),
        Err(InputError::SizeMismatch { expected: 16, found: 4, .. })
    ));
    assert!(project.shader_inputs("Nope").is_none());
}

// ============================================================================
// Recompilation
// ============================================================================

#[test]
fn test_update_source_reports_changes() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    let text = harness.read("tint.frag");
    let before = project.source_hash("tint.frag").unwrap();

    assert!(!project.update_source("tint.frag", &text).unwrap());
    assert!(project.update_source("tint.frag", format!("{text}\n// edited\n")).unwrap());
    assert_ne!(project.source_hash("tint.frag").unwrap(), before);
}

#[test]
fn test_recompile_stale_only_touches_changed_shaders() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    assert!(project.is_stale("Lit"));
    assert_clean(&project.compile(&PipelineDescriptor::default()).diagnostics);
    assert!(!project.is_stale("Lit"));
    assert!(!project.is_stale("Tinted"));

    let edited = format!("{}\n// edited\n", harness.read("tint.frag"));
    assert!(project.update_source("tint.frag", edited).unwrap());
    assert!(!project.is_stale("Lit"));
    assert!(project.is_stale("Tinted"));

    let summary = project.recompile_stale(&PipelineDescriptor::default());
    assert_clean(&summary.diagnostics);
    assert_eq!(summary.compiled, ["Tinted"]);
    assert!(!project.is_stale("Tinted"));

    assert!(project.recompile_stale(&PipelineDescriptor::default()).compiled.is_empty());
}

#[test]
fn test_missing_fragment_supplied_later_marks_shader_stale() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    project.define_shader(ShaderDefinition::new("Plain", ["A", "D"]));

    project.compile(&PipelineDescriptor::default());
    assert!(!project.find_shader("Plain").unwrap().is_complete());
    assert!(!project.is_stale("Plain"));

    project
        .add_source(
            "plain.frag",
            r#"
            [Pixel]
            struct D {
                [Output] var Target0 : Real4;
                function Main() { this.Target0 = Real4(1.0, 1.0, 1.0, 1.0); }
            }
            "#,
        )
        .unwrap();
    assert!(project.is_stale("Plain"));
    assert!(!project.is_stale("Lit"));

    let summary = project.recompile_stale(&PipelineDescriptor::default());
    assert_clean(&summary.diagnostics);
    assert_eq!(summary.compiled, ["Plain"]);
    assert!(project.find_shader("Plain").unwrap().is_complete());
    assert!(!project.is_stale("Plain"));
}

#[test]
fn test_redefined_shader_is_stale() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();
    assert_clean(&project.compile(&PipelineDescriptor::default()).diagnostics);

    project.define_shader(ShaderDefinition::new("Lit", ["A", "C"]));
    assert!(project.is_stale("Lit"));
    assert!(!project.is_stale("Tinted"));

    let summary = project.recompile_stale(&PipelineDescriptor::default());
    assert_clean(&summary.diagnostics);
    assert_eq!(summary.compiled, ["Lit"]);
    let pixel = project.find_shader("Lit").unwrap().artifact(ShaderStage::Pixel).unwrap();
    assert_eq!(pixel.fragments, ["C"]);
}

#[test]
fn test_compiles_are_reproducible() {
    let harness = FragmentHarness::new();
    let pipeline = PipelineDescriptor::default();
    let mut first = harness.standard_project();
    let mut second = harness.standard_project();
    assert_clean(&first.compile(&pipeline).diagnostics);
    assert_clean(&second.compile(&pipeline).diagnostics);

    let snapshot = |project: &ShaderProject| {
        ["Lit", "Tinted"]
            .iter()
            .flat_map(|name| project.find_shader(name).unwrap().artifacts())
            .map(|a| {
                (
                    a.stage,
                    a.composite_text.clone(),
                    a.translated_text.clone(),
                    a.binary.clone(),
                    a.backend_text.clone(),
                    a.reflection.clone(),
                )
            })
            .collect::<Vec<_>>()
    };
    let expected = snapshot(&first);
    assert_eq!(expected.len(), 4);
    assert_eq!(snapshot(&second), expected);

    // Recompiling in place yields the same bytes
    first.compile(&pipeline);
    assert_eq!(snapshot(&first), expected);
}

#[test]
fn test_compile_async() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();

    let ticket = project.compile_async(&PipelineDescriptor::default()).unwrap();
    let batch = ticket.wait().unwrap();
    assert_eq!(batch.shaders.len(), 2);
    assert!(project.find_shader("Lit").is_none());

    let summary = project.install(batch);
    assert_clean(&summary.diagnostics);
    assert!(project.find_shader("Lit").unwrap().is_complete());
    assert!(project.find_shader("Tinted").unwrap().is_complete());
}

// ============================================================================
// Pass failures
// ============================================================================

/// Fails every pixel stage
struct RejectPixel;

impl TranslationPass for RejectPixel {
    fn name(&self) -> &str {
        "reject-pixel"
    }

    fn run(&self, input: &PassInput<'_>) -> Result<PassOutput, PassError> {
        if input.reflection.stage == Some(ShaderStage::Pixel) {
            return Err(PassError::Failed {
                pass: self.name().to_string(),
                message: "pixel stages are rejected".into(),
            });
        }
        Ok(PassOutput::passthrough(self.name(), input))
    }
}

#[test]
fn test_pass_failure_is_isolated_to_its_stage() {
    let harness = FragmentHarness::new();
    let mut project = harness.standard_project();

    let summary = project.compile(&PipelineDescriptor::default().with_pass(RejectPixel));
    assert!(summary.diagnostics.has_errors());

    let lit = project.find_shader("Lit").unwrap();
    assert!(!lit.is_complete());
    assert!(lit.artifact(ShaderStage::Vertex).is_some());

    let failure = lit.failures().next().unwrap();
    assert_eq!(failure.stage, ShaderStage::Pixel);
    assert!(!failure.composite_text.is_empty());
    assert!(
        failure
            .diagnostics
            .iter()
            .any(|d| d.short_message.contains("pixel stages are rejected"))
    );
}
