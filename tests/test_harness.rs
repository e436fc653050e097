//! Test harness for project integration tests
//!
//! Loads fragment sources from `test_fragments/` into a project and checks
//! compile results.

use shaderweave::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Loads fragment files into a project
pub struct FragmentHarness {
    fragments_dir: PathBuf,
}

impl FragmentHarness {
    pub fn new() -> Self {
        let fragments_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_fragments");
        Self { fragments_dir }
    }

    pub fn read(&self, filename: &str) -> String {
        let path = self.fragments_dir.join(filename);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
    }

    /// A project holding the named files, each under its file name
    pub fn project(&self, filenames: &[&str]) -> ShaderProject {
        let mut project = ShaderProject::default();
        for filename in filenames {
            project
                .add_source(filename, self.read(filename))
                .unwrap_or_else(|e| panic!("Failed to add {filename}: {e}"));
        }
        project
    }

    /// The vertex, lit and tint fragments with a shader over each pixel
    /// fragment
    pub fn standard_project(&self) -> ShaderProject {
        let mut project = self.project(&["vertex.frag", "lit.frag", "tint.frag"]);
        project.define_shader(ShaderDefinition::new("Lit", ["A", "B"]));
        project.define_shader(ShaderDefinition::new("Tinted", ["A", "C"]));
        project
    }
}

/// Assert a compile raised no errors, printing them otherwise
pub fn assert_clean(diagnostics: &Diagnostics) {
    if diagnostics.has_errors() {
        panic!("Expected a clean compile, got:\n{diagnostics}");
    }
}

/// Collects forwarded diagnostic messages
#[derive(Clone, Default)]
pub struct CollectingSink {
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn install(&self, project: &mut ShaderProject) {
        let messages = self.messages.clone();
        project.set_diagnostic_sink(move |d: &shaderweave::Diagnostic| {
            messages.lock().unwrap().push(d.short_message.clone());
        });
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}
