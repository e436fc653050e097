//! Compilation context.
//!
//! The context owns every registry a compile consults: the settings with
//! their attribute names, built-ins and system values, and the resolver
//! registry the translator maps symbols through. It is built once, shared
//! by reference across threads, and never mutated during a compile.

use std::sync::Arc;

use shaderweave_core::CompileError;

use crate::settings::{NameSettings, ShaderSettings};
use crate::translator::ResolverRegistry;

/// A compile error together with the source unit its span points into.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedError {
    pub origin: Arc<str>,
    pub error: CompileError,
}

impl LocatedError {
    pub fn new(origin: &Arc<str>, error: CompileError) -> Self {
        Self {
            origin: origin.clone(),
            error,
        }
    }
}

/// Read-only state shared by every phase of a compile.
#[derive(Debug, Clone)]
pub struct CompilerContext {
    settings: ShaderSettings,
    resolvers: ResolverRegistry,
}

impl CompilerContext {
    /// A context targeting the default GLSL-flavoured resolvers.
    pub fn new(settings: ShaderSettings) -> Self {
        Self {
            settings,
            resolvers: ResolverRegistry::glsl(),
        }
    }

    /// A context with a caller-built resolver registry.
    pub fn with_resolvers(settings: ShaderSettings, resolvers: ResolverRegistry) -> Self {
        Self { settings, resolvers }
    }

    pub fn settings(&self) -> &ShaderSettings {
        &self.settings
    }

    pub fn names(&self) -> &NameSettings {
        &self.settings.names
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    /// Mutable access for registration before the context is shared.
    pub fn resolvers_mut(&mut self) -> &mut ResolverRegistry {
        &mut self.resolvers
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(ShaderSettings::default())
    }
}
