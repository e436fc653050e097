//! Errors raised by the project facade.
//!
//! Compile failures are not errors here: they are reported as
//! [`Diagnostics`](shaderweave_core::Diagnostics) on the artifacts. These
//! errors cover misuse of the project itself.

use thiserror::Error;

/// Errors managing sources or waiting on a compile.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// A source unit with this origin was already added.
    #[error("source '{0}' was already added; use update_source to change it")]
    DuplicateSource(String),

    /// No source unit with this origin exists.
    #[error("source '{0}' not found in project")]
    SourceNotFound(String),

    /// No shader with this name was defined.
    #[error("shader '{0}' is not defined")]
    ShaderNotDefined(String),

    /// The background compile thread could not be started.
    #[error("failed to start compile thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The background compile ended without sending a result.
    #[error("compile thread exited without a result")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, ProjectError>;
