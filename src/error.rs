//! Error taxonomy shared by every part of the engine.
//!
//! Library operations return [`Result`]; the application boundary
//! ([`crate::engine::Engine::open`]) folds these into `anyhow::Error`.

use std::path::PathBuf;

use crate::resources::ResourceKind;

/// Shader pipeline stage, used to report which half of a program failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A registry lookup did not find the requested name.
    #[error("resource {name} not found")]
    NotFound { name: String },

    /// A registry lookup found the name, but it holds another kind of resource.
    #[error("resource {name} is a {found}, not a {expected}")]
    TypeMismatch {
        name: String,
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// The device rejected a shader stage. `log` is the device diagnostic.
    #[error("failed to compile {stage} shader:\n{log}")]
    CompileFailure { stage: ShaderStage, log: String },

    /// The device could not combine the stages into a program.
    #[error("failed to link shader program:\n{log}")]
    LinkFailure { log: String },

    /// A file is missing, unreadable or in a format the loader does not know.
    #[error("could not load {}: {reason}", path.display())]
    LoadFailure { path: PathBuf, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend failed in a way unrelated to shader sources.
    #[error("graphics device error: {0}")]
    Device(String),
}

impl Error {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::LoadFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
