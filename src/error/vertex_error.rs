use thiserror::Error;
use xflow_types::SandboxError;

use super::ErrorKind;

/// Vertex-level errors
#[derive(Debug, Clone, Error)]
pub enum VertexError {
    #[error("Security violation: {0}")]
    SecurityViolation(String),
    #[error("Compilation error: {0}")]
    Compilation(String),
    #[error("Component build error: {0}")]
    ComponentBuild(String),
    #[error("Resource resolution failed for field '{field}' (variable '{variable}'): {reason}")]
    ResourceResolution {
        field: String,
        variable: String,
        reason: String,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VertexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VertexError::SecurityViolation(_) => ErrorKind::SecurityViolation,
            VertexError::Compilation(_) => ErrorKind::Compilation,
            VertexError::ComponentBuild(_) => ErrorKind::ComponentBuild,
            VertexError::ResourceResolution { .. } => ErrorKind::ResourceResolution,
            VertexError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<SandboxError> for VertexError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::StructuralViolation(_) | SandboxError::SecurityViolation(_) => {
                VertexError::SecurityViolation(e.to_string())
            }
            SandboxError::CompilationError(_)
            | SandboxError::CodeTooLarge { .. }
            | SandboxError::UnsupportedLanguage(_) => VertexError::Compilation(e.to_string()),
            SandboxError::ComponentError(_)
            | SandboxError::InvalidComponent(_)
            | SandboxError::OutputTooLarge { .. }
            | SandboxError::SerializationError(_) => VertexError::ComponentBuild(e.to_string()),
            SandboxError::InternalError(_) => VertexError::Internal(e.to_string()),
        }
    }
}
