//! Flow-level error types.

use serde::Serialize;
use thiserror::Error;

use super::{ErrorKind, TweakResolutionError, VertexError};

/// Flow-level errors
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("Graph integrity error: {0}")]
    GraphIntegrity(String),
    #[error("Tweak resolution error: {0}")]
    TweakResolution(#[from] TweakResolutionError),
    #[error("Vertex build error: vertex={vertex_id}, kind={kind}, error={message}")]
    VertexBuild {
        vertex_id: String,
        kind: ErrorKind,
        message: String,
    },
    #[error("Graph is not prepared")]
    NotPrepared,
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("DSL parse error: {0}")]
    DslParse(String),
    #[error("Vertex not found: {0}")]
    VertexNotFound(String),
    #[error("Max iterations exceeded: {0}")]
    MaxIterationsExceeded(usize),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn vertex_build(vertex_id: impl Into<String>, error: &VertexError) -> Self {
        FlowError::VertexBuild {
            vertex_id: vertex_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::GraphIntegrity(_) | FlowError::MaxIterationsExceeded(_) => {
                ErrorKind::GraphIntegrity
            }
            FlowError::TweakResolution(_) => ErrorKind::TweakResolution,
            FlowError::VertexBuild { kind, .. } => *kind,
            FlowError::NotPrepared
            | FlowError::Configuration(_)
            | FlowError::DslParse(_)
            | FlowError::VertexNotFound(_) => ErrorKind::Configuration,
            FlowError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Originating vertex, for per-vertex failures.
    pub fn vertex_id(&self) -> Option<&str> {
        match self {
            FlowError::VertexBuild { vertex_id, .. } => Some(vertex_id),
            FlowError::VertexNotFound(id) => Some(id),
            _ => None,
        }
    }
}

/// Serializable failure summary for collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_id: Option<String>,
    pub message: String,
}

impl From<&FlowError> for ErrorReport {
    fn from(err: &FlowError) -> Self {
        Self {
            kind: err.kind(),
            vertex_id: err.vertex_id().map(str::to_string),
            message: err.to_string(),
        }
    }
}
