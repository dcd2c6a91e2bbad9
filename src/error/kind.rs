use std::fmt;

use serde::{Deserialize, Serialize};

/// Error kind tag attached to every reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Structurally invalid graph: edgeless, cyclic, dangling endpoint.
    GraphIntegrity,
    /// Ambiguous or conflicting tweak keys.
    TweakResolution,
    /// The sandbox denied an operation, module or reflective attribute.
    SecurityViolation,
    /// Component source failed to parse.
    Compilation,
    /// Component-authored logic raised.
    ComponentBuild,
    /// Secret/variable lookup failed with no viable fallback.
    ResourceResolution,
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::GraphIntegrity => "graph_integrity",
            ErrorKind::TweakResolution => "tweak_resolution",
            ErrorKind::SecurityViolation => "security_violation",
            ErrorKind::Compilation => "compilation",
            ErrorKind::ComponentBuild => "component_build",
            ErrorKind::ResourceResolution => "resource_resolution",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Internal => "internal",
        }
    }

    /// Kinds raised before any vertex is built.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            ErrorKind::GraphIntegrity | ErrorKind::TweakResolution | ErrorKind::Configuration
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
