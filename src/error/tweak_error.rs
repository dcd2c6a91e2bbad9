use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Two or more tweak keys writing different values to one `(vertex, field)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TweakConflict {
    pub vertex_id: String,
    pub field: String,
    /// `(tweak key, value)` in key order.
    pub assignments: Vec<(String, Value)>,
}

impl TweakConflict {
    pub fn keys(&self) -> Vec<&str> {
        self.assignments.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// Tweak resolution errors. Raised before any parameter is written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TweakResolutionError {
    #[error("Conflicting tweaks: {}", describe_conflicts(.conflicts))]
    Conflicting { conflicts: Vec<TweakConflict> },
    #[error("Ambiguous tweak key '{key}' matches vertices: {}", .candidates.join(", "))]
    Ambiguous { key: String, candidates: Vec<String> },
    #[error("Tweak for '{key}' must be an object of field overrides")]
    NotAnObject { key: String },
    #[error("Input conflict on vertex '{vertex_id}': both the run input and tweak key '{key}' set input_value")]
    InputConflict { vertex_id: String, key: String },
}

impl TweakResolutionError {
    /// Every tweak key implicated in the failure.
    pub fn keys(&self) -> Vec<String> {
        match self {
            TweakResolutionError::Conflicting { conflicts } => {
                let mut keys: Vec<String> = conflicts
                    .iter()
                    .flat_map(|c| c.keys().into_iter().map(str::to_string))
                    .collect();
                keys.sort();
                keys.dedup();
                keys
            }
            TweakResolutionError::Ambiguous { key, .. }
            | TweakResolutionError::NotAnObject { key }
            | TweakResolutionError::InputConflict { key, .. } => vec![key.clone()],
        }
    }
}

fn describe_conflicts(conflicts: &[TweakConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{}.{} <- [{}]", c.vertex_id, c.field, c.keys().join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
