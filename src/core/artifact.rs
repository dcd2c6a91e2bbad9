//! Build result classification.
//!
//! Raw build values are JSON produced by the component runtime. Helper
//! wrappers (`Data`, `Message`, generators) are tagged with [`TYPE_MARKER`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key tagging helper-wrapped values in raw build output.
pub const TYPE_MARKER: &str = "__xflow_type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    StructuredRecord,
    Object,
    Array,
    Stream,
    Message,
    Unknown,
}

/// Classify a raw build value by structural inspection.
pub fn classify(value: &Value) -> ArtifactKind {
    match value {
        Value::String(_) => ArtifactKind::Text,
        Value::Array(_) => ArtifactKind::Array,
        Value::Object(map) => match map.get(TYPE_MARKER).and_then(Value::as_str) {
            Some("data") => ArtifactKind::StructuredRecord,
            Some("message") => ArtifactKind::Message,
            Some("stream") => ArtifactKind::Stream,
            _ => ArtifactKind::Object,
        },
        _ => ArtifactKind::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum StreamState {
    Pending(VecDeque<Value>),
    Consumed,
}

/// A finite, non-replayable chunk sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamArtifact {
    state: StreamState,
}

impl StreamArtifact {
    pub fn new(chunks: impl IntoIterator<Item = Value>) -> Self {
        Self {
            state: StreamState::Pending(chunks.into_iter().collect()),
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self.state, StreamState::Consumed)
    }

    /// Take the chunks. Returns `None` on every call after the first.
    pub fn consume(&mut self) -> Option<Vec<Value>> {
        match std::mem::replace(&mut self.state, StreamState::Consumed) {
            StreamState::Pending(chunks) => Some(chunks.into_iter().collect()),
            StreamState::Consumed => None,
        }
    }
}

/// Materialized content of a consumed stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedStream {
    pub chunks: Vec<Value>,
    /// String chunks joined, otherwise the chunk array.
    pub value: Value,
}

/// Typed wrapper around one output's raw build value.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub raw: Value,
    #[serde(skip)]
    stream: Option<StreamArtifact>,
}

impl Artifact {
    pub fn from_raw(raw: Value) -> Self {
        let kind = classify(&raw);
        if kind == ArtifactKind::Stream {
            let chunks = raw
                .get("chunks")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return Self {
                kind,
                raw: Value::Null,
                stream: Some(StreamArtifact::new(chunks)),
            };
        }
        Self {
            kind,
            raw,
            stream: None,
        }
    }

    /// Whether a stream is still waiting to be consumed.
    pub fn has_pending_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.is_consumed())
    }

    /// Consume a pending stream. The raw value becomes the empty string.
    pub fn materialize(&mut self) -> Option<MaterializedStream> {
        let chunks = self.stream.as_mut()?.consume()?;
        self.raw = Value::String(String::new());
        let value = if chunks.iter().all(Value::is_string) {
            Value::String(chunks.iter().filter_map(Value::as_str).collect())
        } else {
            Value::Array(chunks.clone())
        };
        Some(MaterializedStream { chunks, value })
    }
}

/// Unwrap helper tagging for downstream consumers: `Data` yields its record,
/// `Message` its text, other values pass through.
pub fn plain_value(raw: &Value) -> Value {
    match classify(raw) {
        ArtifactKind::StructuredRecord => raw.get("data").cloned().unwrap_or(Value::Null),
        ArtifactKind::Message => raw.get("text").cloned().unwrap_or(Value::Null),
        _ => raw.clone(),
    }
}
