//! Graph construction and representation.
//!
//! A [`Graph`] is built from a stored [`FlowSchema`](crate::dsl::FlowSchema)
//! by [`build_graph`]. It owns its vertices and edges for the duration of one
//! run; derived scheduling state is recomputed by
//! [`Graph::prepare`](crate::scheduler).

pub mod builder;
pub mod traversal;
pub mod types;
pub mod validator;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::core::artifact::plain_value;
use crate::core::config::RuntimeConfig;
use crate::core::event_bus::EventSender;
use crate::core::transactions::TransactionSink;
use crate::error::FlowError;
use crate::scheduler::{RunState, Schedule};

pub use builder::build_graph;
pub use types::*;
pub use validator::{check_integrity, integrity_issues, IntegrityCode, IntegrityIssue};

/// Collaborators and limits used while a graph runs.
#[derive(Clone, Default)]
pub struct RunSettings {
    pub config: RuntimeConfig,
    pub events: Option<EventSender>,
    pub sink: Option<Arc<dyn TransactionSink>>,
}

/// A flow graph: vertices in insertion order plus edges.
pub struct Graph {
    pub(crate) flow_id: String,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) settings: RunSettings,
    pub(crate) state: RunState,
    pub(crate) schedule: Schedule,
}

impl Graph {
    pub fn new(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Self {
        Self {
            flow_id: uuid::Uuid::new_v4().to_string(),
            vertices,
            edges,
            settings: RunSettings::default(),
            state: RunState::Idle,
            schedule: Schedule::default(),
        }
    }

    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = flow_id.into();
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn set_settings(&mut self, settings: RunSettings) {
        self.settings = settings;
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn run_state(&self) -> RunState {
        self.state
    }

    pub fn vertex(&self, id: &str) -> Result<&Vertex, FlowError> {
        self.vertices
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| FlowError::VertexNotFound(id.to_string()))
    }

    pub(crate) fn vertex_index(&self, id: &str) -> Result<usize, FlowError> {
        self.vertices
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| FlowError::VertexNotFound(id.to_string()))
    }

    /// Edge targets of `id`, deduplicated in edge order.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in self.edges.iter().filter(|e| e.source == id) {
            if !out.contains(&e.target.as_str()) {
                out.push(&e.target);
            }
        }
        out
    }

    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in self.edges.iter().filter(|e| e.target == id) {
            if !out.contains(&e.source.as_str()) {
                out.push(&e.source);
            }
        }
        out
    }

    /// Write the run input into every input vertex of a matching type.
    /// Returns the ids of the vertices written.
    pub fn apply_run_inputs(&mut self, inputs: &RunInputs) -> Vec<String> {
        let Some(value) = &inputs.input_value else {
            return Vec::new();
        };
        let mut written = Vec::new();
        for v in self.vertices.iter_mut() {
            let Some(vertex_type) = v.input_type() else {
                continue;
            };
            if !inputs.input_type.accepts(vertex_type) {
                continue;
            }
            v.params
                .entry(INPUT_VALUE_FIELD.to_string())
                .or_insert_with(|| ParamField {
                    field_type: "str".to_string(),
                    ..ParamField::default()
                })
                .value = Value::String(value.clone());
            written.push(v.id.clone());
        }
        written
    }

    /// Values injected into `id` from built upstream vertices, keyed by the
    /// target parameter.
    pub(crate) fn collect_inputs(&self, id: &str) -> BTreeMap<String, Value> {
        let mut inputs = BTreeMap::new();
        for e in self.edges.iter().filter(|e| e.target == id) {
            let Some(param) = &e.target_input else {
                continue;
            };
            let Some(result) = self
                .vertices
                .iter()
                .find(|v| v.id == e.source)
                .and_then(|v| v.result.as_ref())
            else {
                continue;
            };
            let output = match &e.source_output {
                Some(name) => result.output(name),
                None => result.primary(),
            };
            if let Some(output) = output {
                inputs.insert(param.clone(), plain_value(&output.value));
            }
        }
        inputs
    }
}
