use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use xflow_types::ComponentDescriptor;

use crate::core::artifact::Artifact;
use crate::dsl::schema::{TemplateField, FILE_FIELD_TYPE, STREAM_FIELD};

/// Component types that receive the run input.
pub const INPUT_COMPONENT_TYPES: &[&str] = &["ChatInput", "TextInput"];

/// Component types that terminate a flow.
pub const OUTPUT_COMPONENT_TYPES: &[&str] = &["ChatOutput", "TextOutput"];

/// Field written by the run input.
pub const INPUT_VALUE_FIELD: &str = "input_value";

/// Kind of input a run carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Chat,
    Text,
    Any,
}

impl InputType {
    pub fn accepts(&self, vertex_input: InputType) -> bool {
        *self == InputType::Any || *self == vertex_input
    }
}

/// Caller-supplied run input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInputs {
    #[serde(default)]
    pub input_value: Option<String>,
    #[serde(default)]
    pub input_type: InputType,
}

impl RunInputs {
    pub fn chat(value: impl Into<String>) -> Self {
        Self {
            input_value: Some(value.into()),
            input_type: InputType::Chat,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            input_value: Some(value.into()),
            input_type: InputType::Text,
        }
    }
}

/// One parameter slot of a vertex.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamField {
    pub field_type: String,
    pub value: Value,
    pub file_path: Option<Value>,
    pub load_from_db: bool,
}

impl ParamField {
    pub fn is_file(&self) -> bool {
        self.field_type == FILE_FIELD_TYPE
    }

    /// The value handed to the component: the file-path slot for file fields.
    pub fn effective_value(&self) -> Value {
        if self.is_file() {
            self.file_path.clone().unwrap_or_else(|| self.value.clone())
        } else {
            self.value.clone()
        }
    }
}

impl From<&TemplateField> for ParamField {
    fn from(field: &TemplateField) -> Self {
        Self {
            field_type: field.field_type.clone(),
            value: field.value.clone(),
            file_path: field.file_path.clone(),
            load_from_db: field.load_from_db,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexState {
    #[default]
    Pending,
    Built,
    Failed,
}

/// One instantiated graph node.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: String,
    pub display_name: String,
    /// User-chosen or system-generated (`Name#N`) alias.
    pub alias: Option<String>,
    pub descriptor: Arc<ComponentDescriptor>,
    pub params: BTreeMap<String, ParamField>,
    pub state: VertexState,
    pub result: Option<VertexBuildResult>,
}

impl Vertex {
    pub fn component_type(&self) -> &str {
        &self.descriptor.type_name
    }

    pub fn input_type(&self) -> Option<InputType> {
        match self.component_type() {
            "ChatInput" => Some(InputType::Chat),
            "TextInput" => Some(InputType::Text),
            _ => None,
        }
    }

    pub fn is_input(&self) -> bool {
        INPUT_COMPONENT_TYPES.contains(&self.component_type())
    }

    pub fn is_output(&self) -> bool {
        OUTPUT_COMPONENT_TYPES.contains(&self.component_type())
    }

    /// Whether the vertex is configured to stream its result.
    pub fn is_streaming(&self) -> bool {
        self.params
            .get(STREAM_FIELD)
            .and_then(|f| f.value.as_bool())
            .unwrap_or(false)
    }

    pub fn is_built(&self) -> bool {
        self.state == VertexState::Built
    }

    pub fn load_from_db_fields(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(_, f)| f.load_from_db)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Parameter values as a JSON object.
    pub fn params_json(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(k, f)| (k.clone(), f.effective_value()))
                .collect::<Map<String, Value>>(),
        )
    }

    pub(crate) fn reset(&mut self) {
        self.state = VertexState::Pending;
        self.result = None;
    }
}

/// Directed dependency: `target` builds after `source` has a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Output of `source` injected into the target; first output when unset.
    pub source_output: Option<String>,
    /// Parameter of `target` receiving the value; ordering only when unset.
    pub target_input: Option<String>,
}

/// One named output of a build.
#[derive(Debug, Clone, Serialize)]
pub struct VertexOutput {
    pub name: String,
    pub value: Value,
    pub artifact: Artifact,
}

/// Result recorded on a vertex after a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct VertexBuildResult {
    pub vertex_id: String,
    pub display_name: String,
    pub outputs: Vec<VertexOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    pub logs: Vec<String>,
    /// Field-level diagnostics such as an absent `load_from_db` value.
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    pub built_at: DateTime<Utc>,
}

impl VertexBuildResult {
    pub fn output(&self, name: &str) -> Option<&VertexOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn primary(&self) -> Option<&VertexOutput> {
        self.outputs.first()
    }

    /// Artifact raw values keyed by output name.
    pub fn raw_outputs(&self) -> Value {
        Value::Object(
            self.outputs
                .iter()
                .map(|o| (o.name.clone(), o.artifact.raw.clone()))
                .collect(),
        )
    }
}
