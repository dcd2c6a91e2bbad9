//! Stored graph definition: `{nodes: [...], edges: [...]}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xflow_types::OutputSpec;

/// Template field holding the component source text.
pub const CODE_FIELD: &str = "code";

/// Template field marking a vertex as streaming.
pub const STREAM_FIELD: &str = "stream";

/// Field type whose overrides go to the file-path slot.
pub const FILE_FIELD_TYPE: &str = "file";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSchema>,
    #[serde(default)]
    pub edges: Vec<EdgeSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSchema {
    pub id: String,
    pub data: NodeData,
}

impl NodeSchema {
    pub fn component_type(&self) -> &str {
        &self.data.component_type
    }

    /// Declared display name, else the component type.
    pub fn display_name(&self) -> &str {
        self.data
            .node
            .display_name
            .as_deref()
            .unwrap_or(&self.data.component_type)
    }

    pub fn alias(&self) -> Option<&str> {
        self.data.alias.as_deref().filter(|a| !a.is_empty())
    }

    pub fn source_text(&self) -> Option<&str> {
        self.data
            .node
            .template
            .get(CODE_FIELD)
            .and_then(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub node: ComponentNode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    #[serde(default)]
    pub template: BTreeMap<String, TemplateField>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

/// One parameter slot of a component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateField {
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<Value>,
    /// Value names a variable in the external variable store.
    #[serde(default)]
    pub load_from_db: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_input: Option<String>,
}
