//! DSL parser: converts raw YAML/JSON/TOML text into [`FlowSchema`].

use super::schema::FlowSchema;
use crate::error::FlowError;

/// Supported DSL input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslFormat {
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// JSON format (`.json`).
    Json,
    /// TOML format (`.toml`).
    Toml,
}

impl DslFormat {
    /// Guess the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(DslFormat::Yaml),
            "json" => Some(DslFormat::Json),
            "toml" => Some(DslFormat::Toml),
            _ => None,
        }
    }
}

/// Parse DSL content into FlowSchema
pub fn parse_dsl(content: &str, format: DslFormat) -> Result<FlowSchema, FlowError> {
    match format {
        DslFormat::Yaml => {
            serde_saphyr::from_str(content).map_err(|e| FlowError::DslParse(e.to_string()))
        }
        DslFormat::Json => {
            serde_json::from_str(content).map_err(|e| FlowError::DslParse(e.to_string()))
        }
        DslFormat::Toml => {
            // TOML goes through serde_json::Value so template values keep
            // their JSON shape.
            let toml_val: toml::Value =
                toml::from_str(content).map_err(|e| FlowError::DslParse(e.to_string()))?;
            serde_json::from_value(toml_value_to_json(toml_val))
                .map_err(|e| FlowError::DslParse(e.to_string()))
        }
    }
}

/// TOML has no null type; datetimes are stringified.
fn toml_value_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(tbl) => serde_json::Value::Object(
            tbl.into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}
