use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sandbox::CodeLanguage;

/// Default build entry point invoked when a descriptor declares no outputs.
pub const DEFAULT_ENTRY_POINT: &str = "build";

/// Output name used for the entry point result when no outputs are declared.
pub const DEFAULT_OUTPUT_NAME: &str = "result";

/// One declared output of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    /// Method invoked on the component instance to produce this output.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: Some(method.into()),
            types: Vec::new(),
        }
    }
}

/// Immutable component description: declarative shape plus source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub type_name: String,
    #[serde(default = "default_base_type")]
    pub base_type: String,
    pub source_text: String,
    #[serde(default)]
    pub declared_outputs: Vec<OutputSpec>,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default)]
    pub language: CodeLanguage,
}

fn default_base_type() -> String {
    "component".to_string()
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl ComponentDescriptor {
    pub fn new(type_name: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            base_type: default_base_type(),
            source_text: source_text.into(),
            declared_outputs: Vec::new(),
            entry_point: default_entry_point(),
            language: CodeLanguage::default(),
        }
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.declared_outputs.push(output);
        self
    }

    pub fn with_base_type(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = base_type.into();
        self
    }

    /// Stable identity of the descriptor, used as the compile cache key.
    pub fn descriptor_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.language.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.type_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.base_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.entry_point.as_bytes());
        hasher.update([0u8]);
        for output in &self.declared_outputs {
            hasher.update(output.name.as_bytes());
            hasher.update([1u8]);
            hasher.update(output.method.as_deref().unwrap_or("").as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.source_text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `(output name, method)` pairs invoked by a build.
    pub fn invocations(&self) -> Vec<(String, String)> {
        let declared: Vec<(String, String)> = self
            .declared_outputs
            .iter()
            .filter_map(|o| o.method.clone().map(|m| (o.name.clone(), m)))
            .collect();
        if declared.is_empty() {
            let name = self
                .declared_outputs
                .first()
                .map(|o| o.name.clone())
                .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string());
            vec![(name, self.entry_point.clone())]
        } else {
            declared
        }
    }
}
