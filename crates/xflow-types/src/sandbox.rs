use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{CapabilitySet, IsolationLevel};
use crate::descriptor::ComponentDescriptor;

// ================================
// ComponentRuntime Trait
// ================================

/// A language runtime able to compile and build components.
///
/// `compile` is pure and independent of the isolation level so its result can
/// be cached per descriptor and shared across runs. `execute` erects a fresh
/// namespace for every call under the policy carried by the request.
#[async_trait::async_trait]
pub trait ComponentRuntime: Send + Sync {
    /// Language this runtime executes.
    fn language(&self) -> CodeLanguage;

    /// Parse and structurally check a descriptor's source text.
    fn compile(&self, descriptor: &ComponentDescriptor) -> Result<CompiledComponent, SandboxError>;

    /// Instantiate the compiled component with the request parameters and
    /// invoke its build entry points.
    async fn execute(
        &self,
        compiled: Arc<CompiledComponent>,
        request: BuildRequest,
    ) -> Result<BuildOutput, SandboxError>;
}

// ================================
// Enums
// ================================

/// Supported component source languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    #[default]
    JavaScript,
}

impl CodeLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeLanguage::JavaScript => "javascript",
        }
    }
}

/// Category of a compile-time structural finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Raw syntax reading or writing a reflective attribute.
    ReflectiveAttribute,
    /// ES dynamic `import()`.
    DynamicImport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViolation {
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct CodeAnalysisResult {
    pub is_safe: bool,
    pub violations: Vec<CodeViolation>,
    /// Module names passed as string literals to `require`.
    pub static_imports: Vec<String>,
    /// Identifiers that may name top-level definitions.
    pub candidate_names: Vec<String>,
}

// ================================
// Request / Response / Config
// ================================

/// Execution limits enforced inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Max source length (bytes)
    pub max_code_length: usize,
    /// Max loop iterations per evaluation
    pub max_loop_iterations: u64,
    /// Max call recursion depth
    pub max_recursion_depth: usize,
    /// Max serialized output size (bytes)
    pub max_output_bytes: usize,
    /// Max chunks pulled from a streaming result
    pub max_stream_chunks: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_code_length: 1_000_000,
            max_loop_iterations: 10_000_000,
            max_recursion_depth: 512,
            max_output_bytes: 4 * 1024 * 1024,
            max_stream_chunks: 10_000,
        }
    }
}

/// Policy for one sandbox construction. Carries the isolation level
/// explicitly so concurrent runs may differ.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub capabilities: CapabilitySet,
    pub limits: SandboxLimits,
}

impl SandboxPolicy {
    pub fn new(level: IsolationLevel, limits: SandboxLimits) -> Self {
        Self {
            capabilities: CapabilitySet::for_level(level),
            limits,
        }
    }

    pub fn level(&self) -> IsolationLevel {
        self.capabilities.level()
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new(IsolationLevel::default(), SandboxLimits::default())
    }
}

/// Output of [`ComponentRuntime::compile`].
#[derive(Debug, Clone)]
pub struct CompiledComponent {
    pub descriptor_hash: String,
    pub type_name: String,
    pub language: CodeLanguage,
    pub source: Arc<str>,
    /// `(output name, method)` pairs invoked on build.
    pub invocations: Vec<(String, String)>,
    pub static_imports: Vec<String>,
    pub candidate_names: Vec<String>,
}

/// One build of a compiled component.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub vertex_id: String,
    pub params: Map<String, Value>,
    pub policy: SandboxPolicy,
}

/// Raw outcome of a build before artifact classification.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// Raw value per output name, in invocation order.
    pub outputs: Vec<(String, Value)>,
    /// Names defined by the component source, with their `typeof` kind.
    pub namespace: BTreeMap<String, String>,
    pub status: Option<Value>,
    pub logs: Vec<String>,
}

/// Sandbox errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("Unsupported language: {0:?}")]
    UnsupportedLanguage(CodeLanguage),

    #[error("Code too large (max {max} bytes, got {actual} bytes)")]
    CodeTooLarge { max: usize, actual: usize },

    #[error("Compilation error: {0}")]
    CompilationError(String),

    #[error("Structural violation: {0}")]
    StructuralViolation(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Component error: {0}")]
    ComponentError(String),

    #[error("Invalid component: {0}")]
    InvalidComponent(String),

    #[error("Output too large (max {max} bytes, got {actual} bytes)")]
    OutputTooLarge { max: usize, actual: usize },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SandboxError {
    /// Whether the failure was a refusal by the sandbox rather than a fault
    /// in component logic.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            SandboxError::SecurityViolation(_) | SandboxError::StructuralViolation(_)
        )
    }
}
