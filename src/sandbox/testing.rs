//! In-process runtime for unit tests that exercise scheduling without a
//! script engine.

use std::sync::Arc;

use serde_json::Value;
use xflow_types::{
    BuildOutput, BuildRequest, CodeLanguage, CompiledComponent, ComponentDescriptor,
    ComponentRuntime, SandboxError,
};

type BuildFn = dyn Fn(&BuildRequest) -> Result<Vec<(String, Value)>, SandboxError> + Send + Sync;

/// Builds every component by calling a closure with the request.
pub(crate) struct FnRuntime {
    build: Arc<BuildFn>,
}

impl FnRuntime {
    pub(crate) fn new<F>(build: F) -> Self
    where
        F: Fn(&BuildRequest) -> Result<Vec<(String, Value)>, SandboxError> + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
        }
    }

    /// Returns the request params as the `result` output.
    pub(crate) fn echo() -> Self {
        Self::new(|req| Ok(vec![("result".to_string(), Value::Object(req.params.clone()))]))
    }
}

#[async_trait::async_trait]
impl ComponentRuntime for FnRuntime {
    fn language(&self) -> CodeLanguage {
        CodeLanguage::JavaScript
    }

    fn compile(&self, descriptor: &ComponentDescriptor) -> Result<CompiledComponent, SandboxError> {
        if descriptor.source_text.contains("__proto__") {
            return Err(SandboxError::StructuralViolation(
                "direct access to reflective attribute '__proto__'".into(),
            ));
        }
        Ok(CompiledComponent {
            descriptor_hash: descriptor.descriptor_hash(),
            type_name: descriptor.type_name.clone(),
            language: CodeLanguage::JavaScript,
            source: Arc::from(descriptor.source_text.as_str()),
            invocations: descriptor.invocations(),
            static_imports: Vec::new(),
            candidate_names: Vec::new(),
        })
    }

    async fn execute(
        &self,
        _compiled: Arc<CompiledComponent>,
        request: BuildRequest,
    ) -> Result<BuildOutput, SandboxError> {
        Ok(BuildOutput {
            outputs: (self.build)(&request)?,
            ..BuildOutput::default()
        })
    }
}
