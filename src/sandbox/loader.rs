//! Sandboxed component loader.
//!
//! Turns a [`Vertex`] into a [`VertexBuildResult`]: compiles the descriptor
//! once (cached by descriptor hash), resolves parameters, and hands the build
//! to the language runtime under the run's [`SandboxPolicy`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use xflow_types::{
    BuildRequest, CodeLanguage, CompiledComponent, ComponentDescriptor, ComponentRuntime,
    SandboxError, SandboxPolicy,
};

use crate::core::artifact::Artifact;
use crate::core::config::RuntimeConfig;
use crate::core::variables::VariableService;
use crate::error::{VertexError, VertexResult};
use crate::graph::{Vertex, VertexBuildResult, VertexOutput};
use crate::security::{
    AuditLogger, EventSeverity, SecurityEvent, SecurityEventType, TracingAuditLogger,
};

/// Per-run inputs to every build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub flow_id: String,
    pub owner_id: String,
    pub fallback_to_env_vars: bool,
    pub policy: SandboxPolicy,
}

impl BuildContext {
    pub fn new(flow_id: impl Into<String>, config: &RuntimeConfig) -> Self {
        Self {
            flow_id: flow_id.into(),
            owner_id: config.owner_id.clone(),
            fallback_to_env_vars: config.fallback_to_env_vars,
            policy: SandboxPolicy::new(config.isolation_level, config.sandbox.clone()),
        }
    }
}

/// Loader counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub compilations: u64,
    pub cache_hits: u64,
    pub builds: u64,
    pub failures: u64,
    pub security_violations: u64,
}

/// Component loader - compiles, caches and builds components
pub struct ComponentLoader {
    runtimes: HashMap<CodeLanguage, Arc<dyn ComponentRuntime>>,
    cache: DashMap<String, Arc<CompiledComponent>>,
    variables: Option<Arc<dyn VariableService>>,
    audit: Arc<dyn AuditLogger>,
    stats: RwLock<LoaderStats>,
}

impl ComponentLoader {
    /// Loader with the built-in runtimes registered.
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut loader = Self::new_empty();

        #[cfg(feature = "builtin-sandbox-js")]
        loader.register_runtime(Arc::new(xflow_sandbox_js::JsComponentRuntime::default()));

        loader
    }

    pub fn new_empty() -> Self {
        Self {
            runtimes: HashMap::new(),
            cache: DashMap::new(),
            variables: None,
            audit: Arc::new(TracingAuditLogger),
            stats: RwLock::new(LoaderStats::default()),
        }
    }

    pub fn register_runtime(&mut self, runtime: Arc<dyn ComponentRuntime>) {
        self.runtimes.insert(runtime.language(), runtime);
    }

    pub fn with_variable_service(mut self, service: Arc<dyn VariableService>) -> Self {
        self.variables = Some(service);
        self
    }

    pub fn with_audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit = logger;
        self
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats.read().clone()
    }

    pub fn cached_components(&self) -> usize {
        self.cache.len()
    }

    /// Compile a descriptor, at most once per descriptor hash.
    pub fn compile(
        &self,
        descriptor: &ComponentDescriptor,
    ) -> Result<Arc<CompiledComponent>, SandboxError> {
        let key = descriptor.descriptor_hash();
        if let Some(hit) = self.cache.get(&key) {
            self.stats.write().cache_hits += 1;
            return Ok(hit.clone());
        }

        let runtime = self.runtime(descriptor.language)?;
        let entry = self.cache.entry(key).or_try_insert_with(|| {
            self.stats.write().compilations += 1;
            runtime.compile(descriptor).map(Arc::new)
        })?;
        Ok(entry.value().clone())
    }

    fn runtime(&self, language: CodeLanguage) -> Result<&Arc<dyn ComponentRuntime>, SandboxError> {
        self.runtimes
            .get(&language)
            .ok_or(SandboxError::UnsupportedLanguage(language))
    }

    /// Build one vertex with its upstream `inputs` injected.
    pub async fn build_vertex(
        &self,
        vertex: &Vertex,
        inputs: &BTreeMap<String, Value>,
        ctx: &BuildContext,
    ) -> VertexResult<VertexBuildResult> {
        self.stats.write().builds += 1;
        let started = Instant::now();

        let result = self.try_build(vertex, inputs, ctx).await;
        match &result {
            Ok(build) => tracing::debug!(
                flow_id = %ctx.flow_id,
                vertex_id = %vertex.id,
                outputs = build.outputs.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Vertex built"
            ),
            Err(e) => {
                self.stats.write().failures += 1;
                tracing::warn!(
                    flow_id = %ctx.flow_id,
                    vertex_id = %vertex.id,
                    kind = %e.kind(),
                    "Vertex build failed: {}",
                    e
                );
            }
        }
        result
    }

    async fn try_build(
        &self,
        vertex: &Vertex,
        inputs: &BTreeMap<String, Value>,
        ctx: &BuildContext,
    ) -> VertexResult<VertexBuildResult> {
        let descriptor = vertex.descriptor.as_ref();
        if descriptor.source_text.trim().is_empty() {
            return Err(VertexError::Compilation(format!(
                "vertex '{}' has no component source",
                vertex.id
            )));
        }
        let max_code = ctx.policy.limits.max_code_length;
        if descriptor.source_text.len() > max_code {
            return Err(SandboxError::CodeTooLarge {
                max: max_code,
                actual: descriptor.source_text.len(),
            }
            .into());
        }

        let compiled = match self.compile(descriptor) {
            Ok(compiled) => compiled,
            Err(e) => {
                if e.is_security() {
                    self.record_violation(ctx, vertex, &e, true).await;
                }
                return Err(e.into());
            }
        };

        let (mut params, warnings) = self.resolve_params(vertex, ctx).await?;
        for (name, value) in inputs {
            params.insert(name.clone(), value.clone());
        }

        let runtime = self.runtime(compiled.language)?;
        let started = Instant::now();
        let request = BuildRequest {
            vertex_id: vertex.id.clone(),
            params,
            policy: ctx.policy.clone(),
        };
        let output = match runtime.execute(compiled, request).await {
            Ok(output) => output,
            Err(e) => {
                if e.is_security() {
                    self.record_violation(ctx, vertex, &e, false).await;
                }
                return Err(e.into());
            }
        };

        let outputs = output
            .outputs
            .into_iter()
            .map(|(name, raw)| VertexOutput {
                name,
                artifact: Artifact::from_raw(raw.clone()),
                value: raw,
            })
            .collect();

        Ok(VertexBuildResult {
            vertex_id: vertex.id.clone(),
            display_name: vertex.display_name.clone(),
            outputs,
            status: output.status,
            logs: output.logs,
            warnings,
            duration_ms: started.elapsed().as_millis() as u64,
            built_at: chrono::Utc::now(),
        })
    }

    /// Parameter values for a build. `load_from_db` fields are looked up in
    /// the variable service, then optionally the process environment.
    async fn resolve_params(
        &self,
        vertex: &Vertex,
        ctx: &BuildContext,
    ) -> VertexResult<(Map<String, Value>, Vec<String>)> {
        let mut params = Map::new();
        let mut warnings = Vec::new();

        for (field, slot) in &vertex.params {
            let value = slot.effective_value();
            let variable = match (&value, slot.load_from_db) {
                (Value::String(name), true) if !name.is_empty() => name.clone(),
                _ => {
                    params.insert(field.clone(), value);
                    continue;
                }
            };

            let lookup = match &self.variables {
                Some(service) => service
                    .resolve(&ctx.owner_id, &variable)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("no variable service configured".to_string()),
            };
            let reason = match lookup {
                Ok(resolved) => {
                    params.insert(field.clone(), Value::String(resolved));
                    continue;
                }
                Err(reason) => reason,
            };

            if !ctx.fallback_to_env_vars {
                return Err(VertexError::ResourceResolution {
                    field: field.clone(),
                    variable,
                    reason,
                });
            }

            let from_env = std::env::var(&variable).ok();
            let resolved_from_env = from_env.is_some();
            match from_env {
                Some(env_value) => {
                    params.insert(field.clone(), Value::String(env_value));
                }
                None => {
                    params.insert(field.clone(), Value::Null);
                    warnings.push(format!(
                        "field '{}': variable '{}' not found ({}) and no environment variable of that name; value set to null",
                        field, variable, reason
                    ));
                }
            }
            self.audit
                .log_event(
                    SecurityEvent::new(
                        ctx.flow_id.clone(),
                        Some(vertex.id.clone()),
                        SecurityEventType::VariableFallback {
                            field: field.clone(),
                            variable,
                            resolved_from_env,
                        },
                        EventSeverity::Info,
                    )
                    .with_details(json!({ "reason": reason })),
                )
                .await;
        }

        Ok((params, warnings))
    }

    async fn record_violation(
        &self,
        ctx: &BuildContext,
        vertex: &Vertex,
        error: &SandboxError,
        at_compile: bool,
    ) {
        self.stats.write().security_violations += 1;
        let event_type = if at_compile {
            SecurityEventType::CodeAnalysisBlocked {
                violations: error.to_string(),
            }
        } else {
            SecurityEventType::SandboxViolation {
                level: ctx.policy.level(),
                violation: error.to_string(),
            }
        };
        self.audit
            .log_event(
                SecurityEvent::new(
                    ctx.flow_id.clone(),
                    Some(vertex.id.clone()),
                    event_type,
                    EventSeverity::Warning,
                )
                .with_details(json!({ "component_type": vertex.component_type() })),
            )
            .await;
    }
}

impl Default for ComponentLoader {
    fn default() -> Self {
        Self::new()
    }
}
