//! High-level flow runner and builder.
//!
//! [`FlowRunner`] (constructed via [`FlowRunnerBuilder`]) is the main entry
//! point for executing a stored flow definition. Every run builds a fresh
//! [`Graph`] from the schema, applies tweaks and the run input, prepares it
//! and steps it to completion.

use std::sync::Arc;

use futures::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::RuntimeConfig;
use crate::core::event_bus::EventSender;
use crate::core::transactions::TransactionSink;
use crate::core::variables::VariableService;
use crate::dsl::schema::FlowSchema;
use crate::dsl::validation::{validate as validate_schema, Diagnostic};
use crate::error::{FlowError, FlowResult};
use crate::graph::{build_graph, Graph, RunInputs, RunSettings, VertexBuildResult, VertexOutput};
use crate::sandbox::ComponentLoader;
use crate::scheduler::StepOutcome;
use crate::security::AuditLogger;
use crate::tweak::{apply_tweaks, Tweaks};

/// Result of one built vertex, in build order.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub vertex_id: String,
    pub display_name: String,
    pub outputs: Vec<VertexOutput>,
    pub logs: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl RunOutput {
    /// Value of the named output.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.outputs.iter().find(|o| o.name == name).map(|o| &o.value)
    }

    /// Value of the first output.
    pub fn primary(&self) -> Option<&Value> {
        self.outputs.first().map(|o| &o.value)
    }
}

impl From<VertexBuildResult> for RunOutput {
    fn from(result: VertexBuildResult) -> Self {
        Self {
            vertex_id: result.vertex_id,
            display_name: result.display_name,
            outputs: result.outputs,
            logs: result.logs,
            warnings: result.warnings,
            duration_ms: result.duration_ms,
        }
    }
}

/// A failed run: the error plus every output recorded before it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: FlowError,
    pub completed: Vec<RunOutput>,
}

impl RunFailure {
    fn before_start(error: FlowError) -> Self {
        Self {
            error,
            completed: Vec::new(),
        }
    }
}

impl From<FlowError> for RunFailure {
    fn from(error: FlowError) -> Self {
        Self::before_start(error)
    }
}

/// Flow runner with builder-based configuration.
///
/// Use [`FlowRunner::builder(schema)`](Self::builder) to obtain a
/// [`FlowRunnerBuilder`]. A runner may be run any number of times; runs share
/// the loader's compile cache and nothing else.
#[derive(Clone)]
pub struct FlowRunner {
    schema: FlowSchema,
    tweaks: Tweaks,
    inputs: RunInputs,
    settings: RunSettings,
    loader: Arc<ComponentLoader>,
    stop_component_id: Option<String>,
    start_component_id: Option<String>,
}

impl FlowRunner {
    /// Create a new builder from a parsed flow schema.
    pub fn builder(schema: FlowSchema) -> FlowRunnerBuilder {
        FlowRunnerBuilder {
            schema,
            tweaks: Tweaks::new(),
            inputs: RunInputs::default(),
            config: RuntimeConfig::default(),
            loader: None,
            variable_service: None,
            transaction_sink: None,
            audit_logger: None,
            event_sender: None,
            stop_component_id: None,
            start_component_id: None,
        }
    }

    pub fn loader(&self) -> &Arc<ComponentLoader> {
        &self.loader
    }

    /// Build a fresh graph with tweaks and run input applied, ready to step.
    pub fn prepare_graph(&self) -> FlowResult<Graph> {
        let mut graph = build_graph(&self.schema).with_settings(self.settings.clone());
        apply_tweaks(&mut graph, &self.tweaks, Some(&self.inputs))?;
        graph.apply_run_inputs(&self.inputs);
        graph.prepare(
            self.stop_component_id.as_deref(),
            self.start_component_id.as_deref(),
        )?;
        tracing::info!(
            flow_id = %graph.flow_id(),
            run_id = %graph.run_id(),
            vertices = graph.run_set().len(),
            "Flow run starting"
        );
        Ok(graph)
    }

    /// Run to completion on a private runtime. Must not be called from
    /// inside an async context; use [`run_async`](Self::run_async) there.
    pub fn run(&self) -> Result<Vec<RunOutput>, RunFailure> {
        let mut graph = self.prepare_graph()?;
        let mut completed = Vec::new();
        for item in graph.start(&self.loader)? {
            match item {
                Ok(StepOutcome::Built(result)) => completed.push(RunOutput::from(*result)),
                Ok(StepOutcome::Finish) => break,
                Err(error) => return Err(RunFailure { error, completed }),
            }
        }
        Ok(completed)
    }

    pub async fn run_async(&self) -> Result<Vec<RunOutput>, RunFailure> {
        let mut graph = self.prepare_graph()?;
        let mut completed = Vec::new();
        loop {
            match graph.async_step(&self.loader).await {
                Ok(StepOutcome::Built(result)) => completed.push(RunOutput::from(*result)),
                Ok(StepOutcome::Finish) => return Ok(completed),
                Err(error) => return Err(RunFailure { error, completed }),
            }
        }
    }

    /// Incremental run: one item per built vertex. Nothing happens until the
    /// stream is first polled; it ends after the last vertex or after the
    /// first error. Dropping it stops the run.
    pub fn run_stream(&self) -> impl Stream<Item = FlowResult<RunOutput>> + Send + 'static {
        futures::stream::unfold(RunStream::Pending(self.clone()), |state| async move {
            let (runner, mut graph) = match state {
                RunStream::Pending(runner) => match runner.prepare_graph() {
                    Ok(graph) => (runner, Box::new(graph)),
                    Err(error) => return Some((Err(error), RunStream::Done)),
                },
                RunStream::Running(runner, graph) => (runner, graph),
                RunStream::Done => return None,
            };
            match graph.async_step(&runner.loader).await {
                Ok(StepOutcome::Built(result)) => Some((
                    Ok(RunOutput::from(*result)),
                    RunStream::Running(runner, graph),
                )),
                Ok(StepOutcome::Finish) => None,
                Err(error) => Some((Err(error), RunStream::Done)),
            }
        })
    }

    /// Diagnostics for this runner's schema and tweaks; builds nothing.
    pub fn validate(&self) -> Vec<Diagnostic> {
        validate_schema(&self.tweaks, &self.schema)
    }
}

enum RunStream {
    Pending(FlowRunner),
    Running(FlowRunner, Box<Graph>),
    Done,
}

/// Builder for configuring a [`FlowRunner`].
pub struct FlowRunnerBuilder {
    schema: FlowSchema,
    tweaks: Tweaks,
    inputs: RunInputs,
    config: RuntimeConfig,
    loader: Option<Arc<ComponentLoader>>,
    variable_service: Option<Arc<dyn VariableService>>,
    transaction_sink: Option<Arc<dyn TransactionSink>>,
    audit_logger: Option<Arc<dyn AuditLogger>>,
    event_sender: Option<EventSender>,
    stop_component_id: Option<String>,
    start_component_id: Option<String>,
}

impl FlowRunnerBuilder {
    pub fn tweaks(mut self, tweaks: Tweaks) -> Self {
        self.tweaks = tweaks;
        self
    }

    pub fn inputs(mut self, inputs: RunInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set the runtime configuration (isolation level, limits, etc.).
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a loader, and its compile cache, across runners. Its variable
    /// service and audit logger are used as configured; the builder's
    /// `variable_service` and `audit_logger` only apply to the default loader.
    pub fn loader(mut self, loader: Arc<ComponentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn variable_service(mut self, service: Arc<dyn VariableService>) -> Self {
        self.variable_service = Some(service);
        self
    }

    pub fn transaction_sink(mut self, sink: Arc<dyn TransactionSink>) -> Self {
        self.transaction_sink = Some(sink);
        self
    }

    pub fn audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    pub fn event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Build only this vertex and its ancestors.
    pub fn stop_component_id(mut self, id: impl Into<String>) -> Self {
        self.stop_component_id = Some(id.into());
        self
    }

    /// Build only this vertex and its descendants.
    pub fn start_component_id(mut self, id: impl Into<String>) -> Self {
        self.start_component_id = Some(id.into());
        self
    }

    pub fn build(self) -> FlowRunner {
        let loader = match self.loader {
            Some(loader) => {
                if self.variable_service.is_some() || self.audit_logger.is_some() {
                    tracing::warn!(
                        "variable_service/audit_logger are ignored when a custom loader is supplied"
                    );
                }
                loader
            }
            None => {
                let mut loader = ComponentLoader::new();
                if let Some(service) = self.variable_service {
                    loader = loader.with_variable_service(service);
                }
                if let Some(logger) = self.audit_logger {
                    loader = loader.with_audit_logger(logger);
                }
                Arc::new(loader)
            }
        };

        FlowRunner {
            schema: self.schema,
            tweaks: self.tweaks,
            inputs: self.inputs,
            settings: RunSettings {
                config: self.config,
                events: self.event_sender,
                sink: self.transaction_sink,
            },
            loader,
            stop_component_id: self.stop_component_id,
            start_component_id: self.start_component_id,
        }
    }
}

/// Run `schema` once with the default loader and configuration.
pub fn run(
    schema: FlowSchema,
    inputs: RunInputs,
    tweaks: Tweaks,
) -> Result<Vec<RunOutput>, RunFailure> {
    FlowRunner::builder(schema)
        .inputs(inputs)
        .tweaks(tweaks)
        .build()
        .run()
}
