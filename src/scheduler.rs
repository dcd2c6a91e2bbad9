//! Dependency-ordered graph scheduling.
//!
//! [`Graph::prepare`] validates the graph and seeds a FIFO ready queue with
//! every zero in-degree vertex in insertion order. Each step pops one vertex,
//! builds it through the [`ComponentLoader`], records the result and unlocks
//! its dependents. Builds never overlap: a vertex starts only after every
//! dependency has a recorded result.
//!
//! ```text
//! Idle --prepare--> Prepared --step--> Running --queue drained--> Finished
//!                                         |
//!                                         +--build error / stall--> Failed
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::Utc;
use futures::Stream;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::core::event_bus::FlowEvent;
use crate::core::transactions::{TransactionRecord, TransactionStatus, VertexBuildRecord};
use crate::error::{FlowError, FlowResult, VertexError};
use crate::graph::traversal::{in_degrees, GraphView};
use crate::graph::{check_integrity, Graph, VertexBuildResult, VertexState};
use crate::sandbox::{BuildContext, ComponentLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Prepared,
    Running,
    Finished,
    Failed,
}

/// Derived scheduling state, rebuilt by every `prepare`.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    ready: VecDeque<String>,
    in_degree: HashMap<String, usize>,
    run_set: HashSet<String>,
    remaining: usize,
    iterations: usize,
    call_order: Vec<String>,
    run_id: String,
}

/// One element of a run sequence.
#[derive(Debug)]
pub enum StepOutcome {
    Built(Box<VertexBuildResult>),
    /// Terminal sentinel: every vertex in the run set has been built.
    Finish,
}

impl StepOutcome {
    pub fn is_finish(&self) -> bool {
        matches!(self, StepOutcome::Finish)
    }
}

impl Graph {
    /// Validate the graph and compute the ready queue.
    ///
    /// `stop_component_id` limits the run to that vertex and its ancestors,
    /// `start_component_id` to that vertex and its descendants.
    pub fn prepare(
        &mut self,
        stop_component_id: Option<&str>,
        start_component_id: Option<&str>,
    ) -> FlowResult<()> {
        if stop_component_id.is_some() && start_component_id.is_some() {
            return Err(FlowError::Configuration(
                "stop_component_id and start_component_id cannot both be set".to_string(),
            ));
        }
        check_integrity(&self.vertices, &self.edges)?;

        let run_set: HashSet<String> = {
            let view = GraphView::new(&self.vertices, &self.edges);
            match (stop_component_id, start_component_id) {
                (Some(id), _) => {
                    self.vertex_index(id)?;
                    view.ancestors(id)
                }
                (_, Some(id)) => {
                    self.vertex_index(id)?;
                    view.descendants(id)
                }
                _ => self.vertices.iter().map(|v| v.id.clone()).collect(),
            }
        };

        for v in self.vertices.iter_mut().filter(|v| run_set.contains(&v.id)) {
            v.reset();
        }

        let in_degree = in_degrees(&run_set, &self.edges);
        let ready: VecDeque<String> = self
            .vertices
            .iter()
            .filter(|v| in_degree.get(&v.id) == Some(&0))
            .map(|v| v.id.clone())
            .collect();

        self.schedule = Schedule {
            ready,
            remaining: run_set.len(),
            in_degree,
            run_set,
            iterations: 0,
            call_order: Vec::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
        };
        self.state = RunState::Prepared;

        tracing::debug!(
            flow_id = %self.flow_id,
            run_id = %self.schedule.run_id,
            vertices = self.schedule.remaining,
            ready = self.schedule.ready.len(),
            "Graph prepared"
        );
        self.emit(FlowEvent::RunStarted {
            run_id: self.schedule.run_id.clone(),
            flow_id: self.flow_id.clone(),
            vertices: self.schedule.remaining,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Build the next ready vertex, or return [`StepOutcome::Finish`] once the
    /// run set is exhausted.
    pub async fn async_step(&mut self, loader: &ComponentLoader) -> FlowResult<StepOutcome> {
        match self.state {
            RunState::Idle | RunState::Failed => return Err(FlowError::NotPrepared),
            RunState::Finished => return Ok(StepOutcome::Finish),
            RunState::Prepared | RunState::Running => {}
        }
        self.state = RunState::Running;

        let Some(vertex_id) = self.schedule.ready.pop_front() else {
            if self.schedule.remaining > 0 {
                self.state = RunState::Failed;
                let mut stalled: Vec<&str> = self
                    .vertices
                    .iter()
                    .filter(|v| self.schedule.run_set.contains(&v.id) && !v.is_built())
                    .map(|v| v.id.as_str())
                    .collect();
                stalled.sort_unstable();
                return Err(FlowError::GraphIntegrity(format!(
                    "ready queue is empty but {} vertices are unbuilt (cycle or unreachable): {}",
                    self.schedule.remaining,
                    stalled.join(", ")
                )));
            }
            self.state = RunState::Finished;
            tracing::info!(
                flow_id = %self.flow_id,
                run_id = %self.schedule.run_id,
                built = self.schedule.call_order.len(),
                "Run finished"
            );
            self.emit(FlowEvent::RunFinished {
                run_id: self.schedule.run_id.clone(),
                built: self.schedule.call_order.len(),
                timestamp: Utc::now(),
            });
            return Ok(StepOutcome::Finish);
        };

        let max_iterations = self.settings.config.max_iterations;
        if self.schedule.iterations >= max_iterations {
            self.state = RunState::Failed;
            return Err(FlowError::MaxIterationsExceeded(max_iterations));
        }
        self.schedule.iterations += 1;

        let idx = self.vertex_index(&vertex_id)?;
        self.emit(FlowEvent::VertexStarted {
            run_id: self.schedule.run_id.clone(),
            vertex_id: vertex_id.clone(),
            timestamp: Utc::now(),
        });

        let inputs = self.collect_inputs(&vertex_id);
        let ctx = BuildContext::new(self.flow_id.clone(), &self.settings.config);
        let outcome = loader.build_vertex(&self.vertices[idx], &inputs, &ctx).await;

        match outcome {
            Ok(mut build) => {
                self.materialize_streams(&mut build);
                self.persist(&vertex_id, &inputs, Ok(&build)).await;

                let vertex = &mut self.vertices[idx];
                vertex.state = VertexState::Built;
                vertex.result = Some(build.clone());
                self.schedule.remaining = self.schedule.remaining.saturating_sub(1);
                self.schedule.call_order.push(vertex_id.clone());
                self.unlock_dependents(&vertex_id);

                self.emit(FlowEvent::VertexBuilt {
                    run_id: self.schedule.run_id.clone(),
                    vertex_id,
                    outputs: build.raw_outputs(),
                    timestamp: Utc::now(),
                });
                Ok(StepOutcome::Built(Box::new(build)))
            }
            Err(error) => {
                self.persist(&vertex_id, &inputs, Err(&error)).await;
                self.vertices[idx].state = VertexState::Failed;
                self.state = RunState::Failed;
                self.emit(FlowEvent::VertexFailed {
                    run_id: self.schedule.run_id.clone(),
                    vertex_id: vertex_id.clone(),
                    kind: error.kind(),
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
                Err(FlowError::vertex_build(vertex_id, &error))
            }
        }
    }

    /// Blocking [`async_step`](Self::async_step) on a private current-thread
    /// runtime. Must not be called from inside an async context.
    pub fn step(&mut self, loader: &ComponentLoader) -> FlowResult<StepOutcome> {
        blocking_runtime()?.block_on(self.async_step(loader))
    }

    /// Lazy, non-restartable run sequence: one item per built vertex, then
    /// `Ok(Finish)`. Dropping the iterator early leaves later vertices
    /// unbuilt.
    pub fn start<'a>(&'a mut self, loader: &'a ComponentLoader) -> FlowResult<GraphIter<'a>> {
        if self.state != RunState::Prepared {
            return Err(FlowError::NotPrepared);
        }
        Ok(GraphIter {
            graph: self,
            loader,
            runtime: blocking_runtime()?,
            done: false,
        })
    }

    /// Async counterpart of [`start`](Self::start).
    pub fn async_start<'a>(
        &'a mut self,
        loader: &'a ComponentLoader,
    ) -> FlowResult<impl Stream<Item = FlowResult<StepOutcome>> + 'a> {
        if self.state != RunState::Prepared {
            return Err(FlowError::NotPrepared);
        }
        Ok(futures::stream::unfold(
            (self, loader, false),
            |(graph, loader, done)| async move {
                if done {
                    return None;
                }
                let item = graph.async_step(loader).await;
                let finished = !matches!(item, Ok(StepOutcome::Built(_)));
                Some((item, (graph, loader, finished)))
            },
        ))
    }

    /// Ids of the vertices built in this run, in build order.
    pub fn call_order(&self) -> &[String] {
        &self.schedule.call_order
    }

    pub fn run_id(&self) -> &str {
        &self.schedule.run_id
    }

    /// Vertices of the current run set, in insertion order.
    pub fn run_set(&self) -> Vec<&str> {
        self.vertices
            .iter()
            .filter(|v| self.schedule.run_set.contains(&v.id))
            .map(|v| v.id.as_str())
            .collect()
    }

    fn unlock_dependents(&mut self, vertex_id: &str) {
        for e in self.edges.iter().filter(|e| e.source == vertex_id) {
            if !self.schedule.run_set.contains(&e.target) {
                continue;
            }
            if let Some(degree) = self.schedule.in_degree.get_mut(&e.target) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    self.schedule.ready.push_back(e.target.clone());
                }
            }
        }
    }

    /// Consume every pending stream output, publishing each chunk.
    fn materialize_streams(&self, build: &mut VertexBuildResult) {
        for output in build.outputs.iter_mut() {
            let Some(stream) = output.artifact.materialize() else {
                continue;
            };
            for (index, chunk) in stream.chunks.into_iter().enumerate() {
                self.emit(FlowEvent::StreamChunk {
                    run_id: self.schedule.run_id.clone(),
                    vertex_id: build.vertex_id.clone(),
                    output: output.name.clone(),
                    chunk,
                    index,
                });
            }
            output.value = stream.value;
        }
    }

    /// Record the build to the transaction sink. Sink errors are logged only.
    async fn persist(
        &self,
        vertex_id: &str,
        inputs: &BTreeMap<String, Value>,
        outcome: Result<&VertexBuildResult, &VertexError>,
    ) {
        let Some(sink) = self.settings.sink.clone() else {
            return;
        };
        let inputs_json = Value::Object(
            inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        );
        let (outputs, status, error) = match outcome {
            Ok(build) => (build.raw_outputs(), TransactionStatus::Success, None),
            Err(e) => (Value::Null, TransactionStatus::Error, Some(e.to_string())),
        };

        let mut targets: Vec<Option<String>> = self
            .successors(vertex_id)
            .into_iter()
            .map(|t| Some(t.to_string()))
            .collect();
        if targets.is_empty() {
            targets.push(None);
        }

        for target_id in targets {
            let record = TransactionRecord {
                flow_id: self.flow_id.clone(),
                vertex_id: vertex_id.to_string(),
                target_id,
                inputs: inputs_json.clone(),
                outputs: outputs.clone(),
                status,
                error: error.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = sink.log_transaction(record).await {
                tracing::warn!(
                    flow_id = %self.flow_id,
                    vertex_id = %vertex_id,
                    "Failed to log transaction: {}",
                    e
                );
            }
        }

        let params = self
            .vertex(vertex_id)
            .map(|v| v.params_json())
            .unwrap_or(Value::Null);
        let artifacts = match outcome {
            Ok(build) => Value::Object(
                build
                    .outputs
                    .iter()
                    .map(|o| {
                        (
                            o.name.clone(),
                            json!({ "kind": o.artifact.kind, "raw": o.artifact.raw }),
                        )
                    })
                    .collect(),
            ),
            Err(_) => Value::Null,
        };
        let record = VertexBuildRecord {
            flow_id: self.flow_id.clone(),
            vertex_id: vertex_id.to_string(),
            valid: outcome.is_ok(),
            params,
            data: outputs,
            artifacts,
            timestamp: Utc::now(),
        };
        if let Err(e) = sink.log_vertex_build(record).await {
            tracing::warn!(
                flow_id = %self.flow_id,
                vertex_id = %vertex_id,
                "Failed to log vertex build: {}",
                e
            );
        }
    }

    fn emit(&self, event: FlowEvent) {
        if let Some(sender) = &self.settings.events {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }
}

/// Blocking run sequence returned by [`Graph::start`].
pub struct GraphIter<'a> {
    graph: &'a mut Graph,
    loader: &'a ComponentLoader,
    runtime: tokio::runtime::Runtime,
    done: bool,
}

impl Iterator for GraphIter<'_> {
    type Item = FlowResult<StepOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.runtime.block_on(self.graph.async_step(self.loader));
        self.done = !matches!(item, Ok(StepOutcome::Built(_)));
        Some(item)
    }
}

fn blocking_runtime() -> FlowResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| FlowError::Internal(format!("failed to start runtime: {}", e)))
}
