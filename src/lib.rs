//! # xflow: flow execution runtime
//!
//! `xflow` executes directed graphs of components. Each component is a small
//! declarative descriptor plus source text that defines one class with a
//! build entry point. The runtime has three parts:
//!
//! - **Graph scheduler** ([`scheduler`]): validates the graph, orders
//!   vertices by dependency and builds them one at a time, surfacing each
//!   result as it completes, followed by a `Finish` sentinel.
//! - **Sandboxed component loader** ([`sandbox`]): compiles source once per
//!   descriptor, then builds it in a fresh namespace restricted by the
//!   active [`IsolationLevel`].
//! - **Tweak resolver** ([`tweak`]): applies per-run parameter overrides
//!   addressed by vertex id, alias or display name, rejecting conflicts
//!   before anything is written.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xflow::{parse_dsl, DslFormat, FlowRunner, RunInputs};
//!
//! let yaml = std::fs::read_to_string("flow.yaml").unwrap();
//! let schema = parse_dsl(&yaml, DslFormat::Yaml).unwrap();
//! let outputs = FlowRunner::builder(schema)
//!     .inputs(RunInputs::chat("hello"))
//!     .build()
//!     .run()
//!     .unwrap();
//! for output in outputs {
//!     println!("{}: {:?}", output.vertex_id, output.primary());
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `builtin-sandbox-js` | Bundles the JavaScript component runtime (Boa engine) |

pub mod api;
pub mod core;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod sandbox;
pub mod scheduler;
pub mod security;
pub mod tweak;

pub use crate::api::{run, FlowRunner, FlowRunnerBuilder, RunFailure, RunOutput};
pub use crate::core::{
    create_event_channel, Artifact, ArtifactKind, EventReceiver, EventSender, FlowEvent,
    InMemoryTransactionSink, InMemoryVariableService, RuntimeConfig, StreamArtifact,
    TransactionSink, VariableService,
};
pub use crate::dsl::{
    parse_dsl, validate, validate_dsl, Diagnostic, DiagnosticLevel, DslFormat, FlowSchema,
    ValidationReport,
};
pub use crate::error::{
    ErrorKind, ErrorReport, FlowError, FlowResult, TweakResolutionError, VertexError,
};
pub use crate::graph::{build_graph, Graph, InputType, RunInputs, Vertex, VertexBuildResult};
pub use crate::sandbox::{BuildContext, ComponentLoader, LoaderStats};
pub use crate::scheduler::{GraphIter, RunState, StepOutcome};
pub use crate::security::{AuditLogger, SecurityEvent, TracingAuditLogger};
pub use crate::tweak::{apply_tweaks, plan_tweaks, TweakReport, Tweaks};
pub use xflow_types::{ComponentDescriptor, ComponentRuntime, IsolationLevel, SandboxError};
