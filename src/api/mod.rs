//! Public API layer: stable entry points for external consumers.

mod runner;

pub use runner::{run, FlowRunner, FlowRunnerBuilder, RunFailure, RunOutput};
