//! Error types for the flow runtime.
//!
//! - [`ErrorKind`]: The kind tag carried by every reported failure.
//! - [`VertexError`]: Errors raised while building a single vertex.
//! - [`TweakResolutionError`]: Ambiguous or conflicting override keys.
//! - [`FlowError`]: Top-level errors for parsing, preparing and running a graph.

pub mod flow_error;
pub mod kind;
pub mod tweak_error;
pub mod vertex_error;

pub use flow_error::{ErrorReport, FlowError};
pub use kind::ErrorKind;
pub use tweak_error::{TweakConflict, TweakResolutionError};
pub use vertex_error::VertexError;

/// Convenience alias for flow-level results.
pub type FlowResult<T> = Result<T, FlowError>;
/// Convenience alias for vertex-level results.
pub type VertexResult<T> = Result<T, VertexError>;
