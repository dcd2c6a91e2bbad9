pub mod artifact;
pub mod config;
pub mod event_bus;
pub mod transactions;
pub mod variables;

pub use artifact::{
    classify, plain_value, Artifact, ArtifactKind, MaterializedStream, StreamArtifact, TYPE_MARKER,
};
pub use config::RuntimeConfig;
pub use event_bus::{create_event_channel, EventReceiver, EventSender, FlowEvent};
pub use transactions::{
    InMemoryTransactionSink, SinkError, TracingTransactionSink, TransactionRecord, TransactionSink,
    TransactionStatus, VertexBuildRecord,
};
pub use variables::{InMemoryVariableService, VariableError, VariableService};
