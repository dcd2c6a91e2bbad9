use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ErrorKind;

/// Flow event, delivered over the event channel
#[derive(Clone, Debug, Serialize)]
pub enum FlowEvent {
    /// The graph was prepared and its ready queue seeded
    RunStarted {
        run_id: String,
        flow_id: String,
        vertices: usize,
        timestamp: DateTime<Utc>,
    },

    /// A vertex was dequeued and its build started
    VertexStarted {
        run_id: String,
        vertex_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A vertex build completed
    VertexBuilt {
        run_id: String,
        vertex_id: String,
        outputs: Value,
        timestamp: DateTime<Utc>,
    },

    /// A vertex build failed
    VertexFailed {
        run_id: String,
        vertex_id: String,
        kind: ErrorKind,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// One chunk of a materialized stream
    StreamChunk {
        run_id: String,
        vertex_id: String,
        output: String,
        chunk: Value,
        index: usize,
    },

    /// The run reached its Finish sentinel
    RunFinished {
        run_id: String,
        built: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Event sender
pub type EventSender = mpsc::UnboundedSender<FlowEvent>;

/// Event receiver
pub type EventReceiver = mpsc::UnboundedReceiver<FlowEvent>;

/// Create an event channel
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
