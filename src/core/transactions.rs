//! Append-only persistence of vertex builds.
//!
//! Writes are best-effort: the scheduler logs and swallows sink errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("Transaction sink unavailable: {0}")]
    Unavailable(String),
    #[error("Transaction serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Error,
}

/// One record per vertex build and outgoing target.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub flow_id: String,
    pub vertex_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub inputs: Value,
    pub outputs: Value,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One record per build attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VertexBuildRecord {
    pub flow_id: String,
    pub vertex_id: String,
    pub valid: bool,
    pub params: Value,
    pub data: Value,
    pub artifacts: Value,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn log_transaction(&self, record: TransactionRecord) -> Result<(), SinkError>;

    async fn log_vertex_build(&self, record: VertexBuildRecord) -> Result<(), SinkError>;
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct InMemoryTransactionSink {
    transactions: Mutex<Vec<TransactionRecord>>,
    builds: Mutex<Vec<VertexBuildRecord>>,
}

impl InMemoryTransactionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions.lock().clone()
    }

    pub fn vertex_builds(&self) -> Vec<VertexBuildRecord> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl TransactionSink for InMemoryTransactionSink {
    async fn log_transaction(&self, record: TransactionRecord) -> Result<(), SinkError> {
        self.transactions.lock().push(record);
        Ok(())
    }

    async fn log_vertex_build(&self, record: VertexBuildRecord) -> Result<(), SinkError> {
        self.builds.lock().push(record);
        Ok(())
    }
}

/// Emits records as `debug` events.
pub struct TracingTransactionSink;

#[async_trait]
impl TransactionSink for TracingTransactionSink {
    async fn log_transaction(&self, record: TransactionRecord) -> Result<(), SinkError> {
        tracing::debug!(
            flow_id = %record.flow_id,
            vertex_id = %record.vertex_id,
            target_id = ?record.target_id,
            status = ?record.status,
            "TRANSACTION"
        );
        Ok(())
    }

    async fn log_vertex_build(&self, record: VertexBuildRecord) -> Result<(), SinkError> {
        tracing::debug!(
            flow_id = %record.flow_id,
            vertex_id = %record.vertex_id,
            valid = record.valid,
            "VERTEX BUILD"
        );
        Ok(())
    }
}
