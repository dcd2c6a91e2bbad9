use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use xflow_types::IsolationLevel;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub timestamp: i64,
    pub flow_id: String,
    pub vertex_id: Option<String>,
    pub event_type: SecurityEventType,
    pub details: Value,
    pub severity: EventSeverity,
}

impl SecurityEvent {
    pub fn new(
        flow_id: impl Into<String>,
        vertex_id: Option<String>,
        event_type: SecurityEventType,
        severity: EventSeverity,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            flow_id: flow_id.into(),
            vertex_id,
            event_type,
            details: Value::Null,
            severity,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum SecurityEventType {
    /// A host hook denied a module, primitive or reflective attribute.
    SandboxViolation {
        level: IsolationLevel,
        violation: String,
    },
    /// Compile-time structural check rejected the source.
    CodeAnalysisBlocked { violations: String },
    /// A variable lookup failed and the field was resolved otherwise.
    VariableFallback {
        field: String,
        variable: String,
        resolved_from_env: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_event(&self, event: SecurityEvent);

    async fn log_events(&self, events: Vec<SecurityEvent>) {
        for event in events {
            self.log_event(event).await;
        }
    }
}

pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log_event(&self, event: SecurityEvent) {
        match event.severity {
            EventSeverity::Critical => {
                tracing::error!(
                    flow_id = %event.flow_id,
                    vertex_id = ?event.vertex_id,
                    event_type = ?event.event_type,
                    "SECURITY: {:?}",
                    event.details
                );
            }
            EventSeverity::Warning => {
                tracing::warn!(
                    flow_id = %event.flow_id,
                    vertex_id = ?event.vertex_id,
                    event_type = ?event.event_type,
                    "SECURITY: {:?}",
                    event.details
                );
            }
            EventSeverity::Info => {
                tracing::info!(
                    flow_id = %event.flow_id,
                    vertex_id = ?event.vertex_id,
                    event_type = ?event.event_type,
                    "SECURITY: {:?}",
                    event.details
                );
            }
        }
    }
}
