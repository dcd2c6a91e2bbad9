//! Security audit trail for sandbox refusals and variable fallbacks.

pub mod audit;

pub use audit::{AuditLogger, EventSeverity, SecurityEvent, SecurityEventType, TracingAuditLogger};
