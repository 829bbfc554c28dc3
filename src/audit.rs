//! Audit trail support for sanitization decisions.
//!
//! This module provides:
//! - `AuditEvent`: Structured audit event schema
//! - `AuditTrail`: In-memory recorder that also emits through `tracing`
//!
//! Audit events are designed to be safe by default:
//! - No storage of raw tainted text
//! - Only positions, context names and policy scopes are recorded

mod event;
mod trail;

pub use event::{AuditEvent, AuditEventKind};
pub use trail::AuditTrail;
