//! In-memory audit trail recorder.

use super::AuditEvent;
use std::cell::RefCell;

/// In-memory recorder for sanitization audit events.
///
/// Every recorded event is also emitted through `tracing` under the
/// `taint_audit` target, so a subscriber sees the same stream the trail
/// keeps.
///
/// # Example
///
/// ```
/// use policy_taint::audit::{AuditEvent, AuditEventKind, AuditTrail};
///
/// let trail = AuditTrail::new();
/// trail.record(AuditEvent::new(AuditEventKind::RollbackApplied, "HTML").with_chunks(2));
///
/// assert_eq!(trail.events().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: RefCell<Vec<AuditEvent>>,
}

impl AuditTrail {
    /// Creates a new empty audit trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits and records an audit event.
    ///
    /// Events are stored in memory in the order they are recorded.
    pub fn record(&self, event: AuditEvent) {
        emit(&event);
        self.events.borrow_mut().push(event);
    }

    /// Returns a snapshot of all recorded events.
    ///
    /// This clones the events to avoid holding the borrow.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.borrow().clone()
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Returns true if no events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Clears all recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

fn emit(event: &AuditEvent) {
    tracing::info!(
        target: "taint_audit",
        kind = %event.kind(),
        context = %event.context(),
        sub_context = ?event.sub_context(),
        range = ?event.range(),
        scope = ?event.scope(),
        chunks = ?event.chunks(),
        "audit event"
    );
}
