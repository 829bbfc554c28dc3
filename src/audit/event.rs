//! Audit event schema and types.
//!
//! Events describe what the sanitization machinery did to a string without
//! ever holding the string's content.

use std::fmt;
use std::ops::Range;

/// Kind of sanitization event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventKind {
    /// A field policy was attached to a string
    PolicyAssigned,
    /// A violation handler was attached to a string
    ViolationAssigned,
    /// A violation handler replaced a string's content
    ViolationApplied,
    /// Provisionally sanitized chunks were restored before re-sanitizing
    RollbackApplied,
    /// An HTML chunk had no resolvable sanitizer and was passed through
    UnclassifiedChunk,
    /// Blended policies disagreed depending on application order
    NonCommutativeMixing,
    /// A string was sanitized for its final context
    Sanitized,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEventKind::PolicyAssigned => write!(f, "policy_assigned"),
            AuditEventKind::ViolationAssigned => write!(f, "violation_assigned"),
            AuditEventKind::ViolationApplied => write!(f, "violation_applied"),
            AuditEventKind::RollbackApplied => write!(f, "rollback_applied"),
            AuditEventKind::UnclassifiedChunk => write!(f, "unclassified_chunk"),
            AuditEventKind::NonCommutativeMixing => write!(f, "non_commutative_mixing"),
            AuditEventKind::Sanitized => write!(f, "sanitized"),
        }
    }
}

/// A structured audit event containing only safe, non-sensitive metadata.
///
/// # Safety Invariants
///
/// - No raw tainted text is stored, only positions and policy names
/// - Scopes are the model/field identifiers supplied by the caller
///
/// # Example
///
/// ```
/// use policy_taint::audit::{AuditEvent, AuditEventKind};
///
/// let event = AuditEvent::new(AuditEventKind::UnclassifiedChunk, "HTML")
///     .with_sub_context("//iframe")
///     .with_range(4..9);
///
/// assert_eq!(event.context(), "HTML");
/// assert_eq!(event.range(), Some(4..9));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    kind: AuditEventKind,
    /// Top-level context (`HTML`, `SQL`, ...)
    context: String,
    sub_context: Option<String>,
    /// Char range of the affected chunk
    range: Option<Range<usize>>,
    /// Policy scope, e.g. `User.name`
    scope: Option<String>,
    /// Number of chunks involved
    chunks: Option<usize>,
}

impl AuditEvent {
    /// Creates an event with the required fields.
    pub fn new(kind: AuditEventKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            sub_context: None,
            range: None,
            scope: None,
            chunks: None,
        }
    }

    /// Sets the sub-context the chunk was classified into.
    pub fn with_sub_context(mut self, sub_context: impl Into<String>) -> Self {
        self.sub_context = Some(sub_context.into());
        self
    }

    /// Sets the char range of the affected chunk.
    pub fn with_range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets the policy scope.
    ///
    /// SAFETY: Caller must ensure this does not contain sensitive data.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the number of chunks involved.
    pub fn with_chunks(mut self, chunks: usize) -> Self {
        self.chunks = Some(chunks);
        self
    }

    /// Returns the event kind.
    pub fn kind(&self) -> AuditEventKind {
        self.kind
    }

    /// Returns the top-level context.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns the sub-context, if set.
    pub fn sub_context(&self) -> Option<&str> {
        self.sub_context.as_deref()
    }

    /// Returns the chunk range, if set.
    pub fn range(&self) -> Option<Range<usize>> {
        self.range.clone()
    }

    /// Returns the policy scope, if set.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the chunk count, if set.
    pub fn chunks(&self) -> Option<usize> {
        self.chunks
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuditEvent[kind={}, context={}", self.kind, self.context)?;

        if let Some(sub) = &self.sub_context {
            write!(f, ", sub_context={}", sub)?;
        }
        if let Some(range) = &self.range {
            write!(f, ", range={}..{}", range.start, range.end)?;
        }
        if let Some(scope) = &self.scope {
            write!(f, ", scope={}", scope)?;
        }
        if let Some(chunks) = self.chunks {
            write!(f, ", chunks={}", chunks)?;
        }

        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_event_kind_display() {
        assert_eq!(AuditEventKind::PolicyAssigned.to_string(), "policy_assigned");
        assert_eq!(
            AuditEventKind::NonCommutativeMixing.to_string(),
            "non_commutative_mixing"
        );
    }

    #[test]
    fn audit_event_minimal() {
        let event = AuditEvent::new(AuditEventKind::Sanitized, "SQL");

        assert_eq!(event.kind(), AuditEventKind::Sanitized);
        assert_eq!(event.context(), "SQL");
        assert!(event.sub_context().is_none());
        assert!(event.range().is_none());
        assert!(event.scope().is_none());
    }

    #[test]
    fn audit_event_builder_pattern() {
        let event = AuditEvent::new(AuditEventKind::PolicyAssigned, "HTML")
            .with_scope("User.name")
            .with_range(0..5)
            .with_chunks(2);

        assert_eq!(event.scope(), Some("User.name"));
        assert_eq!(event.range(), Some(0..5));
        assert_eq!(event.chunks(), Some(2));
    }

    #[test]
    fn audit_event_display_lists_metadata() {
        let event = AuditEvent::new(AuditEventKind::UnclassifiedChunk, "HTML")
            .with_sub_context("tag")
            .with_range(3..7);

        let display = event.to_string();
        assert!(display.contains("unclassified_chunk"));
        assert!(display.contains("sub_context=tag"));
        assert!(display.contains("range=3..7"));
        assert!(!display.contains("scope="));
    }
}
