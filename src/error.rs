//! Error types for taint tracking and sanitization.

/// Errors that can occur while propagating taint or sanitizing a string.
///
/// Operations that simply find nothing (a slice out of range, a pattern that
/// does not match) never produce a `TaintError`; they return `None`.
#[derive(Debug, thiserror::Error)]
pub enum TaintError {
    /// Blended transformers produced different output depending on the
    /// order they were applied in.
    #[error("mixed transformers are non-commutative in context '{context}' ({members} members)")]
    NonCommutativeMixing {
        /// The top-level context being sanitized
        context: String,
        /// Number of blended transformers
        members: usize,
    },

    /// A composed transformer was asked to hold something other than base
    /// transformers.
    #[error("nested composition unsupported: cannot compose a {found} transformer")]
    NestedCompositionUnsupported {
        /// Kind of the rejected member
        found: &'static str,
    },

    /// Too many blended transformers for the permutation check.
    #[error("composition of {members} transformers exceeds the limit of {limit}")]
    CompositionTooLarge {
        /// Number of blended transformers
        members: usize,
        /// Configured bound
        limit: usize,
    },

    /// A segment list could not be repaired into a valid taint.
    #[error("malformed taint segments: {reason}")]
    MalformedTaintSegments {
        /// What was wrong with the input
        reason: String,
    },

    /// A policy references a sanitizer that is not registered.
    #[error("unknown sanitizer '{name}'")]
    UnknownSanitizer {
        /// The unresolved sanitizer name
        name: String,
    },

    /// A regular expression pattern failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A format or unpack template could not be applied.
    #[error("invalid format directive '{directive}': {reason}")]
    InvalidFormat {
        /// The offending directive
        directive: String,
        /// What was wrong with it
        reason: String,
    },

    /// The configuration is invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl TaintError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        TaintError::MalformedTaintSegments {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_format(directive: impl Into<String>, reason: impl Into<String>) -> Self {
        TaintError::InvalidFormat {
            directive: directive.into(),
            reason: reason.into(),
        }
    }
}

/// A type alias for `Result<T, TaintError>`.
pub type Result<T> = std::result::Result<T, TaintError>;
