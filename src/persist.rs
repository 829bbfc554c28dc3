//! Storing tainted fields.
//!
//! A field is stored as its plain value plus a companion `<field>_taint`
//! column holding the segment list as JSON:
//!
//! ```text
//! [{"end":3,"transformer":null},{"end":6,"transformer":{"kind":"base","state":{...}}}]
//! ```
//!
//! Transformers are stored by value, with sanitizers referenced by their
//! registered name, so a field read back from storage owes exactly what it
//! owed when it was written.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaintError};
use crate::segment::Segment;
use crate::tainted::TaintedString;

/// Suffix of the column that holds a field's taint.
pub const TAINT_COLUMN_SUFFIX: &str = "_taint";

/// Name of the companion column for `field`.
pub fn taint_column(field: &str) -> String {
    format!("{field}{TAINT_COLUMN_SUFFIX}")
}

/// A field ready to be written: its value and the JSON for its taint
/// column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredField {
    /// The raw text
    pub value: String,
    /// Serialized segments, or `None` for an untracked value
    pub taint: Option<String>,
}

/// Splits a tainted string into its stored form.
///
/// A single untracked run stores no taint at all; an untracked string made
/// of several chunks keeps its chunk boundaries.
///
/// # Errors
///
/// Returns [`TaintError::MalformedTaintSegments`] if the segments cannot be
/// serialized.
///
/// # Examples
///
/// ```
/// use policy_taint::persist::{load_field, store_field};
/// use policy_taint::TaintedString;
///
/// let name = TaintedString::plain("Dr. ") + &TaintedString::default_tainted("Who");
/// let stored = store_field(&name).unwrap();
/// assert_eq!(stored.value, "Dr. Who");
///
/// let loaded = load_field(&stored.value, stored.taint.as_deref()).unwrap();
/// assert_eq!(loaded, name);
/// ```
pub fn store_field(string: &TaintedString) -> Result<StoredField> {
    let taint = if string.is_tracked() || string.segments().len() > 1 {
        let json = serde_json::to_string(string.segments())
            .map_err(|e| TaintError::malformed(e.to_string()))?;
        Some(json)
    } else {
        None
    };
    Ok(StoredField {
        value: string.as_str().to_string(),
        taint,
    })
}

/// Rebuilds a tainted string from a stored value and its taint column.
///
/// A missing or empty taint column loads the value as plain text. Segment
/// lists are repaired the same way [`TaintedString::from_segments`] repairs
/// them.
///
/// # Errors
///
/// Returns [`TaintError::MalformedTaintSegments`] if the taint column is not
/// a valid segment list or cannot be repaired.
pub fn load_field(value: &str, taint: Option<&str>) -> Result<TaintedString> {
    let Some(json) = taint.filter(|t| !t.trim().is_empty()) else {
        return Ok(TaintedString::plain(value));
    };
    let segments: Vec<Segment> = serde_json::from_str(json).map_err(|e| {
        tracing::warn!(error = %e, "unreadable taint column");
        TaintError::malformed(e.to_string())
    })?;
    TaintedString::from_segments(value, segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::SanitizerRef;
    use crate::transformer::{
        BaseTransformer, ContextPolicy, RollbackTransformer, Transformer, HTML,
    };

    #[test]
    fn column_name() {
        assert_eq!(taint_column("body"), "body_taint");
    }

    #[test]
    fn untracked_values_store_no_taint() {
        let stored = store_field(&TaintedString::plain("hi")).unwrap();
        assert_eq!(stored.taint, None);
        assert_eq!(load_field("hi", None).unwrap(), TaintedString::plain("hi"));
        assert_eq!(load_field("hi", Some("  ")).unwrap(), TaintedString::plain("hi"));
    }

    #[test]
    fn untracked_chunk_boundaries_survive_storage() {
        let s = TaintedString::plain("a") + "b";
        assert_eq!(s.segments().len(), 2);

        let stored = store_field(&s).unwrap();
        assert_eq!(
            stored.taint.as_deref(),
            Some(r#"[{"end":0,"transformer":null},{"end":1,"transformer":null}]"#)
        );
        let loaded = load_field(&stored.value, stored.taint.as_deref()).unwrap();
        assert_eq!(loaded.segments().len(), 2);
        assert_eq!(loaded, s);
    }

    #[test]
    fn empty_value_round_trips() {
        let stored = store_field(&TaintedString::default_tainted("")).unwrap();
        assert_eq!(stored.taint, None);
        assert_eq!(load_field("", None).unwrap(), TaintedString::default());
    }

    #[test]
    fn segment_json_shape() {
        let s = TaintedString::plain("ab")
            + &TaintedString::with_taint("c", Some(Transformer::safe()));
        let stored = store_field(&s).unwrap();
        assert_eq!(
            stored.taint.as_deref(),
            Some(r#"[{"end":1,"transformer":null},{"end":2,"transformer":{"kind":"base","state":{}}}]"#)
        );
    }

    #[test]
    fn every_transformer_kind_survives_storage() {
        let custom = BaseTransformer::safe()
            .with_policy(HTML, ContextPolicy::Sanitizer(SanitizerRef::new("mine")));
        let rollback = RollbackTransformer::new(TaintedString::default_tainted("<b>"));
        let s = TaintedString::with_taint("a", Some(custom.into()))
            + &TaintedString::with_taint("b", Some(Transformer::Identity))
            + &TaintedString::with_taint("c", Some(Transformer::Rollback(rollback)))
            + &TaintedString::default_tainted("d");

        let stored = store_field(&s).unwrap();
        let loaded = load_field(&stored.value, stored.taint.as_deref()).unwrap();
        assert_eq!(loaded, s);
    }

    #[test]
    fn short_segment_lists_are_repaired() {
        let loaded = load_field("abcdef", Some(r#"[{"end":2,"transformer":null}]"#)).unwrap();
        assert_eq!(loaded.segments().len(), 2);
        assert_eq!(loaded.taint_at(5), Some(&Transformer::safe()));
    }

    #[test]
    fn wrong_typed_transformers_are_rejected() {
        let err = load_field("abc", Some(r#"[{"end":2,"transformer":"no_html"}]"#)).unwrap_err();
        assert!(matches!(err, TaintError::MalformedTaintSegments { .. }));

        let err = load_field("abc", Some("not json")).unwrap_err();
        assert!(matches!(err, TaintError::MalformedTaintSegments { .. }));
    }
}
