//! Taint segments and their repair rules.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaintError};
use crate::transformer::Transformer;

/// Characters up through `end` (inclusive, counted in chars) carry
/// `transformer`.
///
/// The start of a segment is implicit: one past the previous segment's end,
/// or 0 for the first. A `None` transformer means no taint metadata was
/// recorded for those characters, which is not the same as a safe
/// transformer.
///
/// # Examples
///
/// ```
/// use policy_taint::{Segment, Transformer};
///
/// let seg = Segment::new(4, Some(Transformer::safe()));
/// let json = serde_json::to_string(&seg).unwrap();
/// assert_eq!(json, r#"{"end":4,"transformer":{"kind":"base","state":{}}}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Index of the last character covered
    pub end: usize,
    /// Taint of the covered characters
    pub transformer: Option<Transformer>,
}

impl Segment {
    /// Creates a segment.
    pub fn new(end: usize, transformer: Option<Transformer>) -> Self {
        Self { end, transformer }
    }
}

/// Repairs a segment list so it covers exactly `len` characters.
///
/// Segments are sorted by `end`. Value-equal duplicates are collapsed.
/// Segments starting past the text are dropped and the last surviving end
/// is clamped to `len - 1`. An uncovered tail gets a safe transformer.
///
/// # Errors
///
/// Two segments sharing an end index with different transformers are
/// ambiguous and yield [`TaintError::MalformedTaintSegments`].
pub(crate) fn normalize(len: usize, mut segments: Vec<Segment>) -> Result<Vec<Segment>> {
    if len == 0 {
        return Ok(Vec::new());
    }

    segments.sort_by_key(|s| s.end);
    let mut repaired: Vec<Segment> = Vec::with_capacity(segments.len() + 1);
    for segment in segments {
        if let Some(last) = repaired.last() {
            if last.end == segment.end {
                if last.transformer != segment.transformer {
                    return Err(TaintError::malformed(format!(
                        "conflicting transformers share end index {}",
                        segment.end
                    )));
                }
                continue;
            }
            if last.end >= len - 1 {
                break;
            }
        }
        repaired.push(segment);
    }

    match repaired.last_mut() {
        Some(last) if last.end >= len - 1 => last.end = len - 1,
        _ => repaired.push(Segment::new(len - 1, Some(Transformer::safe()))),
    }
    Ok(repaired)
}

/// Checks the structural invariants of a segment list for `len` characters.
pub(crate) fn is_well_formed(len: usize, segments: &[Segment]) -> bool {
    if len == 0 {
        return segments.is_empty();
    }
    segments.windows(2).all(|w| w[0].end < w[1].end)
        && segments.last().is_some_and(|s| s.end == len - 1)
}
