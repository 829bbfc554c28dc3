//! The tainted string type and context-aware transformation.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::chunk::{compose, compress_taint, Chunk, Chunks};
use crate::compose::{taint_union, ComposedTransformer};
use crate::context::Ctx;
use crate::error::{Result, TaintError};
use crate::html;
use crate::segment::{self, Segment};
use crate::transformer::{BaseTransformer, ContextPolicy, Transformer, HTML};

/// A string that knows, character by character, which sanitization policy
/// its content still owes.
///
/// The text is paired with an ordered list of [`Segment`]s. Every string
/// operation in this crate rebuilds the segments of its result from the
/// segments of its inputs, so provenance survives concatenation, slicing,
/// substitution and the rest. Sanitization happens once, when the string is
/// [transformed](TaintedString::transform) for its final context.
///
/// # Invariants
///
/// - Segments are sorted by `end` and cover every character exactly once.
/// - The empty string has no segments.
///
/// # Examples
///
/// ```
/// use policy_taint::{Ctx, TaintedString, HTML};
///
/// let ctx = Ctx::new();
/// let page = TaintedString::plain("<p>")
///     + &TaintedString::default_tainted("<script>alert(1)</script>")
///     + "</p>";
///
/// let html = page.transform(HTML, None, &ctx).unwrap();
/// assert_eq!(html, "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaintedParts")]
pub struct TaintedString {
    // Both fields MUST stay private: every constructor upholds the segment
    // invariants and the chunk algebra relies on them without checking.
    text: String,
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct TaintedParts {
    text: String,
    segments: Vec<Segment>,
}

impl TryFrom<TaintedParts> for TaintedString {
    type Error = TaintError;

    fn try_from(parts: TaintedParts) -> Result<Self> {
        TaintedString::from_segments(parts.text, parts.segments)
    }
}

impl TaintedString {
    /// Wraps text with no taint metadata.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::with_taint(text, None)
    }

    /// Wraps text with one transformer over all of it.
    pub fn with_taint(text: impl Into<String>, transformer: Option<Transformer>) -> Self {
        let mut out = Self::default();
        out.push_chunk(&text.into(), transformer);
        out
    }

    /// Wraps untrusted text with the default policy.
    pub fn default_tainted(text: impl Into<String>) -> Self {
        Self::with_taint(text, Some(Transformer::default_policy()))
    }

    /// Builds a string from explicit segments, repairing what can be
    /// repaired.
    ///
    /// Out-of-range ends are clamped, segments are sorted, and an uncovered
    /// tail is tagged safe.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::MalformedTaintSegments`] when two segments share
    /// an end with different transformers.
    pub fn from_segments(text: impl Into<String>, segments: Vec<Segment>) -> Result<Self> {
        let text = text.into();
        let segments = segment::normalize(text.chars().count(), segments)?;
        Ok(Self { text, segments })
    }

    // Callers guarantee the segment invariants.
    pub(crate) fn from_parts(text: String, segments: Vec<Segment>) -> Self {
        debug_assert!(segment::is_well_formed(text.chars().count(), &segments));
        Self { text, segments }
    }

    /// Returns a copy of the text tagged entirely with the default policy.
    pub fn mark_default_tainted(&self) -> Self {
        Self::default_tainted(self.text.clone())
    }

    /// Returns a copy of the text tagged entirely with `transformer`.
    pub fn set_taint(&self, transformer: Option<Transformer>) -> Self {
        Self::with_taint(self.text.clone(), transformer)
    }

    /// Returns a copy of the text tagged entirely with a base transformer
    /// built from `state`.
    pub fn set_taint_state<I, K>(&self, state: I) -> Self
    where
        I: IntoIterator<Item = (K, ContextPolicy)>,
        K: Into<String>,
    {
        let base =
            BaseTransformer::from_state(state.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self.set_taint(Some(base.into()))
    }

    /// Returns the raw text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Discards the taint and returns the raw text.
    pub fn into_string(self) -> String {
        self.text
    }

    /// Returns the segment list.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.segments.last().map_or(0, |s| s.end + 1)
    }

    /// Returns `true` for the empty string.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns `true` if any character carries taint metadata.
    pub fn is_tracked(&self) -> bool {
        self.segments.iter().any(|s| s.transformer.is_some())
    }

    /// Returns `true` if any character still owes a policy.
    pub fn is_tainted(&self) -> bool {
        self.segments.iter().any(|s| match &s.transformer {
            None | Some(Transformer::Identity) => false,
            Some(Transformer::Base(b)) => !b.is_safe(),
            Some(_) => true,
        })
    }

    /// Returns the segment covering character `index`.
    pub fn segment_at(&self, index: usize) -> Option<&Segment> {
        let i = self.segments.partition_point(|s| s.end < index);
        self.segments.get(i)
    }

    /// Returns the transformer of character `index`; `None` if the index is
    /// out of range or the character is untracked.
    pub fn taint_at(&self, index: usize) -> Option<&Transformer> {
        self.segment_at(index)?.transformer.as_ref()
    }

    /// Iterates over the chunks of the string.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks::new(&self.text, &self.segments)
    }

    /// The union of every transformer in the string.
    ///
    /// An untracked string has an empty union, which owes nothing.
    ///
    /// # Errors
    ///
    /// Fails if the string contains a rollback segment.
    pub fn effective_taint(&self) -> Result<ComposedTransformer> {
        taint_union(self.segments.iter().map(|s| s.transformer.as_ref()))
    }

    /// Appends text as a new chunk. Empty text is ignored.
    pub(crate) fn push_chunk(&mut self, text: &str, transformer: Option<Transformer>) {
        let count = text.chars().count();
        if count == 0 {
            return;
        }
        let end = self.len() + count - 1;
        self.text.push_str(text);
        self.segments.push(Segment::new(end, transformer));
    }

    /// Appends another tainted string, keeping its segments.
    pub fn push_tainted(&mut self, other: &TaintedString) {
        let offset = self.len();
        self.text.push_str(&other.text);
        self.segments.extend(
            other
                .segments
                .iter()
                .map(|s| Segment::new(s.end + offset, s.transformer.clone())),
        );
    }

    /// Appends untracked text.
    pub fn push_str(&mut self, text: &str) {
        self.push_chunk(text, None);
    }

    /// Returns the concatenation of `self` and `other`.
    pub fn concat(&self, other: &TaintedString) -> TaintedString {
        let mut out = self.clone();
        out.push_tainted(other);
        out
    }

    /// Sanitizes the string for `context`.
    ///
    /// `HTML` goes through the contextual engine, which classifies each chunk
    /// by where it sits in the markup and returns a result that can be rolled
    /// back if it is later embedded in a larger document. Any other context
    /// sanitizes chunk by chunk with the chunk's own policy; sanitized chunks
    /// come back tagged safe and untracked chunks stay untracked. Chunks left
    /// by an earlier HTML rendering are first restored to their unsanitized
    /// input.
    ///
    /// # Errors
    ///
    /// Fails on an unregistered sanitizer or on non-commuting blended
    /// policies.
    pub fn transform(
        &self,
        context: &str,
        sub_context: Option<&str>,
        ctx: &Ctx,
    ) -> Result<TaintedString> {
        if context == HTML {
            return html::transform_html(self, ctx);
        }
        if !self.is_tracked() {
            return Ok(self.clone());
        }

        // An HTML rendering is provisional; other contexts sanitize the
        // restored input with its own policies.
        let restored = html::run_rollback(self);
        let mut out = TaintedString::default();
        for chunk in restored.chunks() {
            match chunk.transformer {
                Some(t) => {
                    let sanitized = t.transform(chunk.text, context, sub_context, ctx)?;
                    out.push_chunk(&sanitized, Some(Transformer::safe()));
                }
                None => out.push_chunk(chunk.text, None),
            }
        }
        tracing::debug!(context, chunks = restored.segments.len(), "sanitized string");
        Ok(compress_taint(&out))
    }
}

impl fmt::Display for TaintedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for TaintedString {
    fn from(text: &str) -> Self {
        Self::plain(text)
    }
}

impl From<String> for TaintedString {
    fn from(text: String) -> Self {
        Self::plain(text)
    }
}

impl PartialEq<str> for TaintedString {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}

impl PartialEq<&str> for TaintedString {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl Add<&TaintedString> for TaintedString {
    type Output = TaintedString;

    fn add(mut self, rhs: &TaintedString) -> TaintedString {
        self.push_tainted(rhs);
        self
    }
}

impl Add<&str> for TaintedString {
    type Output = TaintedString;

    fn add(mut self, rhs: &str) -> TaintedString {
        self.push_str(rhs);
        self
    }
}

impl AddAssign<&TaintedString> for TaintedString {
    fn add_assign(&mut self, rhs: &TaintedString) {
        self.push_tainted(rhs);
    }
}

impl AddAssign<&str> for TaintedString {
    fn add_assign(&mut self, rhs: &str) {
        self.push_str(rhs);
    }
}

impl FromIterator<Chunk> for TaintedString {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        compose(iter)
    }
}

impl FromIterator<TaintedString> for TaintedString {
    fn from_iter<I: IntoIterator<Item = TaintedString>>(iter: I) -> Self {
        let mut out = TaintedString::default();
        for part in iter {
            out.push_tainted(&part);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::SanitizerRef;
    use crate::transformer::SQL;

    #[test]
    fn plain_has_one_untracked_segment() {
        let s = TaintedString::plain("héllo");
        assert_eq!(s.len(), 5);
        assert_eq!(s.segments(), &[Segment::new(4, None)]);
        assert!(!s.is_tracked());
        assert!(!s.is_tainted());
    }

    #[test]
    fn empty_string_has_no_segments() {
        let s = TaintedString::default_tainted("");
        assert!(s.is_empty());
        assert!(s.segments().is_empty());
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn safe_is_tracked_but_not_tainted() {
        let s = TaintedString::with_taint("ok", Some(Transformer::safe()));
        assert!(s.is_tracked());
        assert!(!s.is_tainted());
        assert!(TaintedString::default_tainted("x").is_tainted());
    }

    #[test]
    fn concatenation_shifts_right_segments() {
        let s = TaintedString::plain("ab") + &TaintedString::default_tainted("cde") + "f";
        assert_eq!(s, "abcdef");
        let ends: Vec<usize> = s.segments().iter().map(|seg| seg.end).collect();
        assert_eq!(ends, vec![1, 4, 5]);
        assert_eq!(s.taint_at(2), Some(&Transformer::default_policy()));
        assert_eq!(s.taint_at(5), None);
        assert_eq!(s.taint_at(6), None);
    }

    #[test]
    fn add_assign_appends() {
        let mut s = TaintedString::default();
        s += &TaintedString::default_tainted("x");
        s += "y";
        assert_eq!(s.segments().len(), 2);
        assert_eq!(s.to_string(), "xy");
    }

    #[test]
    fn set_taint_replaces_whole_taint() {
        let s = TaintedString::plain("ab") + &TaintedString::default_tainted("cd");
        let safe = s.set_taint(Some(Transformer::safe()));
        assert_eq!(safe.segments(), &[Segment::new(3, Some(Transformer::safe()))]);

        let defaulted = s.mark_default_tainted();
        assert_eq!(defaulted.taint_at(0), Some(&Transformer::default_policy()));
        assert_eq!(s.taint_at(0), None);
    }

    #[test]
    fn set_taint_state_builds_base() {
        let s = TaintedString::plain("q").set_taint_state([(
            SQL,
            ContextPolicy::Sanitizer(SanitizerRef::new("identity")),
        )]);
        let base = s.taint_at(0).and_then(Transformer::as_base).unwrap();
        assert_eq!(base.sanitizer_for(SQL, None).unwrap().name(), "identity");
    }

    #[test]
    fn from_segments_repairs() {
        let s = TaintedString::from_segments("abcd", vec![Segment::new(1, None)]).unwrap();
        assert_eq!(s.taint_at(3), Some(&Transformer::safe()));
    }

    #[test]
    fn effective_taint_unions_segments() {
        let s = TaintedString::plain("a")
            + &TaintedString::default_tainted("b")
            + &TaintedString::with_taint("c", Some(Transformer::safe()));
        assert_eq!(s.effective_taint().unwrap().len(), 2);
        assert!(TaintedString::plain("x").effective_taint().unwrap().is_empty());
    }

    #[test]
    fn sql_transform_sanitizes_tracked_chunks() {
        let ctx = Ctx::new();
        let s = TaintedString::plain("name = '") + &TaintedString::default_tainted("O'Brien") + "'";

        let out = s.transform(SQL, None, &ctx).unwrap();
        assert_eq!(out, "name = 'O''Brien'");
        assert_eq!(out.taint_at(0), None);
        assert_eq!(out.taint_at(9), Some(&Transformer::safe()));
    }

    #[test]
    fn html_rendering_is_resanitized_for_sql() {
        let ctx = Ctx::new();
        let name = TaintedString::default_tainted("O'Brien");
        let html = name.transform(HTML, None, &ctx).unwrap();
        assert_eq!(html, "O&#39;Brien");

        let sql = html.transform(SQL, None, &ctx).unwrap();
        assert_eq!(sql, "O''Brien");
        assert_eq!(sql.segments(), &[Segment::new(7, Some(Transformer::safe()))]);
    }

    #[test]
    fn rollback_keeps_untracked_neighbours_untracked() {
        let ctx = Ctx::new();
        let doc = TaintedString::plain("<p>") + &TaintedString::default_tainted("a'b");
        let html = doc.transform(HTML, None, &ctx).unwrap();
        let query = TaintedString::plain("x = '") + &html + "'";

        let out = query.transform(SQL, None, &ctx).unwrap();
        assert_eq!(out, "x = '<p>a''b'");
        assert_eq!(out.taint_at(5), None);
        assert_eq!(out.taint_at(8), Some(&Transformer::safe()));
        assert!(!out.is_tainted());
    }

    #[test]
    fn untracked_transform_is_noop() {
        let ctx = Ctx::new();
        let s = TaintedString::plain("a'b");
        assert_eq!(s.transform(SQL, None, &ctx).unwrap(), s);
    }

    #[test]
    fn serde_validates_segments() {
        let s = TaintedString::plain("ab") + &TaintedString::default_tainted("cd");
        let json = serde_json::to_string(&s).unwrap();
        let back: TaintedString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);

        let bad = r#"{"text":"ab","segments":[{"end":1,"transformer":null},{"end":1,"transformer":{"kind":"identity"}}]}"#;
        assert!(serde_json::from_str::<TaintedString>(bad).is_err());
    }

    #[test]
    fn collects_from_parts() {
        let s: TaintedString = ["a", "b"].into_iter().map(TaintedString::default_tainted).collect();
        assert_eq!(s, "ab");
        assert_eq!(s.segments().len(), 2);
    }

    mod proptests {
        use super::*;
        use crate::segment::is_well_formed;
        use crate::test_utils::arb_tainted_string;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn concatenation_keeps_invariants(
                a in arb_tainted_string(),
                b in arb_tainted_string(),
            ) {
                let joined = a.clone() + &b;
                prop_assert_eq!(joined.len(), a.len() + b.len());
                prop_assert!(is_well_formed(joined.len(), joined.segments()));
                for i in 0..b.len() {
                    prop_assert_eq!(joined.taint_at(a.len() + i), b.taint_at(i));
                }
            }

            #[test]
            fn length_matches_chars(s in arb_tainted_string()) {
                prop_assert_eq!(s.len(), s.as_str().chars().count());
            }
        }
    }
}
