//! The chunk algebra every string operation is built from.
//!
//! A chunk is a maximal run of characters sharing one segment. Operations
//! decompose their inputs into chunks, work on the text, and reassemble a new
//! [`TaintedString`] from rebuilt ranges.

use std::ops::{Bound, Range, RangeBounds};

use crate::compose::{blendable_members, ComposedTransformer};
use crate::segment::Segment;
use crate::tainted::TaintedString;
use crate::transformer::{ContextPolicy, Transformer};

/// An owned piece of text with the taint it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The chunk's characters
    pub text: String,
    /// The chunk's taint
    pub transformer: Option<Transformer>,
}

impl Chunk {
    /// Creates a chunk.
    pub fn new(text: impl Into<String>, transformer: Option<Transformer>) -> Self {
        Self {
            text: text.into(),
            transformer,
        }
    }
}

/// A borrowed chunk of a [`TaintedString`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRef<'a> {
    /// The chunk's characters
    pub text: &'a str,
    /// Char index of the first character
    pub start: usize,
    /// The chunk's taint
    pub transformer: Option<&'a Transformer>,
}

impl ChunkRef<'_> {
    /// Char range covered by the chunk.
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.text.chars().count()
    }

    /// Copies the chunk out of its string.
    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.text, self.transformer.cloned())
    }
}

/// Iterator over the chunks of a [`TaintedString`].
///
/// Created by [`TaintedString::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    segments: std::slice::Iter<'a, Segment>,
    next_start: usize,
}

impl<'a> Chunks<'a> {
    pub(crate) fn new(text: &'a str, segments: &'a [Segment]) -> Self {
        Self {
            rest: text,
            segments: segments.iter(),
            next_start: 0,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = ChunkRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.segments.next()?;
        let count = segment.end + 1 - self.next_start;
        let split = byte_offset(self.rest, count);
        let (text, rest) = self.rest.split_at(split);
        let chunk = ChunkRef {
            text,
            start: self.next_start,
            transformer: segment.transformer.as_ref(),
        };
        self.rest = rest;
        self.next_start = segment.end + 1;
        Some(chunk)
    }
}

/// Byte offset of the char at `index`, or `text.len()` past the end.
pub(crate) fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map_or(text.len(), |(b, _)| b)
}

/// Splits a string into its chunks.
pub fn decompose(string: &TaintedString) -> Vec<Chunk> {
    string.chunks().map(|c| c.to_chunk()).collect()
}

/// Concatenates chunks into a tainted string. Empty chunks are skipped.
///
/// # Examples
///
/// ```
/// use policy_taint::{compose, decompose, Chunk, TaintedString, Transformer};
///
/// let s = compose([
///     Chunk::new("safe ", Some(Transformer::safe())),
///     Chunk::new("", None),
///     Chunk::new("user", Some(Transformer::default_policy())),
/// ]);
/// assert_eq!(s, "safe user");
/// assert_eq!(s.segments().len(), 2);
/// assert_eq!(compose(decompose(&s)), s);
/// ```
pub fn compose<I>(chunks: I) -> TaintedString
where
    I: IntoIterator<Item = Chunk>,
{
    let mut out = TaintedString::default();
    for chunk in chunks {
        out.push_chunk(&chunk.text, chunk.transformer);
    }
    out
}

/// Rebuilds the characters of `text` in `range`, each keeping the taint of
/// the segment it falls in.
///
/// `range` is in chars and is clamped to the text. Characters beyond the last
/// segment are tagged with a safe transformer.
///
/// # Examples
///
/// ```
/// use policy_taint::{rebuild_across_range, TaintedString, Transformer};
///
/// let s = TaintedString::plain("hello ") + &TaintedString::default_tainted("world");
/// let mid = rebuild_across_range(s.as_str(), s.segments(), 4..=7);
/// assert_eq!(mid, "o wo");
/// assert_eq!(mid.taint_at(0), None);
/// assert_eq!(mid.taint_at(3), Some(&Transformer::default_policy()));
/// ```
pub fn rebuild_across_range<R>(text: &str, segments: &[Segment], range: R) -> TaintedString
where
    R: RangeBounds<usize>,
{
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = offsets.len() - 1;

    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    }
    .min(char_len);
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => char_len,
    }
    .min(char_len);

    let mut out = TaintedString::default();
    if start >= end {
        return out;
    }

    let mut seg_start = 0;
    for segment in segments {
        let lo = start.max(seg_start);
        let hi = end.min(segment.end + 1);
        if lo < hi {
            out.push_chunk(&text[offsets[lo]..offsets[hi]], segment.transformer.clone());
        }
        seg_start = segment.end + 1;
        if seg_start >= end {
            return out;
        }
    }

    let lo = start.max(seg_start);
    if lo < end {
        out.push_chunk(&text[offsets[lo]..offsets[end]], Some(Transformer::safe()));
    }
    out
}

/// Merges adjacent segments carrying value-equal transformers.
pub fn compress_taint(string: &TaintedString) -> TaintedString {
    let mut segments: Vec<Segment> = Vec::with_capacity(string.segments().len());
    for segment in string.segments() {
        match segments.last_mut() {
            Some(last) if last.transformer == segment.transformer => last.end = segment.end,
            _ => segments.push(segment.clone()),
        }
    }
    TaintedString::from_parts(string.as_str().to_string(), segments)
}

/// What a transformer says about one top-level context.
#[derive(Debug, PartialEq)]
enum Projection<'a> {
    Untracked,
    Opaque(&'a Transformer),
    Policies(Vec<Option<&'a ContextPolicy>>),
}

fn project<'a>(transformer: Option<&'a Transformer>, dimension: &str) -> Projection<'a> {
    match transformer {
        None => Projection::Untracked,
        Some(Transformer::Base(b)) => Projection::Policies(vec![b.policy(dimension)]),
        Some(Transformer::Composed(c)) => {
            let mut policies: Vec<Option<&ContextPolicy>> = Vec::new();
            for member in c.members() {
                let policy = member.policy(dimension);
                if !policies.contains(&policy) {
                    policies.push(policy);
                }
            }
            Projection::Policies(policies)
        }
        Some(t) => Projection::Opaque(t),
    }
}

fn merge_along(left: &Option<Transformer>, right: &Option<Transformer>) -> Option<Transformer> {
    if left == right {
        return left.clone();
    }
    let members = match (left, right) {
        (Some(l), Some(r)) => blendable_members(l)
            .into_iter()
            .flatten()
            .chain(blendable_members(r).into_iter().flatten()),
        _ => return left.clone(),
    };
    ComposedTransformer::from_bases(members).into_transformer()
}

/// Merges adjacent segments whose transformers agree along `dimension`.
///
/// Two base or composed transformers agree when they hold the same policies
/// for that top-level context; the merged segment carries the union of both.
/// Untracked segments merge only with untracked ones, identity and rollback
/// transformers only with value-equal neighbours.
///
/// # Examples
///
/// ```
/// use policy_taint::{
///     special_compress_taint, BaseTransformer, ContextPolicy, SanitizerRef, TaintedString, HTML,
///     SQL,
/// };
///
/// let a = BaseTransformer::default_policy();
/// let b = a.clone().with_policy(SQL, ContextPolicy::Sanitizer(SanitizerRef::new("identity")));
/// let s = TaintedString::with_taint("ab", Some(a.into()))
///     + &TaintedString::with_taint("cd", Some(b.into()));
///
/// assert_eq!(special_compress_taint(&s, HTML).segments().len(), 1);
/// assert_eq!(special_compress_taint(&s, SQL).segments().len(), 2);
/// ```
pub fn special_compress_taint(string: &TaintedString, dimension: &str) -> TaintedString {
    let mut segments: Vec<Segment> = Vec::with_capacity(string.segments().len());
    for segment in string.segments() {
        if let Some(last) = segments.last_mut() {
            let agree = project(last.transformer.as_ref(), dimension)
                == project(segment.transformer.as_ref(), dimension);
            if agree {
                last.transformer = merge_along(&last.transformer, &segment.transformer);
                last.end = segment.end;
                continue;
            }
        }
        segments.push(segment.clone());
    }
    TaintedString::from_parts(string.as_str().to_string(), segments)
}
