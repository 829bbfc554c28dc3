//! Patterns and match results over tainted strings.

use std::ops::Range;

use regex::Regex;

use crate::chunk::rebuild_across_range;
use crate::error::Result;
use crate::tainted::TaintedString;

/// What a search operation looks for.
///
/// # Examples
///
/// ```
/// use policy_taint::Pattern;
///
/// let vowels = Pattern::regex("[aeiou]").unwrap();
/// let comma = Pattern::from(",");
/// assert!(Pattern::regex("(").is_err());
/// # let _ = (vowels, comma);
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches a fixed string
    Literal(String),
    /// Matches a regular expression
    Regex(Regex),
}

impl Pattern {
    /// Compiles a regular expression pattern.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::InvalidPattern`](crate::TaintError::InvalidPattern)
    /// if `source` does not compile.
    pub fn regex(source: &str) -> Result<Self> {
        Ok(Pattern::Regex(Regex::new(source)?))
    }

    /// A fixed-string pattern.
    pub fn literal(text: impl Into<String>) -> Self {
        Pattern::Literal(text.into())
    }

    fn group_index(&self, name: &str) -> Option<usize> {
        match self {
            Pattern::Literal(_) => None,
            Pattern::Regex(r) => r.capture_names().position(|n| n == Some(name)),
        }
    }

    /// Byte ranges of every capture group of every match, left to right.
    pub(crate) fn raw_matches(&self, text: &str) -> Vec<Vec<Option<Range<usize>>>> {
        match self {
            Pattern::Literal(lit) => text
                .match_indices(lit.as_str())
                .map(|(start, m)| vec![Some(start..start + m.len())])
                .collect(),
            Pattern::Regex(r) => r
                .captures_iter(text)
                .map(|caps| caps.iter().map(|g| g.map(|m| m.range())).collect())
                .collect(),
        }
    }

    /// Every match in `source`.
    pub(crate) fn find_iter<'a>(&'a self, source: &'a TaintedString) -> Vec<TaintedMatch<'a>> {
        let index = CharIndex::new(source.as_str());
        self.raw_matches(source.as_str())
            .into_iter()
            .map(|groups| TaintedMatch {
                source,
                pattern: self,
                groups: groups
                    .into_iter()
                    .map(|g| g.map(|r| index.char_range(r)))
                    .collect(),
            })
            .collect()
    }

    /// The first match in `source`, if any.
    pub(crate) fn find<'a>(&'a self, source: &'a TaintedString) -> Option<TaintedMatch<'a>> {
        let text = source.as_str();
        let groups: Vec<Option<Range<usize>>> = match self {
            Pattern::Literal(lit) => {
                let start = text.find(lit.as_str())?;
                vec![Some(start..start + lit.len())]
            }
            Pattern::Regex(r) => r.captures(text)?.iter().map(|g| g.map(|m| m.range())).collect(),
        };
        let index = CharIndex::new(text);
        Some(TaintedMatch {
            source,
            pattern: self,
            groups: groups
                .into_iter()
                .map(|g| g.map(|r| index.char_range(r)))
                .collect(),
        })
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::Literal(text.to_string())
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Pattern::Literal(text)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

/// Byte-offset to char-index conversion for one string.
pub(crate) struct CharIndex {
    offsets: Vec<usize>,
}

impl CharIndex {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            offsets: text
                .char_indices()
                .map(|(b, _)| b)
                .chain(std::iter::once(text.len()))
                .collect(),
        }
    }

    /// Char index of the char starting at byte `byte`.
    pub(crate) fn char_at(&self, byte: usize) -> usize {
        match self.offsets.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }

    pub(crate) fn char_range(&self, bytes: Range<usize>) -> Range<usize> {
        self.char_at(bytes.start)..self.char_at(bytes.end)
    }
}

/// One match of a [`Pattern`] against a [`TaintedString`].
///
/// Every accessor rebuilds the requested range from the source, so the
/// returned strings carry the taint of the characters they were cut from.
/// A match borrows its source and is only valid while the operation that
/// produced it runs.
///
/// # Examples
///
/// ```
/// use policy_taint::{Pattern, TaintedString};
///
/// let s = TaintedString::default_tainted("key=value");
/// let pattern = Pattern::regex(r"(?P<k>\w+)=(\w+)").unwrap();
/// let m = s.find(&pattern).unwrap();
///
/// assert_eq!(m.get(0).unwrap(), "key=value");
/// assert_eq!(m.name("k").unwrap(), "key");
/// assert_eq!(m.get(2).unwrap(), "value");
/// assert!(m.get(2).unwrap().is_tainted());
/// ```
#[derive(Debug, Clone)]
pub struct TaintedMatch<'a> {
    source: &'a TaintedString,
    pattern: &'a Pattern,
    groups: Vec<Option<Range<usize>>>,
}

impl<'a> TaintedMatch<'a> {
    /// The string that was searched.
    pub fn source(&self) -> &'a TaintedString {
        self.source
    }

    /// Number of groups, including the whole match at index 0.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always `false`: group 0 is always present.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Char range of group `index`, if it participated.
    pub fn range(&self, index: usize) -> Option<Range<usize>> {
        self.groups.get(index).cloned().flatten()
    }

    /// Char range of the whole match.
    pub fn full_range(&self) -> Range<usize> {
        self.range(0).unwrap_or(0..0)
    }

    /// Group `index`, rebuilt from the source.
    pub fn get(&self, index: usize) -> Option<TaintedString> {
        self.range(index).map(|r| self.rebuild(r))
    }

    /// The named group `name`, rebuilt from the source.
    pub fn name(&self, name: &str) -> Option<TaintedString> {
        self.get(self.pattern.group_index(name)?)
    }

    /// Char range of the named group `name`.
    pub fn name_range(&self, name: &str) -> Option<Range<usize>> {
        self.range(self.pattern.group_index(name)?)
    }

    /// Everything before the match.
    pub fn pre_match(&self) -> TaintedString {
        self.rebuild(0..self.full_range().start)
    }

    /// Everything after the match.
    pub fn post_match(&self) -> TaintedString {
        self.rebuild(self.full_range().end..self.source.len())
    }

    /// Groups 1.., each rebuilt if it participated.
    pub fn captures(&self) -> Vec<Option<TaintedString>> {
        (1..self.groups.len()).map(|i| self.get(i)).collect()
    }

    fn rebuild(&self, range: Range<usize>) -> TaintedString {
        rebuild_across_range(self.source.as_str(), self.source.segments(), range)
    }
}
