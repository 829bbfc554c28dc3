//! Indexing, searching and splicing.

use std::ops::Range;

use crate::pattern::{Pattern, TaintedMatch};
use crate::tainted::TaintedString;

/// How to select part of a string.
///
/// Negative indices count from the end. Selections that fall outside the
/// string resolve to nothing rather than failing.
#[derive(Debug, Clone)]
pub enum Slice {
    /// A single character
    At(isize),
    /// `len` characters starting at `start`
    Len(isize, isize),
    /// Characters `start..=end`
    Inclusive(isize, isize),
    /// Characters `start..end`
    Exclusive(isize, isize),
    /// The first match of a pattern
    Match(Pattern),
    /// A capture group of the first match
    Group(Pattern, usize),
    /// A named capture group of the first match
    Named(Pattern, String),
}

fn absolute(index: isize, len: usize) -> Option<usize> {
    if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        Some(index as usize)
    }
}

impl Slice {
    /// Resolves the selection to a char range of `s`.
    pub fn resolve(&self, s: &TaintedString) -> Option<Range<usize>> {
        let len = s.len();
        match self {
            Slice::At(i) => {
                let i = absolute(*i, len)?;
                (i < len).then(|| i..i + 1)
            }
            Slice::Len(start, count) => {
                let start = absolute(*start, len)?;
                if start > len || *count < 0 {
                    return None;
                }
                Some(start..len.min(start + *count as usize))
            }
            Slice::Inclusive(start, end) | Slice::Exclusive(start, end) => {
                let start = absolute(*start, len)?;
                if start > len {
                    return None;
                }
                let inclusive = matches!(self, Slice::Inclusive(..));
                let end = match absolute(*end, len) {
                    Some(e) if inclusive => e + 1,
                    Some(e) => e,
                    None => return Some(start..start),
                };
                Some(start..end.clamp(start, len))
            }
            Slice::Match(pattern) => pattern.find(s).map(|m| m.full_range()),
            Slice::Group(pattern, group) => pattern.find(s)?.range(*group),
            Slice::Named(pattern, name) => pattern.find(s)?.name_range(name),
        }
    }
}

/// One result of [`TaintedString::scan`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanItem {
    /// The whole match, for patterns without capture groups
    Match(TaintedString),
    /// Every capture group, for patterns with groups
    Groups(Vec<Option<TaintedString>>),
}

impl TaintedString {
    /// Returns the selected part of the string, or `None` if the selection
    /// falls outside it.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{Pattern, Slice, TaintedString};
    ///
    /// let a = TaintedString::default_tainted("hello there");
    /// assert_eq!(a.slice(&Slice::At(1)).unwrap(), "e");
    /// assert_eq!(a.slice(&Slice::Len(-3, 2)).unwrap(), "er");
    /// assert_eq!(a.slice(&Slice::Inclusive(-4, -2)).unwrap(), "her");
    /// assert_eq!(a.slice(&Slice::Inclusive(-2, -4)).unwrap(), "");
    /// assert!(a.slice(&Slice::Inclusive(12, -1)).is_none());
    /// assert_eq!(a.slice(&Slice::Match(Pattern::from("lo"))).unwrap(), "lo");
    /// assert!(a.slice(&Slice::Match(Pattern::from("bye"))).is_none());
    /// ```
    pub fn slice(&self, selection: &Slice) -> Option<TaintedString> {
        selection.resolve(self).map(|r| self.rebuild(r))
    }

    /// Removes the selected part from the string and returns it.
    ///
    /// Leaves the string untouched and returns `None` if the selection falls
    /// outside it.
    pub fn take_slice(&mut self, selection: &Slice) -> Option<TaintedString> {
        let range = selection.resolve(self)?;
        let taken = self.rebuild(range.clone());
        let rest = self.rebuild(..range.start) + &self.rebuild(range.end..);
        *self = rest;
        Some(taken)
    }

    /// Returns a copy with the selected part replaced by `replacement`,
    /// which keeps its own taint.
    pub fn replace_slice(
        &self,
        selection: &Slice,
        replacement: &TaintedString,
    ) -> Option<TaintedString> {
        let range = selection.resolve(self)?;
        Some(self.rebuild(..range.start) + replacement + &self.rebuild(range.end..))
    }

    /// Inserts `other` before the character at `index`; a negative index
    /// inserts after the character counted from the end.
    ///
    /// Returns `None` if the index is outside the string.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::plain("abcd");
    /// let x = TaintedString::default_tainted("X");
    /// assert_eq!(s.insert(1, &x).unwrap(), "aXbcd");
    /// assert_eq!(s.insert(-1, &x).unwrap(), "abcdX");
    /// assert_eq!(s.insert(-3, &x).unwrap(), "abXcd");
    /// assert!(s.insert(5, &x).is_none());
    /// ```
    pub fn insert(&self, index: isize, other: &TaintedString) -> Option<TaintedString> {
        let len = self.len();
        let at = if index < 0 {
            absolute(index, len)? + 1
        } else {
            index as usize
        };
        if at > len {
            return None;
        }
        Some(self.rebuild(..at) + other + &self.rebuild(at..))
    }

    /// The first match of `pattern`.
    pub fn find<'a>(&'a self, pattern: &'a Pattern) -> Option<TaintedMatch<'a>> {
        pattern.find(self)
    }

    /// Every match of `pattern`, left to right.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{Pattern, ScanItem, TaintedString};
    ///
    /// let s = TaintedString::plain("cruel world");
    /// let words = s.scan(&Pattern::regex(r"\w+").unwrap());
    /// assert_eq!(words, vec![
    ///     ScanItem::Match("cruel".into()),
    ///     ScanItem::Match("world".into()),
    /// ]);
    ///
    /// let pairs = s.scan(&Pattern::regex("(..)(..)").unwrap());
    /// assert_eq!(pairs[1], ScanItem::Groups(vec![Some("l ".into()), Some("wo".into())]));
    /// ```
    pub fn scan(&self, pattern: &Pattern) -> Vec<ScanItem> {
        pattern
            .find_iter(self)
            .iter()
            .map(|m| {
                if m.len() > 1 {
                    ScanItem::Groups(m.captures())
                } else {
                    ScanItem::Match(m.get(0).unwrap_or_default())
                }
            })
            .collect()
    }

    /// Calls `f` with every match of `pattern`.
    pub fn scan_with<F>(&self, pattern: &Pattern, mut f: F)
    where
        F: FnMut(&TaintedMatch<'_>),
    {
        for m in pattern.find_iter(self) {
            f(&m);
        }
    }

    /// Splits at the first match of `pattern` into the part before, the
    /// match, and the part after. Without a match the whole string comes
    /// first.
    pub fn partition(&self, pattern: &Pattern) -> (TaintedString, TaintedString, TaintedString) {
        match pattern.find(self) {
            Some(m) => (m.pre_match(), m.get(0).unwrap_or_default(), m.post_match()),
            None => (self.clone(), TaintedString::default(), TaintedString::default()),
        }
    }

    /// Like [`partition`](Self::partition) but at the last match. Without a
    /// match the whole string comes last.
    pub fn rpartition(&self, pattern: &Pattern) -> (TaintedString, TaintedString, TaintedString) {
        match pattern.find_iter(self).last() {
            Some(m) => (m.pre_match(), m.get(0).unwrap_or_default(), m.post_match()),
            None => (TaintedString::default(), TaintedString::default(), self.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::Transformer;

    fn hello() -> TaintedString {
        TaintedString::plain("hello ") + &TaintedString::default_tainted("there")
    }

    #[test]
    fn index_forms_follow_ruby_rules() {
        let a = hello();
        assert_eq!(a.slice(&Slice::At(1)).unwrap(), "e");
        assert_eq!(a.slice(&Slice::At(-1)).unwrap(), "e");
        assert!(a.slice(&Slice::At(11)).is_none());
        assert!(a.slice(&Slice::At(-12)).is_none());
        assert_eq!(a.slice(&Slice::Len(1, 3)).unwrap(), "ell");
        assert_eq!(a.slice(&Slice::Len(11, 3)).unwrap(), "");
        assert!(a.slice(&Slice::Len(12, 3)).is_none());
        assert!(a.slice(&Slice::Len(1, -1)).is_none());
        assert_eq!(a.slice(&Slice::Inclusive(1, 3)).unwrap(), "ell");
        assert_eq!(a.slice(&Slice::Exclusive(1, 3)).unwrap(), "el");
        assert_eq!(a.slice(&Slice::Inclusive(6, 100)).unwrap(), "there");
    }

    #[test]
    fn slices_keep_source_taint() {
        let a = hello();
        let s = a.slice(&Slice::Inclusive(4, 7)).unwrap();
        assert_eq!(s, "o th");
        assert_eq!(s.taint_at(0), None);
        assert_eq!(s.taint_at(2), Some(&Transformer::default_policy()));
    }

    #[test]
    fn group_slices() {
        let a = hello();
        let pattern = Pattern::regex(r"(?P<w>t\w+)").unwrap();
        assert_eq!(a.slice(&Slice::Group(pattern.clone(), 1)).unwrap(), "there");
        assert_eq!(a.slice(&Slice::Named(pattern.clone(), "w".into())).unwrap(), "there");
        assert!(a.slice(&Slice::Group(pattern, 2)).is_none());
    }

    #[test]
    fn take_slice_removes_selection() {
        let mut a = hello();
        let taken = a.take_slice(&Slice::Len(0, 6)).unwrap();
        assert_eq!(taken, "hello ");
        assert_eq!(a, "there");
        assert!(a.is_tainted());

        let before = a.clone();
        assert!(a.take_slice(&Slice::At(10)).is_none());
        assert_eq!(a, before);
    }

    #[test]
    fn replace_slice_keeps_replacement_taint() {
        let a = hello();
        let r = a
            .replace_slice(&Slice::Match(Pattern::from("there")), &TaintedString::plain("you"))
            .unwrap();
        assert_eq!(r, "hello you");
        assert!(!r.is_tracked());
    }

    #[test]
    fn partition_and_rpartition() {
        let s = TaintedString::default_tainted("a-b-c");
        let dash = Pattern::from("-");

        let (pre, sep, post) = s.partition(&dash);
        assert_eq!((pre.as_str(), sep.as_str(), post.as_str()), ("a", "-", "b-c"));
        assert!(post.is_tainted());

        let (pre, sep, post) = s.rpartition(&dash);
        assert_eq!((pre.as_str(), sep.as_str(), post.as_str()), ("a-b", "-", "c"));

        let (pre, _, post) = s.partition(&Pattern::from("x"));
        assert_eq!(pre, s);
        assert!(post.is_empty());
        let (pre, _, post) = s.rpartition(&Pattern::from("x"));
        assert!(pre.is_empty());
        assert_eq!(post, s);
    }

    #[test]
    fn scan_with_sees_every_match() {
        let s = TaintedString::default_tainted("a1b2");
        let mut seen = Vec::new();
        s.scan_with(&Pattern::regex(r"\d").unwrap(), |m| {
            seen.push((m.full_range(), m.pre_match().len()));
        });
        assert_eq!(seen, vec![(1..2, 1), (3..4, 3)]);
    }

    #[test]
    fn scan_groups_keep_taint() {
        let s = TaintedString::plain("x=") + &TaintedString::default_tainted("1");
        let items = s.scan(&Pattern::regex(r"(\w)=(\d)").unwrap());
        match &items[0] {
            ScanItem::Groups(groups) => {
                assert!(!groups[0].as_ref().unwrap().is_tracked());
                assert!(groups[1].as_ref().unwrap().is_tainted());
            }
            other => panic!("expected groups, got {other:?}"),
        }
    }
}
