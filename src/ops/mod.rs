//! Taint-aware string operations.
//!
//! Each operation rebuilds the segments of its result from the segments of
//! its inputs. Untracked inputs take a fast path through plain `str`
//! operations.

mod escape;
mod format;
mod pad;
mod slice;
mod split;
mod substitute;
mod succ;
mod translate;
mod unpack;

pub use slice::{ScanItem, Slice};
pub use unpack::Unpacked;

use crate::chunk::rebuild_across_range;
use crate::context::Ctx;
use crate::error::Result;
use crate::html;
use crate::tainted::TaintedString;
use crate::transformer::{Transformer, SQL};

/// Characters removed by the strip family.
fn is_strip_space(c: char) -> bool {
    matches!(c, '\0' | '\t' | '\n' | '\x0b' | '\x0c' | '\r' | ' ')
}

impl TaintedString {
    /// Rebuilds the characters in `range` (char indices, clamped).
    pub fn rebuild<R>(&self, range: R) -> TaintedString
    where
        R: std::ops::RangeBounds<usize>,
    {
        rebuild_across_range(self.as_str(), self.segments(), range)
    }

    /// Applies a text function chunk by chunk, keeping each chunk's taint.
    ///
    /// `f` receives the char index of the chunk start and its text.
    fn map_chunks<F>(&self, mut f: F) -> TaintedString
    where
        F: FnMut(usize, &str) -> String,
    {
        if !self.is_tracked() {
            return TaintedString::plain(f(0, self.as_str()));
        }
        let mut out = TaintedString::default();
        for chunk in self.chunks() {
            out.push_chunk(&f(chunk.start, chunk.text), chunk.transformer.cloned());
        }
        out
    }

    /// `n` copies of the string, each keeping the original segments.
    pub fn repeat(&self, n: usize) -> TaintedString {
        let mut out = TaintedString::default();
        for _ in 0..n {
            out.push_tainted(self);
        }
        out
    }

    /// Uppercases the string chunk by chunk.
    ///
    /// Folds that change length (`ß` to `SS`) stay inside their chunk.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::plain("stra") + &TaintedString::default_tainted("ße");
    /// let up = s.upcase();
    /// assert_eq!(up, "STRASSE");
    /// assert_eq!(up.segments()[1].end, 6);
    /// ```
    pub fn upcase(&self) -> TaintedString {
        self.map_chunks(|_, text| text.to_uppercase())
    }

    /// Lowercases the string chunk by chunk.
    pub fn downcase(&self) -> TaintedString {
        self.map_chunks(|_, text| text.to_lowercase())
    }

    /// Swaps the case of every character.
    pub fn swapcase(&self) -> TaintedString {
        self.map_chunks(|_, text| {
            text.chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect()
        })
    }

    /// Uppercases the first character and lowercases the rest.
    pub fn capitalize(&self) -> TaintedString {
        self.map_chunks(|start, text| {
            let mut chars = text.chars();
            match (start, chars.next()) {
                (0, Some(first)) => first
                    .to_uppercase()
                    .chain(chars.as_str().to_lowercase().chars())
                    .collect(),
                _ => text.to_lowercase(),
            }
        })
    }

    /// Removes leading whitespace and NUL characters.
    pub fn lstrip(&self) -> TaintedString {
        let skip = self.as_str().chars().take_while(|c| is_strip_space(*c)).count();
        self.rebuild(skip..)
    }

    /// Removes trailing whitespace and NUL characters.
    pub fn rstrip(&self) -> TaintedString {
        let skip = self.as_str().chars().rev().take_while(|c| is_strip_space(*c)).count();
        self.rebuild(..self.len() - skip)
    }

    /// Removes leading and trailing whitespace.
    pub fn strip(&self) -> TaintedString {
        self.lstrip().rstrip()
    }

    /// Removes the last character, or a trailing `\r\n` pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::default_tainted("abcde");
    /// assert_eq!(s.chop().chop().chop(), "ab");
    /// assert_eq!(TaintedString::plain("line\r\n").chop(), "line");
    /// ```
    pub fn chop(&self) -> TaintedString {
        let drop = if self.as_str().ends_with("\r\n") { 2 } else { 1 };
        self.rebuild(..self.len().saturating_sub(drop))
    }

    /// Removes a trailing record separator.
    ///
    /// With no separator, removes one trailing `\n`, `\r\n` or `\r`. An empty
    /// separator removes every trailing newline; any other separator is
    /// removed once if the string ends with it.
    pub fn chomp(&self, separator: Option<&str>) -> TaintedString {
        let text = self.as_str();
        let drop = match separator {
            None => {
                if text.ends_with("\r\n") {
                    2
                } else if text.ends_with('\n') || text.ends_with('\r') {
                    1
                } else {
                    0
                }
            }
            Some("") => {
                let mut rest = text;
                let mut n = 0;
                loop {
                    if let Some(r) = rest.strip_suffix("\r\n") {
                        rest = r;
                        n += 2;
                    } else if let Some(r) = rest.strip_suffix('\n') {
                        rest = r;
                        n += 1;
                    } else {
                        break n;
                    }
                }
            }
            Some(sep) if text.ends_with(sep) => sep.chars().count(),
            Some(_) => 0,
        };
        self.rebuild(..self.len() - drop)
    }

    /// Reverses the string; each chunk is reversed in place and the chunk
    /// order is reversed.
    pub fn reverse(&self) -> TaintedString {
        let chunks: Vec<_> = self.chunks().collect();
        let mut out = TaintedString::default();
        for chunk in chunks.into_iter().rev() {
            let reversed: String = chunk.text.chars().rev().collect();
            out.push_chunk(&reversed, chunk.transformer.cloned());
        }
        out
    }

    /// Iterates over the characters, each carrying its own taint.
    pub fn chars(&self) -> impl Iterator<Item = TaintedString> + '_ {
        self.chunks().flat_map(|chunk| {
            chunk
                .text
                .chars()
                .map(move |c| TaintedString::with_taint(c.to_string(), chunk.transformer.cloned()))
        })
    }

    /// Splits into lines, each keeping its trailing `\n`.
    pub fn lines(&self) -> Vec<TaintedString> {
        self.each_line("\n")
    }

    /// Splits into records ending in `separator`, each keeping its
    /// separator.
    ///
    /// Consecutive separators stay with the record they follow. An empty
    /// separator selects paragraph mode, where records end in a run of two
    /// or more newlines.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::default_tainted("a;b;;c");
    /// assert_eq!(s.each_line(";"), ["a;", "b;;", "c"]);
    ///
    /// let text = TaintedString::plain("p1\nl2\n\n\np2");
    /// assert_eq!(text.each_line(""), ["p1\nl2\n\n\n", "p2"]);
    /// ```
    pub fn each_line(&self, separator: &str) -> Vec<TaintedString> {
        let (separator, min_run) = match separator {
            "" => ("\n", 2),
            sep => (sep, 1),
        };
        let chars: Vec<char> = self.as_str().chars().collect();
        let sep: Vec<char> = separator.chars().collect();
        let at_sep = |i: usize| chars.len() >= i + sep.len() && chars[i..i + sep.len()] == sep[..];

        let mut out = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < chars.len() {
            if !at_sep(i) {
                i += 1;
                continue;
            }
            let mut end = i + sep.len();
            let mut run = 1;
            while at_sep(end) {
                end += sep.len();
                run += 1;
            }
            if run >= min_run {
                out.push(self.rebuild(start..end));
                start = end;
            }
            i = end;
        }
        if start < chars.len() {
            out.push(self.rebuild(start..));
        }
        out
    }

    /// Iterates over the characters paired with their taint.
    pub(crate) fn tainted_chars(&self) -> impl Iterator<Item = (char, Option<&Transformer>)> + '_ {
        self.chunks()
            .flat_map(|chunk| chunk.text.chars().map(move |c| (c, chunk.transformer)))
    }

    /// Renders the string for SQL as plain text.
    ///
    /// Chunks whose policy names an `SQL` entry are sanitized with it; every
    /// other chunk is copied as is. Prefer [`transform`](Self::transform),
    /// which also tags the result.
    ///
    /// # Errors
    ///
    /// Fails on an unregistered sanitizer or on non-commuting blended
    /// policies.
    pub fn pull_sql_safe(&self, ctx: &Ctx) -> Result<String> {
        let restored = html::run_rollback(self);
        let mut out = String::with_capacity(restored.as_str().len());
        for chunk in restored.chunks() {
            let owes_sql = match chunk.transformer {
                Some(Transformer::Base(b)) => b.policy(SQL).is_some(),
                Some(Transformer::Composed(c)) => {
                    c.members().iter().any(|b| b.policy(SQL).is_some())
                }
                _ => false,
            };
            match chunk.transformer {
                Some(t) if owes_sql => out.push_str(&t.transform(chunk.text, SQL, None, ctx)?),
                _ => out.push_str(chunk.text),
            }
        }
        Ok(out)
    }
}
