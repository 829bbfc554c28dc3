//! Successor strings: `succ`, `next` and `upto`.

use crate::chunk::compress_taint;
use crate::compose::taint_union;
use crate::error::Result;
use crate::tainted::TaintedString;

fn next_char(c: char) -> Option<char> {
    match c {
        '\u{D7FF}' => Some('\u{E000}'),
        c => char::from_u32(c as u32 + 1),
    }
}

/// The successor of `text`: the rightmost alphanumeric is incremented,
/// carrying leftwards through alphanumerics, and a carry out of the
/// leftmost one inserts a new digit or letter. Without alphanumerics the
/// rightmost character is incremented.
pub(crate) fn succ_text(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let alnums: Vec<usize> = (0..chars.len())
        .filter(|&i| chars[i].is_ascii_alphanumeric())
        .collect();
    if alnums.is_empty() {
        let mut i = chars.len();
        loop {
            if i == 0 {
                chars.insert(0, '\u{1}');
                break;
            }
            i -= 1;
            match next_char(chars[i]) {
                Some(n) => {
                    chars[i] = n;
                    break;
                }
                None => chars[i] = '\0',
            }
        }
        return chars.into_iter().collect();
    }

    for &i in alnums.iter().rev() {
        let (next, carry) = match chars[i] {
            'z' => ('a', Some('a')),
            'Z' => ('A', Some('A')),
            '9' => ('0', Some('1')),
            c => (next_char(c).unwrap_or(c), None),
        };
        chars[i] = next;
        let Some(inserted) = carry else {
            return chars.into_iter().collect();
        };
        if i == alnums[0] {
            chars.insert(i, inserted);
        }
    }
    chars.into_iter().collect()
}

impl TaintedString {
    /// The successor string, as in `"az"` to `"ba"` or `"zz"` to `"aaa"`.
    ///
    /// Characters before and after the changed region keep their taint. The
    /// changed region takes the effective taint of the whole string, since a
    /// carry can come from anywhere to its right.
    ///
    /// # Errors
    ///
    /// Fails if the string contains a rollback segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{TaintedString, Transformer};
    ///
    /// let s = TaintedString::plain("X") + &TaintedString::default_tainted("z9");
    /// let next = s.succ().unwrap();
    /// assert_eq!(next, "Ya0");
    /// assert_eq!(next.taint_at(0), Some(&Transformer::default_policy()));
    ///
    /// assert_eq!(TaintedString::plain("a-9").succ().unwrap(), "b-0");
    /// ```
    pub fn succ(&self) -> Result<TaintedString> {
        let text = succ_text(self.as_str());
        if !self.is_tracked() {
            return Ok(TaintedString::plain(text));
        }
        let blended = self.effective_taint()?.into_transformer();

        let old: Vec<char> = self.as_str().chars().collect();
        let new: Vec<char> = text.chars().collect();
        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let suffix = old[prefix..]
            .iter()
            .rev()
            .zip(new[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let mut out = self.rebuild(..prefix);
        let changed: String = new[prefix..new.len() - suffix].iter().collect();
        out.push_chunk(&changed, blended);
        out.push_tainted(&self.rebuild(old.len() - suffix..));
        Ok(compress_taint(&out))
    }

    /// Same as [`succ`](Self::succ).
    ///
    /// # Errors
    ///
    /// Fails if the string contains a rollback segment.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Result<TaintedString> {
        self.succ()
    }

    /// Every string from `self` to `last` in successor order.
    ///
    /// Two single ASCII characters give a character range and two digit
    /// strings a numeric range padded to the width of `self`. Otherwise the
    /// sequence follows [`succ`](Self::succ) and ends at `last` or once a
    /// value grows longer than `last`. Every value carries the union of the
    /// taints of both endpoints.
    ///
    /// # Errors
    ///
    /// Fails if either endpoint contains a rollback segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let from = TaintedString::default_tainted("a8");
    /// let values = from.upto(&TaintedString::plain("b1"), false).unwrap();
    /// assert_eq!(values, ["a8", "a9", "b0", "b1"]);
    /// assert!(values.iter().all(TaintedString::is_tainted));
    ///
    /// let numbers = TaintedString::plain("9").upto(&TaintedString::plain("11"), true).unwrap();
    /// assert_eq!(numbers, ["9", "10"]);
    /// ```
    pub fn upto(&self, last: &TaintedString, exclusive: bool) -> Result<Vec<TaintedString>> {
        let taint = taint_union(
            self.segments()
                .iter()
                .chain(last.segments())
                .map(|s| s.transformer.as_ref()),
        )?
        .into_transformer();
        Ok(upto_texts(self.as_str(), last.as_str(), exclusive)
            .into_iter()
            .map(|text| TaintedString::with_taint(text, taint.clone()))
            .collect())
    }
}

fn upto_texts(first: &str, last: &str, exclusive: bool) -> Vec<String> {
    let mut a = first.chars();
    let mut b = last.chars();
    if let (Some(x), None, Some(y), None) = (a.next(), a.next(), b.next(), b.next()) {
        if x.is_ascii() && y.is_ascii() {
            let chars: Vec<char> = if exclusive { (x..y).collect() } else { (x..=y).collect() };
            return chars.into_iter().map(String::from).collect();
        }
    }

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if digits(first) && digits(last) {
        if let (Ok(x), Ok(y)) = (first.parse::<u64>(), last.parse::<u64>()) {
            let width = first.len();
            let end = if exclusive { y.saturating_sub(1) } else { y };
            if x > end || (exclusive && y == 0) {
                return Vec::new();
            }
            return (x..=end).map(|n| format!("{n:0width$}")).collect();
        }
    }

    if first > last || (exclusive && first == last) {
        return Vec::new();
    }
    let max = last.chars().count();
    let mut out = Vec::new();
    let mut current = first.to_string();
    loop {
        if exclusive && current == last {
            break;
        }
        let len = current.chars().count();
        if len == 0 || len > max {
            break;
        }
        out.push(current.clone());
        if current == last {
            break;
        }
        current = succ_text(&current);
    }
    out
}
