//! Splitting into fields, awk-style or on a pattern.

use crate::pattern::Pattern;
use crate::tainted::TaintedString;

/// Field separators in whitespace mode.
fn is_awk_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

impl TaintedString {
    /// Splits the string into fields, each keeping the taint of the
    /// characters it was cut from.
    ///
    /// With no separator, or a literal `" "`, the string is split on runs of
    /// whitespace and leading whitespace is ignored. An empty pattern splits
    /// into single characters. Capture groups in a regex separator are
    /// returned between the fields they separate.
    ///
    /// A positive `limit` returns at most `limit` fields, the last holding
    /// the unsplit remainder. Zero drops trailing empty fields; a negative
    /// limit keeps them.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{Pattern, TaintedString};
    ///
    /// let s = TaintedString::default_tainted("1,2,,3,4,,");
    /// let comma = Pattern::from(",");
    /// assert_eq!(s.split(Some(&comma), 0), ["1", "2", "", "3", "4"]);
    /// assert_eq!(s.split(Some(&comma), 4), ["1", "2", "", "3,4,,"]);
    /// assert_eq!(s.split(Some(&comma), -4), ["1", "2", "", "3", "4", "", ""]);
    ///
    /// let words = TaintedString::plain(" now's  the time").split(None, 0);
    /// assert_eq!(words, ["now's", "the", "time"]);
    /// ```
    pub fn split(&self, separator: Option<&Pattern>, limit: isize) -> Vec<TaintedString> {
        if self.is_empty() {
            return Vec::new();
        }
        if limit == 1 {
            return vec![self.clone()];
        }

        let mut fields = match separator {
            None => self.split_whitespace_fields(limit),
            Some(Pattern::Literal(lit)) if lit == " " => self.split_whitespace_fields(limit),
            Some(pattern) => self.split_on(pattern, limit),
        };
        if limit == 0 {
            while fields.last().is_some_and(TaintedString::is_empty) {
                fields.pop();
            }
        }
        fields
    }

    fn split_on(&self, pattern: &Pattern, limit: isize) -> Vec<TaintedString> {
        let len = self.len();
        let mut fields = Vec::new();
        let mut beg = 0;
        let mut splits = 0;

        for m in pattern.find_iter(self) {
            if limit > 0 && splits == limit - 1 {
                break;
            }
            let range = m.full_range();
            if range.is_empty() && (range.start == beg || range.start == len) {
                continue;
            }
            fields.push(self.rebuild(beg..range.start));
            fields.extend(m.captures().into_iter().flatten());
            beg = range.end;
            splits += 1;
        }
        fields.push(self.rebuild(beg..len));
        fields
    }

    fn split_whitespace_fields(&self, limit: isize) -> Vec<TaintedString> {
        let chars: Vec<char> = self.as_str().chars().collect();
        let len = chars.len();
        let mut fields = Vec::new();
        let mut i = 0;

        loop {
            while i < len && is_awk_space(chars[i]) {
                i += 1;
            }
            if i == len {
                if limit < 0 && !fields.is_empty() && is_awk_space(chars[len - 1]) {
                    fields.push(TaintedString::default());
                }
                break;
            }
            if limit > 0 && fields.len() as isize == limit - 1 {
                fields.push(self.rebuild(i..len));
                break;
            }
            let start = i;
            while i < len && !is_awk_space(chars[i]) {
                i += 1;
            }
            fields.push(self.rebuild(start..i));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::Transformer;

    fn regex(src: &str) -> Pattern {
        Pattern::regex(src).unwrap()
    }

    #[test]
    fn whitespace_mode_ignores_leading_space() {
        let s = TaintedString::plain(" now's  the time");
        assert_eq!(s.split(None, 0), ["now's", "the", "time"]);
        assert_eq!(s.split(Some(&Pattern::from(" ")), 0), ["now's", "the", "time"]);
    }

    #[test]
    fn whitespace_mode_limits() {
        let s = TaintedString::plain(" a b  c ");
        assert_eq!(s.split(None, 2), ["a", "b  c "]);
        assert_eq!(s.split(None, -1), ["a", "b", "c", ""]);
        assert!(TaintedString::plain("   ").split(None, -1).is_empty());
    }

    #[test]
    fn regex_separator() {
        let s = TaintedString::plain(" now's  the time");
        assert_eq!(s.split(Some(&regex(" ")), 0), ["", "now's", "", "the", "time"]);
        assert_eq!(s.split(Some(&regex(r",\s*")), 0), [" now's  the time"]);
    }

    #[test]
    fn empty_pattern_splits_chars() {
        let s = TaintedString::plain("hi mom");
        assert_eq!(s.split(Some(&regex("")), 0), ["h", "i", " ", "m", "o", "m"]);
        assert_eq!(s.split(Some(&Pattern::from("")), 3), ["h", "i", " mom"]);
    }

    #[test]
    fn optional_whitespace_pattern() {
        let s = TaintedString::plain("hi mom");
        assert_eq!(s.split(Some(&regex(r"\s*")), 0), ["h", "i", "m", "o", "m"]);
    }

    #[test]
    fn limits_on_comma_separated() {
        let s = TaintedString::plain("1,2,,3,4,,");
        let comma = Pattern::from(",");
        assert_eq!(s.split(Some(&comma), 0), ["1", "2", "", "3", "4"]);
        assert_eq!(s.split(Some(&comma), 4), ["1", "2", "", "3,4,,"]);
        assert_eq!(s.split(Some(&comma), -4), ["1", "2", "", "3", "4", "", ""]);
        assert_eq!(s.split(Some(&comma), 1), ["1,2,,3,4,,"]);
    }

    #[test]
    fn capture_groups_are_kept() {
        let s = TaintedString::plain("1-2");
        assert_eq!(s.split(Some(&regex("(-)")), 0), ["1", "-", "2"]);
    }

    #[test]
    fn empty_string_has_no_fields() {
        assert!(TaintedString::default().split(None, 0).is_empty());
        assert!(TaintedString::default().split(Some(&Pattern::from(",")), -1).is_empty());
    }

    #[test]
    fn fields_keep_taint() {
        let s = TaintedString::plain("a,") + &TaintedString::default_tainted("b");
        let fields = s.split(Some(&Pattern::from(",")), 0);
        assert!(!fields[0].is_tracked());
        assert_eq!(fields[1].taint_at(0), Some(&Transformer::default_policy()));
    }
}
