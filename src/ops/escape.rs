//! Quoted, escaped renderings: `inspect` and `dump`.

use crate::chunk::compress_taint;
use crate::tainted::TaintedString;

fn escape(c: char, next: Option<char>, ascii_only: bool) -> Option<String> {
    let named = match c {
        '"' => "\\\"",
        '\\' => "\\\\",
        '\n' => "\\n",
        '\r' => "\\r",
        '\t' => "\\t",
        '\x0c' => "\\f",
        '\x0b' => "\\v",
        '\x08' => "\\b",
        '\x07' => "\\a",
        '\x1b' => "\\e",
        '#' if matches!(next, Some('{' | '$' | '@')) => "\\#",
        '\x7f' => "\\x7F",
        c if c.is_ascii_control() && ascii_only => return Some(format!("\\x{:02X}", c as u32)),
        c if c.is_control() => return Some(format!("\\u{:04X}", c as u32)),
        c if ascii_only && !c.is_ascii() => {
            let code = c as u32;
            return Some(if code > 0xFFFF {
                format!("\\u{{{code:X}}}")
            } else {
                format!("\\u{code:04X}")
            });
        }
        _ => return None,
    };
    Some(named.to_string())
}

impl TaintedString {
    /// A double-quoted rendering with special characters escaped.
    ///
    /// Each escape sequence carries the taint of the character it stands
    /// for; the surrounding quotes are untracked.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::plain("say ") + &TaintedString::default_tainted("\"hé\"\n");
    /// let shown = s.inspect();
    /// assert_eq!(shown, r#""say \"hé\"\n""#);
    /// assert!(shown.is_tainted());
    /// ```
    pub fn inspect(&self) -> TaintedString {
        self.quoted(false)
    }

    /// Like [`inspect`](Self::inspect), but the result is pure ASCII:
    /// everything else is written as a `\u` escape.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// assert_eq!(TaintedString::plain("é\u{1}").dump(), r#""\u00E9\x01""#);
    /// ```
    pub fn dump(&self) -> TaintedString {
        self.quoted(true)
    }

    fn quoted(&self, ascii_only: bool) -> TaintedString {
        let chars: Vec<_> = self.tainted_chars().collect();
        let mut out = TaintedString::plain("\"");
        for (i, (c, taint)) in chars.iter().enumerate() {
            let next = chars.get(i + 1).map(|(n, _)| *n);
            match escape(*c, next, ascii_only) {
                Some(escaped) => out.push_chunk(&escaped, taint.cloned()),
                None => out.push_chunk(&c.to_string(), taint.cloned()),
            }
        }
        out.push_str("\"");
        compress_taint(&out)
    }
}
