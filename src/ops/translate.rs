//! Character-set operations: `delete_chars`, `tr`, `tr_s` and `squeeze`.

use crate::chunk::compress_taint;
use crate::compose::taint_union;
use crate::error::Result;
use crate::tainted::TaintedString;
use crate::transformer::Transformer;

/// A parsed `tr`-style character set: literal characters and `a-z` ranges,
/// optionally negated with a leading `^`.
#[derive(Debug, Clone)]
struct CharSet {
    chars: Vec<char>,
    negated: bool,
}

impl CharSet {
    fn parse(set: &str) -> Self {
        let negated = set.len() > 1 && set.starts_with('^');
        let body = if negated { &set[1..] } else { set };
        Self {
            chars: expand(body),
            negated,
        }
    }

    fn contains(&self, c: char) -> bool {
        self.chars.contains(&c) != self.negated
    }
}

// Literal characters, backslash escapes and `a-z` ranges. A `^` is literal.
fn expand(set: &str) -> Vec<char> {
    let raw: Vec<char> = set.chars().collect();
    let mut chars = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let c = if raw[i] == '\\' && i + 1 < raw.len() {
            i += 1;
            raw[i]
        } else {
            raw[i]
        };
        if i + 2 < raw.len() && raw[i + 1] == '-' && raw[i + 2] >= c {
            chars.extend(c..=raw[i + 2]);
            i += 3;
        } else {
            chars.push(c);
            i += 1;
        }
    }
    chars
}

impl TaintedString {
    /// Removes every character in the `tr`-style set `set`.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// assert_eq!(TaintedString::plain("hello").delete_chars("l"), "heo");
    /// assert_eq!(TaintedString::plain("hello").delete_chars("a-k"), "llo");
    /// assert_eq!(TaintedString::plain("hello").delete_chars("^l"), "ll");
    /// ```
    pub fn delete_chars(&self, set: &str) -> TaintedString {
        let set = CharSet::parse(set);
        self.map_chunks(|_, text| text.chars().filter(|c| !set.contains(*c)).collect())
    }

    /// Translates characters in `from` to the corresponding characters of
    /// `to`.
    ///
    /// Ranges and `^` negation are supported in `from`; `to` takes ranges
    /// only and is padded with its last character. An empty `to` deletes the
    /// matched characters. Translated characters carry the effective taint
    /// of `to`; untouched characters keep their own.
    ///
    /// # Errors
    ///
    /// Fails if `to` carries a rollback transformer.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::plain("hello");
    /// let star = TaintedString::plain("*");
    /// assert_eq!(s.tr("aeiou", &star).unwrap(), "h*ll*");
    /// assert_eq!(s.tr("^aeiou", &star).unwrap(), "*e**o");
    /// assert_eq!(s.tr("el", &TaintedString::plain("ip")).unwrap(), "hippo");
    /// assert_eq!(s.tr("a-y", &TaintedString::plain("b-z")).unwrap(), "ifmmp");
    /// ```
    pub fn tr(&self, from: &str, to: &TaintedString) -> Result<TaintedString> {
        self.translate(from, to, false)
    }

    /// Like [`tr`](Self::tr), but a run of characters translated to the same
    /// character collapses to one.
    ///
    /// # Errors
    ///
    /// Fails if `to` carries a rollback transformer.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::plain("aabbcc");
    /// assert_eq!(s.tr_s("ab", &TaintedString::plain("x")).unwrap(), "xcc");
    /// assert_eq!(s.tr_s("a", &TaintedString::plain("c")).unwrap(), "cbbcc");
    /// ```
    pub fn tr_s(&self, from: &str, to: &TaintedString) -> Result<TaintedString> {
        self.translate(from, to, true)
    }

    fn translate(&self, from: &str, to: &TaintedString, squeeze: bool) -> Result<TaintedString> {
        let from = CharSet::parse(from);
        let to_chars = expand(to.as_str());
        if to_chars.is_empty() {
            return Ok(self.map_chunks(|_, text| {
                text.chars().filter(|c| !from.contains(*c)).collect()
            }));
        }

        let translate = |c: char| -> Option<char> {
            if !from.contains(c) {
                return None;
            }
            if from.negated {
                return to_chars.last().copied();
            }
            let pos = from.chars.iter().position(|f| *f == c)?;
            to_chars.get(pos).or(to_chars.last()).copied()
        };

        let replacement_taint = to.effective_taint()?.into_transformer();
        let mut out = TaintedString::default();
        let mut last_translated = None;
        for chunk in self.chunks() {
            let mut kept = String::new();
            for c in chunk.text.chars() {
                match translate(c) {
                    Some(t) if squeeze && last_translated == Some(t) => {}
                    Some(t) => {
                        out.push_chunk(&kept, chunk.transformer.cloned());
                        kept.clear();
                        out.push_chunk(&t.to_string(), replacement_taint.clone());
                        last_translated = Some(t);
                    }
                    None => {
                        kept.push(c);
                        last_translated = None;
                    }
                }
            }
            out.push_chunk(&kept, chunk.transformer.cloned());
        }
        Ok(compress_taint(&out))
    }

    /// Collapses runs of the same character into one.
    ///
    /// With a set, only characters in the `tr`-style set are squeezed. A run
    /// inside one chunk keeps that chunk's taint. A run that crosses chunk
    /// boundaries leaves one character carrying the union of the taints it
    /// absorbed.
    ///
    /// # Errors
    ///
    /// Fails if a run crossing chunks includes a rollback transformer.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let s = TaintedString::plain("yelll") + &TaintedString::default_tainted("lloww");
    /// let out = s.squeeze(None).unwrap();
    /// assert_eq!(out, "yelow");
    /// assert!(out.slice(&policy_taint::Slice::At(2)).unwrap().is_tainted());
    /// assert_eq!(s.squeeze(Some("w")).unwrap(), "yelllllow");
    /// ```
    pub fn squeeze(&self, set: Option<&str>) -> Result<TaintedString> {
        let set = set.map(CharSet::parse);
        let squeezable = |c: char| set.as_ref().map_or(true, |s| s.contains(c));
        if !self.is_tracked() {
            let mut text = String::with_capacity(self.as_str().len());
            for c in self.as_str().chars() {
                if !(squeezable(c) && text.ends_with(c)) {
                    text.push(c);
                }
            }
            return Ok(TaintedString::plain(text));
        }

        let chars: Vec<(char, Option<&Transformer>)> = self.tainted_chars().collect();
        let mut out = TaintedString::default();
        let mut i = 0;
        while i < chars.len() {
            let (c, taint) = chars[i];
            let mut end = i + 1;
            if squeezable(c) {
                while end < chars.len() && chars[end].0 == c {
                    end += 1;
                }
            }
            let run = &chars[i..end];
            let transformer = if run.iter().all(|(_, t)| *t == taint) {
                taint.cloned()
            } else {
                taint_union(run.iter().map(|(_, t)| *t))?.into_transformer()
            };
            out.push_chunk(&c.to_string(), transformer);
            i = end;
        }
        Ok(compress_taint(&out))
    }
}
