//! Pattern substitution with taint-preserving back-references.

use std::convert::Infallible;

use crate::chunk::compress_taint;
use crate::compose::taint_union;
use crate::error::Result;
use crate::pattern::{Pattern, TaintedMatch};
use crate::tainted::TaintedString;

/// Expands a replacement template against one match.
///
/// Literal parts of the template keep the template's own taint.
/// `\0`/`\&`, `\1`-`\9`, `\k<name>`, `` \` `` and `\'` are rebuilt from the
/// source so they keep the taint of the characters they copy. `\\` is a
/// literal backslash. Any other escape is kept as written.
fn expand(template: &TaintedString, m: &TaintedMatch<'_>) -> TaintedString {
    let chars: Vec<char> = template.as_str().chars().collect();
    let mut out = TaintedString::default();
    let mut literal_start = 0;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 == chars.len() {
            i += 1;
            continue;
        }
        let (piece, consumed) = match chars[i + 1] {
            d @ '0'..='9' => (m.get(d as usize - '0' as usize).unwrap_or_default(), 2),
            '&' => (m.get(0).unwrap_or_default(), 2),
            '`' => (m.pre_match(), 2),
            '\'' => (m.post_match(), 2),
            '\\' => (template.rebuild(i + 1..i + 2), 2),
            'k' if chars.get(i + 2) == Some(&'<') => {
                match chars[i + 3..].iter().position(|c| *c == '>') {
                    Some(len) => {
                        let name: String = chars[i + 3..i + 3 + len].iter().collect();
                        (m.name(&name).unwrap_or_default(), len + 4)
                    }
                    None => {
                        i += 1;
                        continue;
                    }
                }
            }
            _ => {
                i += 1;
                continue;
            }
        };
        out.push_tainted(&template.rebuild(literal_start..i));
        out.push_tainted(&piece);
        i += consumed;
        literal_start = i;
    }
    out.push_tainted(&template.rebuild(literal_start..));
    out
}

impl TaintedString {
    fn substitute<F, E>(
        &self,
        pattern: &Pattern,
        global: bool,
        mut replace: F,
    ) -> std::result::Result<TaintedString, E>
    where
        F: FnMut(&TaintedMatch<'_>) -> std::result::Result<TaintedString, E>,
    {
        let matches = if global {
            pattern.find_iter(self)
        } else {
            pattern.find(self).into_iter().collect()
        };
        if matches.is_empty() {
            return Ok(self.clone());
        }

        let mut out = TaintedString::default();
        let mut cursor = 0;
        for m in &matches {
            let range = m.full_range();
            out.push_tainted(&self.rebuild(cursor..range.start));
            out.push_tainted(&replace(m)?);
            cursor = range.end;
        }
        out.push_tainted(&self.rebuild(cursor..));
        tracing::debug!(substitutions = matches.len(), "substituted tainted string");
        Ok(compress_taint(&out))
    }

    fn expand_all(
        &self,
        pattern: &Pattern,
        global: bool,
        template: &TaintedString,
    ) -> TaintedString {
        self.substitute(pattern, global, |m| Ok::<_, Infallible>(expand(template, m)))
            .unwrap_or_else(|never| match never {})
    }

    /// Replaces the first match of `pattern` with a template.
    ///
    /// See [`gsub`](Self::gsub) for the template syntax.
    pub fn sub(&self, pattern: &Pattern, replacement: &TaintedString) -> TaintedString {
        self.expand_all(pattern, false, replacement)
    }

    /// Replaces every match of `pattern` with a template.
    ///
    /// The template may refer back to the match with `\0` or `\&`, to groups
    /// with `\1` to `\9` or `\k<name>`, and to the text around the match with
    /// `` \` `` and `\'`. Copied text keeps the taint it had in `self`; the
    /// template's own characters keep the template's taint.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{Pattern, TaintedString, Transformer};
    ///
    /// let s = TaintedString::default_tainted("hello");
    /// let vowel = Pattern::regex("([aeiou])").unwrap();
    ///
    /// let out = s.gsub(&vowel, &TaintedString::plain(r"<\1>"));
    /// assert_eq!(out, "h<e>ll<o>");
    /// assert_eq!(out.taint_at(1), None);
    /// assert_eq!(out.taint_at(2), Some(&Transformer::default_policy()));
    /// ```
    pub fn gsub(&self, pattern: &Pattern, replacement: &TaintedString) -> TaintedString {
        self.expand_all(pattern, true, replacement)
    }

    /// Replaces the first match of `pattern` with the result of `f`.
    ///
    /// See [`gsub_with`](Self::gsub_with).
    ///
    /// # Errors
    ///
    /// Fails if a blended taint would include a rollback transformer.
    pub fn sub_with<F>(&self, pattern: &Pattern, f: F) -> Result<TaintedString>
    where
        F: FnMut(&TaintedMatch<'_>) -> TaintedString,
    {
        self.callback_substitute(pattern, false, f)
    }

    /// Replaces every match of `pattern` with the result of `f`.
    ///
    /// A result that carries taint metadata keeps it. An untracked result
    /// was computed from the match, so it takes the union of the match's
    /// taint and its own.
    ///
    /// # Errors
    ///
    /// Fails if a blended taint would include a rollback transformer.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{Pattern, Slice, TaintedString};
    ///
    /// let s = TaintedString::plain("id: ") + &TaintedString::default_tainted("abc");
    /// let out = s
    ///     .gsub_with(&Pattern::regex("[a-c]+").unwrap(), |m| {
    ///         TaintedString::plain(m.get(0).unwrap().as_str().to_uppercase())
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(out, "id: ABC");
    /// assert!(!out.slice(&Slice::Len(0, 4)).unwrap().is_tracked());
    /// assert!(out.slice(&Slice::Len(4, 3)).unwrap().is_tainted());
    /// ```
    pub fn gsub_with<F>(&self, pattern: &Pattern, f: F) -> Result<TaintedString>
    where
        F: FnMut(&TaintedMatch<'_>) -> TaintedString,
    {
        self.callback_substitute(pattern, true, f)
    }

    fn callback_substitute<F>(
        &self,
        pattern: &Pattern,
        global: bool,
        mut f: F,
    ) -> Result<TaintedString>
    where
        F: FnMut(&TaintedMatch<'_>) -> TaintedString,
    {
        self.substitute(pattern, global, |m| {
            let result = f(m);
            if result.is_tracked() {
                return Ok(result);
            }
            let matched = m.get(0).unwrap_or_default().effective_taint()?.into_transformer();
            let own = result.effective_taint()?.into_transformer();
            let blended = taint_union([matched.as_ref(), own.as_ref()])?;
            Ok(result.set_taint(blended.into_transformer()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::Transformer;

    fn vowels() -> Pattern {
        Pattern::regex("([aeiou])").unwrap()
    }

    #[test]
    fn gsub_with_literal_replacement() {
        let s = TaintedString::default_tainted("hello");
        let out = s.gsub(&Pattern::regex("[aeiou]").unwrap(), &TaintedString::plain("*"));
        assert_eq!(out, "h*ll*");
        assert_eq!(out.taint_at(0), Some(&Transformer::default_policy()));
        assert_eq!(out.taint_at(1), None);
    }

    #[test]
    fn sub_replaces_first_only() {
        let s = TaintedString::plain("hello");
        assert_eq!(s.sub(&vowels(), &TaintedString::plain("*")), "h*llo");
    }

    #[test]
    fn named_back_references() {
        let s = TaintedString::plain("hello");
        let pattern = Pattern::regex("(?<foo>[aeiou])").unwrap();
        let out = s.gsub(&pattern, &TaintedString::plain(r"{\k<foo>}"));
        assert_eq!(out, "h{e}ll{o}");
    }

    #[test]
    fn whole_match_and_context_references() {
        let s = TaintedString::plain("abc");
        let b = Pattern::from("b");
        assert_eq!(s.sub(&b, &TaintedString::plain(r"[\0\&]")), "a[bb]c");
        assert_eq!(s.sub(&b, &TaintedString::plain(r"<\`|\'>")), "a<a|c>c");
        assert_eq!(s.sub(&b, &TaintedString::plain(r"\\")), r"a\c");
        assert_eq!(s.sub(&b, &TaintedString::plain(r"\q")), r"a\qc");
        assert_eq!(s.sub(&b, &TaintedString::plain(r"\k<x")), r"a\k<xc");
    }

    #[test]
    fn missing_groups_expand_to_nothing() {
        let s = TaintedString::plain("ac");
        let pattern = Pattern::regex("a(b)?").unwrap();
        assert_eq!(s.sub(&pattern, &TaintedString::plain(r"[\1\2]")), "[]c");
    }

    #[test]
    fn template_taint_is_kept() {
        let s = TaintedString::plain("x");
        let replacement = TaintedString::default_tainted("y");
        let out = s.sub(&Pattern::from("x"), &replacement);
        assert_eq!(out, replacement);
    }

    #[test]
    fn no_match_returns_copy() {
        let s = TaintedString::default_tainted("abc");
        assert_eq!(s.gsub(&Pattern::from("z"), &TaintedString::plain("y")), s);
    }

    #[test]
    fn empty_pattern_matches_between_chars() {
        let s = TaintedString::plain("ab");
        assert_eq!(s.gsub(&Pattern::from(""), &TaintedString::plain("-")), "-a-b-");
    }

    #[test]
    fn tracked_callback_result_keeps_its_taint() {
        let s = TaintedString::default_tainted("abc");
        let out = s
            .sub_with(&Pattern::from("b"), |_| {
                TaintedString::with_taint("B", Some(Transformer::safe()))
            })
            .unwrap();
        assert_eq!(out, "aBc");
        assert_eq!(out.taint_at(1), Some(&Transformer::safe()));
    }

    #[test]
    fn untracked_callback_result_inherits_match_taint() {
        let s = TaintedString::plain("a") + &TaintedString::default_tainted("b");
        let out = s
            .gsub_with(&Pattern::from("b"), |m| {
                TaintedString::plain(m.get(0).unwrap().as_str().repeat(2))
            })
            .unwrap();
        assert_eq!(out, "abb");
        assert_eq!(out.taint_at(1), Some(&Transformer::default_policy()));
        assert_eq!(out.taint_at(2), Some(&Transformer::default_policy()));
    }

    #[test]
    fn blended_match_taint_is_composed() {
        let s = TaintedString::with_taint("a", Some(Transformer::safe()))
            + &TaintedString::default_tainted("b");
        let out = s
            .sub_with(&Pattern::from("ab"), |_| TaintedString::plain("z"))
            .unwrap();
        assert!(matches!(out.taint_at(0), Some(Transformer::Composed(c)) if c.len() == 2));
    }

    #[test]
    fn callback_sees_match_context() {
        let s = TaintedString::plain("k=v");
        let out = s
            .sub_with(&Pattern::from("="), |m| {
                TaintedString::plain(format!("[{}|{}]", m.pre_match(), m.post_match()))
            })
            .unwrap();
        assert_eq!(out, "k[k|v]v");
    }
}
