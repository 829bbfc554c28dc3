//! `printf`-style formatting with a tainted template.

use std::ops::Range;

use crate::chunk::compress_taint;
use crate::compose::taint_union;
use crate::error::{Result, TaintError};
use crate::tainted::TaintedString;
use crate::transformer::Transformer;

#[derive(Debug, Clone, Default)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
}

#[derive(Debug, Clone)]
struct Directive {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
    range: Range<usize>,
}

fn digits(chars: &[char], i: &mut usize) -> Option<usize> {
    let start = *i;
    while chars.get(*i).is_some_and(char::is_ascii_digit) {
        *i += 1;
    }
    chars[start..*i].iter().collect::<String>().parse().ok()
}

// `chars[start]` is the `%`.
fn parse_directive(chars: &[char], start: usize) -> Result<Directive> {
    let mut i = start + 1;
    let mut flags = Flags::default();
    while let Some(&c) = chars.get(i) {
        match c {
            '-' => flags.left = true,
            '0' => flags.zero = true,
            '+' => flags.plus = true,
            ' ' => flags.space = true,
            _ => break,
        }
        i += 1;
    }
    let width = digits(chars, &mut i);
    let precision = if chars.get(i) == Some(&'.') {
        i += 1;
        Some(digits(chars, &mut i).unwrap_or(0))
    } else {
        None
    };
    let Some(&conversion) = chars.get(i) else {
        let text: String = chars[start..].iter().collect();
        return Err(TaintError::invalid_format(text, "incomplete directive"));
    };
    Ok(Directive {
        flags,
        width,
        precision,
        conversion,
        range: start..i + 1,
    })
}

fn pad(
    body: TaintedString,
    width: Option<usize>,
    left: bool,
    taint: Option<Transformer>,
) -> TaintedString {
    let missing = width.unwrap_or(0).saturating_sub(body.len());
    if missing == 0 {
        return body;
    }
    let padding = TaintedString::with_taint(" ".repeat(missing), taint);
    if left {
        body + &padding
    } else {
        padding + &body
    }
}

fn signed(magnitude: String, negative: bool, d: &Directive) -> String {
    let sign = match (negative, d.flags.plus, d.flags.space) {
        (true, _, _) => "-",
        (false, true, _) => "+",
        (false, false, true) => " ",
        _ => "",
    };
    let width = d.width.unwrap_or(0);
    if d.flags.zero && !d.flags.left {
        let zeros = width.saturating_sub(sign.len() + magnitude.len());
        format!("{sign}{}{magnitude}", "0".repeat(zeros))
    } else {
        format!("{sign}{magnitude}")
    }
}

impl TaintedString {
    /// Formats `args` into this template, like `sprintf`.
    ///
    /// Supports `%s`, `%c`, `%d`/`%i`/`%u`, `%x`/`%X`, `%o`, `%b`, `%f` and
    /// `%%`, with the `-`, `0`, `+` and space flags, a width and a
    /// precision. Template text keeps its own taint. `%s` and `%c` keep the
    /// argument's segments and pad with the directive's taint. Numeric
    /// conversions compute new text from the argument, so the result carries
    /// the union of the directive's and the argument's taint.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::InvalidFormat`] for an unsupported or incomplete
    /// directive, too few arguments, or a numeric directive whose argument is
    /// not a number. Fails if a blended taint would include a rollback
    /// transformer.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::TaintedString;
    ///
    /// let row = TaintedString::plain("%-6s|%04d");
    /// let name = TaintedString::default_tainted("eve");
    /// let out = row.format(&[name, TaintedString::plain("7")]).unwrap();
    /// assert_eq!(out, "eve   |0007");
    /// assert!(out.slice(&policy_taint::Slice::Len(0, 3)).unwrap().is_tainted());
    /// assert!(!out.slice(&policy_taint::Slice::Len(3, 8)).unwrap().is_tracked());
    /// ```
    pub fn format(&self, args: &[TaintedString]) -> Result<TaintedString> {
        let chars: Vec<char> = self.as_str().chars().collect();
        let mut out = TaintedString::default();
        let mut args = args.iter().enumerate();
        let mut literal_start = 0;
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '%' {
                i += 1;
                continue;
            }
            out.push_tainted(&self.rebuild(literal_start..i));
            let directive = parse_directive(&chars, i)?;
            if directive.conversion == '%' {
                out.push_tainted(&self.rebuild(i..i + 1));
            } else {
                let text: String = chars[directive.range.clone()].iter().collect();
                let (n, arg) = args
                    .next()
                    .ok_or_else(|| TaintError::invalid_format(&text, "too few arguments"))?;
                out.push_tainted(&self.format_one(&directive, &text, n, arg)?);
            }
            i = directive.range.end;
            literal_start = i;
        }
        out.push_tainted(&self.rebuild(literal_start..));
        Ok(compress_taint(&out))
    }

    fn format_one(
        &self,
        d: &Directive,
        text: &str,
        n: usize,
        arg: &TaintedString,
    ) -> Result<TaintedString> {
        let directive_taint = self.rebuild(d.range.clone());
        let own = directive_taint.effective_taint()?.into_transformer();
        let not_a_number =
            || TaintError::invalid_format(text, format!("argument {} is not a number", n + 1));

        let rendered = match d.conversion {
            's' => {
                let body = match d.precision {
                    Some(p) => arg.rebuild(..p),
                    None => arg.clone(),
                };
                return Ok(pad(body, d.width, d.flags.left, own));
            }
            'c' => return Ok(pad(arg.rebuild(..1), d.width, d.flags.left, own)),
            'd' | 'i' | 'u' | 'x' | 'X' | 'o' | 'b' => {
                let value: i128 = arg.as_str().trim().parse().map_err(|_| not_a_number())?;
                let abs = value.unsigned_abs();
                let mut magnitude = match d.conversion {
                    'x' => format!("{abs:x}"),
                    'X' => format!("{abs:X}"),
                    'o' => format!("{abs:o}"),
                    'b' => format!("{abs:b}"),
                    _ => abs.to_string(),
                };
                if let Some(p) = d.precision {
                    if magnitude.len() < p {
                        magnitude = format!("{}{magnitude}", "0".repeat(p - magnitude.len()));
                    }
                }
                signed(magnitude, value < 0, d)
            }
            'f' => {
                let value: f64 = arg.as_str().trim().parse().map_err(|_| not_a_number())?;
                let precision = d.precision.unwrap_or(6);
                let negative = value.is_sign_negative() && value != 0.0;
                signed(format!("{:.precision$}", value.abs()), negative, d)
            }
            other => {
                let reason = format!("unsupported conversion '{other}'");
                return Err(TaintError::invalid_format(text, reason));
            }
        };

        let taint = taint_union(
            directive_taint
                .segments()
                .iter()
                .chain(arg.segments())
                .map(|s| s.transformer.as_ref()),
        )?
        .into_transformer();
        Ok(pad(TaintedString::with_taint(rendered, taint.clone()), d.width, d.flags.left, taint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> TaintedString {
        TaintedString::plain(text)
    }

    fn tainted(text: &str) -> TaintedString {
        TaintedString::default_tainted(text)
    }

    #[test]
    fn string_argument_keeps_its_segments() {
        let out = plain("id=%s;").format(&[tainted("7")]).unwrap();
        assert_eq!(out, "id=7;");
        assert_eq!(out.taint_at(2), None);
        assert_eq!(out.taint_at(3), Some(&Transformer::default_policy()));
        assert_eq!(out.taint_at(4), None);
    }

    #[test]
    fn width_and_precision_for_strings() {
        let out = plain("%-4s|").format(&[tainted("ab")]).unwrap();
        assert_eq!(out, "ab  |");
        assert_eq!(out.taint_at(1), Some(&Transformer::default_policy()));
        assert_eq!(out.taint_at(2), None);

        assert_eq!(plain("[%5s]").format(&[plain("ab")]).unwrap(), "[   ab]");
        assert_eq!(plain("%.2s").format(&[tainted("abcdef")]).unwrap(), "ab");
        assert_eq!(plain("%c").format(&[tainted("xyz")]).unwrap(), "x");
    }

    #[test]
    fn numeric_conversions() {
        let cases = [
            ("%05d", "-42", "-0042"),
            ("%+d", "3", "+3"),
            ("% d", "3", " 3"),
            ("%x", "255", "ff"),
            ("%X", "255", "FF"),
            ("%o", "8", "10"),
            ("%b", "5", "101"),
            ("%.3d", "7", "007"),
            ("%.2f", "3.14159", "3.14"),
            ("%6.1f", "-2.26", "  -2.3"),
            ("%-4d|", "1", "1   |"),
        ];
        for (template, arg, expected) in cases {
            assert_eq!(plain(template).format(&[plain(arg)]).unwrap(), expected, "{template}");
        }
    }

    #[test]
    fn numeric_output_blends_argument_taint() {
        let out = plain("n=%03d").format(&[tainted("5")]).unwrap();
        assert_eq!(out, "n=005");
        assert_eq!(out.taint_at(1), None);
        for i in 2..5 {
            assert_eq!(out.taint_at(i), Some(&Transformer::default_policy()));
        }
    }

    #[test]
    fn template_taint_survives() {
        let out = tainted("%s!").format(&[plain("x")]).unwrap();
        assert_eq!(out, "x!");
        assert_eq!(out.taint_at(0), None);
        assert_eq!(out.taint_at(1), Some(&Transformer::default_policy()));
    }

    #[test]
    fn percent_literal_and_no_directives() {
        assert_eq!(plain("100%%").format(&[]).unwrap(), "100%");
        let s = plain("a") + &tainted("b");
        assert_eq!(s.format(&[]).unwrap(), s);
    }

    #[test]
    fn bad_directives_are_errors() {
        let err = plain("%s %s").format(&[plain("a")]).unwrap_err();
        assert!(matches!(
            err,
            TaintError::InvalidFormat { ref reason, .. } if reason == "too few arguments"
        ));

        let err = plain("%d").format(&[tainted("secret")]).unwrap_err();
        assert!(!err.to_string().contains("secret"));

        assert!(plain("%q").format(&[plain("a")]).is_err());
        assert!(plain("50%").format(&[]).is_err());
    }
}
