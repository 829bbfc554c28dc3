//! Decoding the UTF-8 bytes of a tainted string with an `unpack` template.

use crate::compose::taint_union;
use crate::error::{Result, TaintError};
use crate::tainted::TaintedString;

/// One value decoded by [`TaintedString::unpack`].
#[derive(Debug, Clone, PartialEq)]
pub enum Unpacked {
    /// Text, carrying the blended taint of the input and the template
    Str(TaintedString),
    /// A number
    Int(i64),
    /// A numeric directive that ran past the end of the input
    Nil,
}

#[derive(Debug, Clone, Copy)]
enum Count {
    Default,
    Star,
    N(usize),
}

impl Count {
    // How many units to read when `available` remain.
    fn units(self, available: usize) -> usize {
        match self {
            Count::Default => 1,
            Count::Star => available,
            Count::N(n) => n,
        }
    }

    // Like `units`, but never past the end.
    fn clamped(self, available: usize) -> usize {
        self.units(available).min(available)
    }
}

fn nibbles(bytes: &[u8], count: usize, high_first: bool) -> String {
    (0..count)
        .map(|i| {
            let byte = bytes[i / 2];
            let nibble = if (i % 2 == 0) == high_first { byte >> 4 } else { byte & 0x0f };
            char::from_digit(u32::from(nibble), 16).unwrap_or('0')
        })
        .collect()
}

fn bits(bytes: &[u8], count: usize, msb_first: bool) -> String {
    (0..count)
        .map(|i| {
            let byte = bytes[i / 8];
            let shift = if msb_first { 7 - i % 8 } else { i % 8 };
            if (byte >> shift) & 1 == 1 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

impl TaintedString {
    /// Decodes the string's UTF-8 bytes according to `template`.
    ///
    /// Directives, each optionally followed by a count or `*`:
    ///
    /// - `a`, `A`, `Z`: text (`A` strips trailing spaces and NULs, `Z` stops
    ///   at a NUL)
    /// - `C`, `c`: unsigned and signed bytes
    /// - `n`, `N`, `v`, `V`: 16- and 32-bit big- and little-endian integers
    /// - `U`: characters as code points
    /// - `H`, `h`, `B`, `b`: hex and bit strings
    /// - `x`: skip bytes
    ///
    /// Decoded text carries the union of the input's and the template's
    /// taint, since either can steer what comes out. Numbers carry none.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::InvalidFormat`] for an unknown directive, a `U`
    /// that does not start on a character boundary, or an `x` past the end.
    /// Fails if either string contains a rollback segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{TaintedString, Unpacked};
    ///
    /// let record = TaintedString::default_tainted("ab  c");
    /// let fields = record.unpack(&TaintedString::plain("A4 C")).unwrap();
    /// assert_eq!(fields[0], Unpacked::Str(TaintedString::default_tainted("ab")));
    /// assert_eq!(fields[1], Unpacked::Int(99));
    /// ```
    pub fn unpack(&self, template: &TaintedString) -> Result<Vec<Unpacked>> {
        let taint = taint_union(
            self.segments()
                .iter()
                .chain(template.segments())
                .map(|s| s.transformer.as_ref()),
        )?
        .into_transformer();
        let text = |s: &[u8]| {
            let decoded = String::from_utf8_lossy(s).into_owned();
            Unpacked::Str(TaintedString::with_taint(decoded, taint.clone()))
        };

        let bytes = self.as_str().as_bytes();
        let directives: Vec<char> = template.as_str().chars().collect();
        let mut out = Vec::new();
        let mut pos = 0;
        let mut i = 0;
        while i < directives.len() {
            let directive = directives[i];
            i += 1;
            if directive.is_whitespace() {
                continue;
            }
            let count = if directives.get(i) == Some(&'*') {
                i += 1;
                Count::Star
            } else {
                let start = i;
                while directives.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                match directives[start..i].iter().collect::<String>().parse() {
                    Ok(n) => Count::N(n),
                    Err(_) => Count::Default,
                }
            };
            let rest = &bytes[pos..];

            match directive {
                'a' | 'A' | 'Z' => {
                    let n = count.clamped(rest.len());
                    let mut field = &rest[..n];
                    let mut consumed = n;
                    if directive == 'A' {
                        let keep = field
                            .iter()
                            .rposition(|b| *b != b' ' && *b != 0)
                            .map_or(0, |p| p + 1);
                        field = &field[..keep];
                    } else if directive == 'Z' {
                        if let Some(nul) = field.iter().position(|b| *b == 0) {
                            field = &field[..nul];
                            if matches!(count, Count::Star) {
                                consumed = nul + 1;
                            }
                        }
                    }
                    out.push(text(field));
                    pos += consumed;
                }
                'C' | 'c' => {
                    for _ in 0..count.units(rest.len()) {
                        match bytes.get(pos) {
                            Some(&b) => {
                                let value = if directive == 'C' {
                                    i64::from(b)
                                } else {
                                    i64::from(b as i8)
                                };
                                out.push(Unpacked::Int(value));
                                pos += 1;
                            }
                            None => out.push(Unpacked::Nil),
                        }
                    }
                }
                'n' | 'N' | 'v' | 'V' => {
                    let width = if matches!(directive, 'n' | 'v') { 2 } else { 4 };
                    for _ in 0..count.units(rest.len() / width) {
                        let Some(word) = bytes.get(pos..pos + width) else {
                            out.push(Unpacked::Nil);
                            continue;
                        };
                        let value = if matches!(directive, 'n' | 'N') {
                            word.iter().fold(0i64, |acc, b| (acc << 8) | i64::from(*b))
                        } else {
                            word.iter().rev().fold(0i64, |acc, b| (acc << 8) | i64::from(*b))
                        };
                        out.push(Unpacked::Int(value));
                        pos += width;
                    }
                }
                'U' => {
                    let Some(chars) = self.as_str().get(pos..) else {
                        return Err(TaintError::invalid_format("U", "malformed UTF-8 character"));
                    };
                    let n = count.units(usize::MAX);
                    for c in chars.chars().take(n) {
                        out.push(Unpacked::Int(i64::from(u32::from(c))));
                        pos += c.len_utf8();
                    }
                }
                'H' | 'h' => {
                    let n = count.clamped(rest.len() * 2);
                    out.push(text(nibbles(rest, n, directive == 'H').as_bytes()));
                    pos += n.div_ceil(2);
                }
                'B' | 'b' => {
                    let n = count.clamped(rest.len() * 8);
                    out.push(text(bits(rest, n, directive == 'B').as_bytes()));
                    pos += n.div_ceil(8);
                }
                'x' => {
                    let n = match count {
                        Count::Star => 0,
                        other => other.units(0),
                    };
                    if n > rest.len() {
                        return Err(TaintError::invalid_format("x", "outside of string"));
                    }
                    pos += n;
                }
                other => {
                    return Err(TaintError::invalid_format(other.to_string(), "unknown directive"));
                }
            }
        }
        Ok(out)
    }
}
