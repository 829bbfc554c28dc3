//! Padding and centering with a tainted fill string.

use crate::error::Result;
use crate::tainted::TaintedString;
use crate::transformer::Transformer;

impl TaintedString {
    /// Builds `count` characters of padding.
    ///
    /// Default whitespace is tagged safe; copies of a pad string carry the
    /// pad string's effective taint. Untracked on both sides stays untracked.
    fn padding(&self, count: usize, pad: Option<&TaintedString>) -> Result<TaintedString> {
        let pad = pad.filter(|p| !p.is_empty());
        let text: String = match pad {
            Some(p) => p.as_str().chars().cycle().take(count).collect(),
            None => " ".repeat(count),
        };
        if !self.is_tracked() && !pad.is_some_and(TaintedString::is_tracked) {
            return Ok(TaintedString::plain(text));
        }
        let transformer = match pad {
            Some(p) => p.effective_taint()?.into_transformer(),
            None => Some(Transformer::safe()),
        };
        Ok(TaintedString::with_taint(text, transformer))
    }

    /// Pads on the right up to `width` characters.
    ///
    /// # Errors
    ///
    /// Fails if the pad string contains a rollback segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_taint::{TaintedString, Transformer};
    ///
    /// let s = TaintedString::default_tainted("ab");
    /// let padded = s.ljust(5, None).unwrap();
    /// assert_eq!(padded, "ab   ");
    /// assert_eq!(padded.taint_at(3), Some(&Transformer::safe()));
    ///
    /// let dots = TaintedString::plain(".-");
    /// assert_eq!(TaintedString::plain("x").ljust(4, Some(&dots)).unwrap(), "x.-.");
    /// ```
    pub fn ljust(&self, width: usize, pad: Option<&TaintedString>) -> Result<TaintedString> {
        let count = width.saturating_sub(self.len());
        Ok(self.clone() + &self.padding(count, pad)?)
    }

    /// Pads on the left up to `width` characters.
    ///
    /// # Errors
    ///
    /// Fails if the pad string contains a rollback segment.
    pub fn rjust(&self, width: usize, pad: Option<&TaintedString>) -> Result<TaintedString> {
        let count = width.saturating_sub(self.len());
        Ok(self.padding(count, pad)? + self)
    }

    /// Centers the string in `width` characters. Odd padding puts the extra
    /// character on the right.
    ///
    /// # Errors
    ///
    /// Fails if the pad string contains a rollback segment.
    pub fn center(&self, width: usize, pad: Option<&TaintedString>) -> Result<TaintedString> {
        let count = width.saturating_sub(self.len());
        let left = count / 2;
        Ok(self.padding(left, pad)? + self + &self.padding(count - left, pad)?)
    }
}
