//! Named sanitizers and the registry that resolves them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaintError};

/// A pure, context-specific string transformation.
///
/// Sanitizers are the plugin contract between this crate and the code that
/// knows how to make text safe for a particular sink (HTML encoders, SQL
/// escapers, ...). Policies never hold a sanitizer directly: they hold a
/// [`SanitizerRef`] naming an instance registered in a [`SanitizerRegistry`],
/// so that the policy itself stays serializable alongside the data it
/// protects.
///
/// # Invariants
///
/// Implementations MUST be deterministic and free of side effects: the
/// composition check compares outputs of the same input applied in different
/// orders, and a sanitizer that is not a pure function of its input makes
/// that check meaningless.
///
/// Any `Fn(&str) -> String` closure is a sanitizer:
///
/// ```
/// use policy_taint::Sanitizer;
///
/// let shout = |s: &str| s.to_uppercase();
/// assert_eq!(shout.sanitize("hi"), "HI");
/// ```
pub trait Sanitizer: Send + Sync {
    /// Returns the sanitized form of `text`.
    fn sanitize(&self, text: &str) -> String;
}

impl<F> Sanitizer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn sanitize(&self, text: &str) -> String {
        self(text)
    }
}

/// A serializable reference to a registered sanitizer instance.
///
/// # Examples
///
/// ```
/// use policy_taint::SanitizerRef;
///
/// let r = SanitizerRef::new("no_html");
/// assert_eq!(r.name(), "no_html");
/// assert_eq!(serde_json::to_string(&r).unwrap(), "\"no_html\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SanitizerRef(String);

impl SanitizerRef {
    /// Creates a reference to the sanitizer registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the registered name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the [`Identity`] sanitizer in the built-in registry.
pub const IDENTITY: &str = "identity";
/// Name of the [`NoHtml`] sanitizer in the built-in registry.
pub const NO_HTML: &str = "no_html";
/// Name of the [`Invisible`] sanitizer in the built-in registry.
pub const INVISIBLE: &str = "invisible";
/// Name of the [`SqlDefault`] sanitizer in the built-in registry.
pub const SQL_DEFAULT: &str = "sql_default";

/// Passes text through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Sanitizer for Identity {
    fn sanitize(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Escapes the five HTML-significant characters as entities.
///
/// # Examples
///
/// ```
/// use policy_taint::{NoHtml, Sanitizer};
///
/// assert_eq!(NoHtml.sanitize("<b>\"hi\"</b>"), "&lt;b&gt;&quot;hi&quot;&lt;/b&gt;");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHtml;

impl Sanitizer for NoHtml {
    fn sanitize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(c),
            }
        }
        out
    }
}

/// Removes the text entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invisible;

impl Sanitizer for Invisible {
    fn sanitize(&self, _text: &str) -> String {
        String::new()
    }
}

/// Escapes text for inclusion in a single-quoted SQL literal.
///
/// Single quotes are doubled and backslashes escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlDefault;

impl Sanitizer for SqlDefault {
    fn sanitize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out
    }
}

/// Maps sanitizer names to sanitizer instances.
///
/// # Examples
///
/// ```
/// use policy_taint::{SanitizerRef, SanitizerRegistry};
///
/// let mut registry = SanitizerRegistry::with_builtins();
/// registry.register("stars", |s: &str| "*".repeat(s.chars().count()));
///
/// let stars = registry.resolve(&SanitizerRef::new("stars")).unwrap();
/// assert_eq!(stars.sanitize("abc"), "***");
/// assert!(registry.resolve(&SanitizerRef::new("missing")).is_err());
/// ```
#[derive(Clone, Default)]
pub struct SanitizerRegistry {
    entries: HashMap<String, Arc<dyn Sanitizer>>,
}

impl SanitizerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in sanitizers used by the default
    /// policy: `identity`, `no_html`, `invisible` and `sql_default`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(IDENTITY, Identity);
        registry.register(NO_HTML, NoHtml);
        registry.register(INVISIBLE, Invisible);
        registry.register(SQL_DEFAULT, SqlDefault);
        registry
    }

    /// Registers `sanitizer` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, sanitizer: impl Sanitizer + 'static) {
        self.entries.insert(name.into(), Arc::new(sanitizer));
    }

    /// Looks up the sanitizer a policy refers to.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::UnknownSanitizer`] if nothing is registered under
    /// the referenced name.
    pub fn resolve(&self, reference: &SanitizerRef) -> Result<&dyn Sanitizer> {
        self.entries
            .get(reference.name())
            .map(|s| s.as_ref())
            .ok_or_else(|| TaintError::UnknownSanitizer {
                name: reference.name().to_string(),
            })
    }

    /// Returns `true` if a sanitizer is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the number of registered sanitizers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SanitizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SanitizerRegistry")
            .field("sanitizers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_preserves_text() {
        assert_eq!(Identity.sanitize("<a href='x'>"), "<a href='x'>");
    }

    #[test]
    fn no_html_escapes_all_markup_characters() {
        assert_eq!(
            NoHtml.sanitize("<a href='x'>&</a>"),
            "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn no_html_leaves_unicode_alone() {
        assert_eq!(NoHtml.sanitize("Hello 世界 🌍"), "Hello 世界 🌍");
    }

    #[test]
    fn invisible_drops_everything() {
        assert_eq!(Invisible.sanitize("alert(1)"), "");
    }

    #[test]
    fn sql_default_escapes_quotes_and_backslashes() {
        assert_eq!(SqlDefault.sanitize("O'Brien\\"), "O''Brien\\\\");
    }

    #[test]
    fn builtins_are_registered() {
        let registry = SanitizerRegistry::with_builtins();
        assert_eq!(registry.len(), 4);
        for name in [IDENTITY, NO_HTML, INVISIBLE, SQL_DEFAULT] {
            assert!(registry.contains(name), "missing builtin {}", name);
        }
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut registry = SanitizerRegistry::with_builtins();
        registry.register(NO_HTML, |_: &str| "x".to_string());

        let s = registry.resolve(&SanitizerRef::new(NO_HTML)).unwrap();
        assert_eq!(s.sanitize("<b>"), "x");
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn resolve_unknown_fails_with_name() {
        let registry = SanitizerRegistry::new();
        assert!(registry.is_empty());

        let err = registry.resolve(&SanitizerRef::new("nope")).err().unwrap();
        match err {
            TaintError::UnknownSanitizer { name } => assert_eq!(name, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn debug_lists_names_not_closures() {
        let registry = SanitizerRegistry::with_builtins();
        let output = format!("{:?}", registry);
        assert!(output.contains("no_html"));
        assert!(output.contains("sql_default"));
    }

    #[test]
    fn sanitizer_ref_round_trips_through_json() {
        let r = SanitizerRef::new("sql_default");
        let json = serde_json::to_string(&r).unwrap();
        let back: SanitizerRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
