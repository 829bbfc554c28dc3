//! Policy objects carried by taint segments.
//!
//! A [`Transformer`] records what a chunk of text still owes before it may be
//! emitted: nothing ([`Transformer::Identity`]), a set of per-context
//! sanitization policies ([`BaseTransformer`]), the blend of several such
//! policies ([`ComposedTransformer`]), or a pointer back to the text as it was
//! before a previous, provisional sanitization ([`RollbackTransformer`]).
//!
//! Transformers are values. Every method that "changes" one returns a new
//! transformer and leaves the original untouched, so a transformer shared by
//! many segments can never be altered through one of them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::compose::ComposedTransformer;
use crate::context::Ctx;
use crate::error::Result;
use crate::sanitizer::{SanitizerRef, SanitizerRegistry, INVISIBLE, NO_HTML, SQL_DEFAULT};
use crate::tainted::TaintedString;

/// Top-level context for HTML rendering.
pub const HTML: &str = "HTML";
/// Top-level context for SQL literals.
pub const SQL: &str = "SQL";
/// Top-level capability-scoping dimension.
pub const WORLDS: &str = "Worlds";
/// Sub-context key used when no more specific key matches.
pub const DEFAULT_KEY: &str = "DEFAULT";
/// Sub-context key holding a context's violation handler.
pub const VIOLATION_KEY: &str = "VIOLATION";
/// Sub-context key for the body of a `<script>` element.
pub const SCRIPT_PATH: &str = "//script";

/// A capability kind tracked by the `Worlds` dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Scopes allowed to read the value
    #[serde(rename = "read")]
    Read,
    /// Scopes allowed to write the value
    #[serde(rename = "write")]
    Write,
    /// Scopes allowed to read the value's references
    #[serde(rename = "readR")]
    ReadR,
    /// Scopes allowed to write the value's references
    #[serde(rename = "writeR")]
    WriteR,
}

impl Capability {
    /// Every capability, in canonical order.
    pub const ALL: [Capability; 4] = [
        Capability::Read,
        Capability::Write,
        Capability::ReadR,
        Capability::WriteR,
    ];
}

/// Capability envelope: which named scopes hold each capability.
///
/// # Examples
///
/// ```
/// use policy_taint::{Capability, Worlds};
///
/// let a = Worlds::new().with(Capability::Read, ["alice", "bob"]);
/// let b = Worlds::new().with(Capability::Read, ["bob", "carol"]);
///
/// let both = a.intersect(&b);
/// assert!(both.allows(Capability::Read, "bob"));
/// assert!(!both.allows(Capability::Read, "alice"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Worlds(BTreeMap<Capability, BTreeSet<String>>);

impl Worlds {
    /// Creates an envelope granting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy that additionally grants `capability` to `scopes`.
    pub fn with<I, S>(mut self, capability: Capability, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(capability)
            .or_default()
            .extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Returns the scopes holding `capability`, if the capability is present.
    pub fn scopes(&self, capability: Capability) -> Option<&BTreeSet<String>> {
        self.0.get(&capability)
    }

    /// Returns `true` if `scope` holds `capability`.
    pub fn allows(&self, capability: Capability, scope: &str) -> bool {
        self.scopes(capability).is_some_and(|s| s.contains(scope))
    }

    /// Set-union of both envelopes, capability by capability.
    pub fn union(&self, other: &Worlds) -> Worlds {
        let mut merged = self.clone();
        for (capability, scopes) in &other.0 {
            merged
                .0
                .entry(*capability)
                .or_default()
                .extend(scopes.iter().cloned());
        }
        merged
    }

    /// Set-intersection of both envelopes. A capability missing from either
    /// side is absent from the result.
    pub fn intersect(&self, other: &Worlds) -> Worlds {
        let mut out = Worlds::new();
        for capability in Capability::ALL {
            if let (Some(a), Some(b)) = (self.scopes(capability), other.scopes(capability)) {
                let common: BTreeSet<String> = a.intersection(b).cloned().collect();
                if !common.is_empty() {
                    out.0.insert(capability, common);
                }
            }
        }
        out
    }

    /// Returns `true` if no capability grants any scope.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }
}

/// The policy a [`BaseTransformer`] holds for one top-level context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// One sanitizer for the whole context
    Sanitizer(SanitizerRef),
    /// Sanitizers keyed by sub-context, with [`DEFAULT_KEY`] as the fallback
    Nested(BTreeMap<String, SanitizerRef>),
    /// Capability scopes (only meaningful under [`WORLDS`])
    Worlds(Worlds),
}

impl ContextPolicy {
    /// Builds a nested policy from `(sub-context, sanitizer name)` pairs.
    pub fn nested<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ContextPolicy::Nested(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), SanitizerRef::new(v)))
                .collect(),
        )
    }

    /// Picks the sanitizer for `sub_context`, falling back to [`DEFAULT_KEY`].
    pub fn sanitizer_for(&self, sub_context: Option<&str>) -> Option<&SanitizerRef> {
        match self {
            ContextPolicy::Sanitizer(r) => Some(r),
            ContextPolicy::Nested(map) => sub_context
                .and_then(|key| map.get(key))
                .or_else(|| map.get(DEFAULT_KEY)),
            ContextPolicy::Worlds(_) => None,
        }
    }
}

/// Per-context sanitization policies for a chunk.
///
/// An empty policy map is the *safe* transformer: the chunk is tracked but
/// owes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseTransformer {
    state: BTreeMap<String, ContextPolicy>,
}

impl BaseTransformer {
    /// A tracked transformer with no pending obligation.
    pub fn safe() -> Self {
        Self::default()
    }

    /// The policy given to newly read, untrusted input.
    ///
    /// HTML text is entity-escaped (and dropped inside `<script>`), SQL text
    /// is quote-escaped.
    pub fn default_policy() -> Self {
        Self::safe()
            .with_policy(
                HTML,
                ContextPolicy::nested([(DEFAULT_KEY, NO_HTML), (SCRIPT_PATH, INVISIBLE)]),
            )
            .with_policy(SQL, ContextPolicy::Sanitizer(SanitizerRef::new(SQL_DEFAULT)))
    }

    /// Creates a transformer from an explicit policy map.
    pub fn from_state(state: BTreeMap<String, ContextPolicy>) -> Self {
        Self { state }
    }

    /// Returns the policy map.
    pub fn state(&self) -> &BTreeMap<String, ContextPolicy> {
        &self.state
    }

    /// Returns the policy for `context`, if any.
    pub fn policy(&self, context: &str) -> Option<&ContextPolicy> {
        self.state.get(context)
    }

    /// Returns a copy with `context` mapped to `policy`.
    pub fn with_policy(mut self, context: impl Into<String>, policy: ContextPolicy) -> Self {
        self.state.insert(context.into(), policy);
        self
    }

    /// Returns a copy with `context` removed.
    pub fn without(&self, context: &str) -> Self {
        let mut state = self.state.clone();
        state.remove(context);
        Self { state }
    }

    /// Returns `true` if no policy is recorded.
    pub fn is_safe(&self) -> bool {
        self.state.is_empty()
    }

    /// Returns the `Worlds` envelope, if one is recorded.
    pub fn worlds(&self) -> Option<&Worlds> {
        match self.state.get(WORLDS) {
            Some(ContextPolicy::Worlds(w)) => Some(w),
            _ => None,
        }
    }

    /// Picks the sanitizer for a context and optional sub-context.
    pub fn sanitizer_for(&self, context: &str, sub_context: Option<&str>) -> Option<&SanitizerRef> {
        self.policy(context)?.sanitizer_for(sub_context)
    }

    /// Sanitizes `text` for `context`.
    ///
    /// Contexts without a sanitizer pass the text through.
    pub fn transform(
        &self,
        text: &str,
        context: &str,
        sub_context: Option<&str>,
        registry: &SanitizerRegistry,
    ) -> Result<String> {
        match self.sanitizer_for(context, sub_context) {
            Some(reference) => Ok(registry.resolve(reference)?.sanitize(text)),
            None => Ok(text.to_string()),
        }
    }
}

/// Remembers a string as it was before a provisional sanitization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackTransformer {
    backup: Box<TaintedString>,
}

impl RollbackTransformer {
    /// Wraps the pre-sanitization state.
    pub fn new(backup: TaintedString) -> Self {
        Self {
            backup: Box::new(backup),
        }
    }

    /// Returns the pre-sanitization text and taint.
    pub fn backup(&self) -> &TaintedString {
        &self.backup
    }
}

/// The taint carried by a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformer {
    /// No obligation; sanitizes by passing through
    Identity,
    /// Per-context policies
    Base(BaseTransformer),
    /// Blend of several base transformers
    Composed(ComposedTransformer),
    /// Pre-sanitization backup
    Rollback(RollbackTransformer),
}

impl Transformer {
    /// The safe base transformer.
    pub fn safe() -> Self {
        Transformer::Base(BaseTransformer::safe())
    }

    /// The default base transformer for untrusted input.
    pub fn default_policy() -> Self {
        Transformer::Base(BaseTransformer::default_policy())
    }

    /// Short lowercase name of the variant, for errors and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Transformer::Identity => "identity",
            Transformer::Base(_) => "base",
            Transformer::Composed(_) => "composed",
            Transformer::Rollback(_) => "rollback",
        }
    }

    /// Returns the base transformer if this is one.
    pub fn as_base(&self) -> Option<&BaseTransformer> {
        match self {
            Transformer::Base(b) => Some(b),
            _ => None,
        }
    }

    /// Sanitizes `text` for `context` according to this transformer.
    ///
    /// A rollback transformer sanitizes its backup for `context` instead.
    ///
    /// # Errors
    ///
    /// Fails if a referenced sanitizer is not registered in `ctx`, or if a
    /// composed transformer's members do not commute.
    pub fn transform(
        &self,
        text: &str,
        context: &str,
        sub_context: Option<&str>,
        ctx: &Ctx,
    ) -> Result<String> {
        match self {
            Transformer::Identity => Ok(text.to_string()),
            Transformer::Base(b) => b.transform(text, context, sub_context, ctx.registry()),
            Transformer::Composed(c) => c.transform(text, context, sub_context, ctx),
            Transformer::Rollback(r) => {
                Ok(r.backup().transform(context, sub_context, ctx)?.into_string())
            }
        }
    }
}

impl From<BaseTransformer> for Transformer {
    fn from(base: BaseTransformer) -> Self {
        Transformer::Base(base)
    }
}

impl From<ComposedTransformer> for Transformer {
    fn from(composed: ComposedTransformer) -> Self {
        Transformer::Composed(composed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_and_default_differ() {
        assert!(BaseTransformer::safe().is_safe());
        assert!(!BaseTransformer::default_policy().is_safe());
        assert_ne!(Transformer::safe(), Transformer::default_policy());
    }

    #[test]
    fn default_policy_routes_html_sub_contexts() {
        let base = BaseTransformer::default_policy();
        assert_eq!(base.sanitizer_for(HTML, None).unwrap().name(), NO_HTML);
        assert_eq!(
            base.sanitizer_for(HTML, Some(SCRIPT_PATH)).unwrap().name(),
            INVISIBLE
        );
        assert_eq!(
            base.sanitizer_for(HTML, Some("@value")).unwrap().name(),
            NO_HTML
        );
        assert_eq!(base.sanitizer_for(SQL, Some("anything")).unwrap().name(), SQL_DEFAULT);
        assert!(base.sanitizer_for("JSON", None).is_none());
    }

    #[test]
    fn nested_without_default_has_no_fallback() {
        let policy = ContextPolicy::nested([(SCRIPT_PATH, INVISIBLE)]);
        assert!(policy.sanitizer_for(None).is_none());
        assert!(policy.sanitizer_for(Some(SCRIPT_PATH)).is_some());
    }

    #[test]
    fn base_transform_uses_registry() {
        let registry = SanitizerRegistry::with_builtins();
        let base = BaseTransformer::default_policy();

        assert_eq!(base.transform("<i>", HTML, None, &registry).unwrap(), "&lt;i&gt;");
        assert_eq!(base.transform("a'b", SQL, None, &registry).unwrap(), "a''b");
        assert_eq!(base.transform("<i>", "CSV", None, &registry).unwrap(), "<i>");
    }

    #[test]
    fn base_transform_with_unregistered_sanitizer_fails() {
        let registry = SanitizerRegistry::new();
        let base = BaseTransformer::default_policy();
        assert!(base.transform("x", HTML, None, &registry).is_err());
    }

    #[test]
    fn with_policy_does_not_touch_original() {
        let original = BaseTransformer::default_policy();
        let changed = original
            .clone()
            .with_policy(SQL, ContextPolicy::Sanitizer(SanitizerRef::new("identity")));

        assert_eq!(original.sanitizer_for(SQL, None).unwrap().name(), SQL_DEFAULT);
        assert_eq!(changed.sanitizer_for(SQL, None).unwrap().name(), "identity");
    }

    #[test]
    fn worlds_union_and_intersection() {
        let a = Worlds::new()
            .with(Capability::Read, ["alice", "bob"])
            .with(Capability::Write, ["alice"]);
        let b = Worlds::new().with(Capability::Read, ["bob", "carol"]);

        let union = a.union(&b);
        assert!(union.allows(Capability::Read, "carol"));
        assert!(union.allows(Capability::Write, "alice"));

        let both = a.intersect(&b);
        assert!(both.allows(Capability::Read, "bob"));
        assert!(both.scopes(Capability::Write).is_none());
        assert!(!both.is_empty());

        let none = Worlds::new().with(Capability::Read, ["x"]).intersect(&b);
        assert!(none.is_empty());
    }

    #[test]
    fn transformer_serializes_as_instance() {
        let t = Transformer::default_policy();
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"kind\":\"base\""));
        assert!(json.contains("no_html"));

        let back: Transformer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn capability_names_match_persisted_form() {
        let w = Worlds::new().with(Capability::ReadR, ["admins"]);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"readR":["admins"]}"#);
    }
}
