//! Attaching policies to stored fields.
//!
//! The code that reads a field out of storage knows which policies its
//! annotations require; these functions fold those policies into the
//! field's taint before the value flows anywhere else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::compose::ComposedTransformer;
use crate::context::Ctx;
use crate::error::Result;
use crate::sanitizer::SanitizerRef;
use crate::tainted::TaintedString;
use crate::transformer::{
    BaseTransformer, ContextPolicy, Transformer, DEFAULT_KEY, VIOLATION_KEY, WORLDS,
};

/// Where a policy annotation came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyScope {
    /// The annotation scope, such as `self`
    pub scope: String,
    /// The model or type the field belongs to
    pub target: String,
    /// The annotated field
    pub field: String,
}

impl PolicyScope {
    /// Creates a scope.
    pub fn new(
        scope: impl Into<String>,
        target: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            target: target.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.target, self.field, self.scope)
    }
}

/// A policy to fold into a field's taint.
///
/// Without `force`, only chunks that already owe something for `context`
/// are updated, so an assignment never widens what counts as tainted. With
/// `force`, every chunk receives the policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAssignment {
    /// Top-level context the policy applies to
    pub context: String,
    /// The policy itself
    pub policy: ContextPolicy,
    /// Where the annotation came from
    pub scope: PolicyScope,
    /// Apply to every chunk, not just those already tainted for `context`
    #[serde(default)]
    pub force: bool,
}

impl PolicyAssignment {
    /// Creates a non-forced assignment.
    pub fn new(context: impl Into<String>, policy: ContextPolicy, scope: PolicyScope) -> Self {
        Self {
            context: context.into(),
            policy,
            scope,
            force: false,
        }
    }

    /// Returns a copy that applies to every chunk.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

// Worlds envelopes merge; every other policy replaces what was there.
fn merged_policy(existing: &ContextPolicy, incoming: &ContextPolicy) -> ContextPolicy {
    match (existing, incoming) {
        (ContextPolicy::Worlds(old), ContextPolicy::Worlds(new)) => {
            ContextPolicy::Worlds(old.union(new))
        }
        _ => incoming.clone(),
    }
}

fn assign_to_base(base: &BaseTransformer, assignment: &PolicyAssignment) -> BaseTransformer {
    let policy = match base.policy(&assignment.context) {
        Some(existing) if assignment.context == WORLDS => {
            merged_policy(existing, &assignment.policy)
        }
        _ => assignment.policy.clone(),
    };
    base.clone().with_policy(assignment.context.clone(), policy)
}

fn retaint(
    transformer: Option<&Transformer>,
    assignment: &PolicyAssignment,
) -> Option<Transformer> {
    let fresh = || {
        BaseTransformer::safe()
            .with_policy(assignment.context.clone(), assignment.policy.clone())
    };
    match transformer {
        Some(Transformer::Composed(c)) => {
            let members = c.members().iter().map(|m| assign_to_base(m, assignment));
            Some(ComposedTransformer::from_bases(members).into())
        }
        Some(Transformer::Base(b)) if b.policy(&assignment.context).is_some() => {
            Some(assign_to_base(b, assignment).into())
        }
        Some(Transformer::Base(b)) if assignment.force => {
            Some(assign_to_base(b, assignment).into())
        }
        None | Some(Transformer::Identity) if assignment.force => Some(fresh().into()),
        other => other.cloned(),
    }
}

/// Folds a policy into every chunk of `string` that it applies to.
///
/// Composed chunks update every member. A chunk that already has a policy
/// for the context has it replaced, except under `Worlds` where the scope
/// sets are merged.
///
/// # Examples
///
/// ```
/// use policy_taint::policy::{taint_field, PolicyAssignment, PolicyScope};
/// use policy_taint::{ContextPolicy, SanitizerRef, TaintedString, SQL};
///
/// let scope = PolicyScope::new("self", "User", "name");
/// let identity = ContextPolicy::Sanitizer(SanitizerRef::new("identity"));
/// let strict = PolicyAssignment::new(SQL, identity, scope);
///
/// let field = TaintedString::plain("id: ") + &TaintedString::default_tainted("bob");
/// let out = taint_field(&field, &strict);
/// assert!(!out.slice(&policy_taint::Slice::Len(0, 4)).unwrap().is_tracked());
///
/// let forced = taint_field(&field, &strict.clone().forced());
/// assert!(forced.taint_at(0).is_some());
/// ```
pub fn taint_field(string: &TaintedString, assignment: &PolicyAssignment) -> TaintedString {
    let mut out = TaintedString::default();
    for chunk in string.chunks() {
        out.push_chunk(chunk.text, retaint(chunk.transformer, assignment));
    }
    out
}

/// Applies an annotation's policy to a field and records it in the audit
/// trail.
pub fn assign_policy(
    string: &TaintedString,
    assignment: &PolicyAssignment,
    ctx: &Ctx,
) -> TaintedString {
    let out = taint_field(string, assignment);
    tracing::debug!(
        context = %assignment.context,
        scope = %assignment.scope,
        force = assignment.force,
        "policy assigned"
    );
    ctx.record(
        AuditEvent::new(AuditEventKind::PolicyAssigned, assignment.context.clone())
            .with_scope(assignment.scope.to_string())
            .with_chunks(string.segments().len()),
    );
    out
}

// Adds the violation handler under the VIOLATION key, keeping any sanitizer
// already recorded for the context as the DEFAULT.
fn with_violation(existing: Option<&ContextPolicy>, handler: &SanitizerRef) -> ContextPolicy {
    let mut map = match existing {
        Some(ContextPolicy::Nested(map)) => map.clone(),
        Some(ContextPolicy::Sanitizer(r)) => {
            [(DEFAULT_KEY.to_string(), r.clone())].into_iter().collect()
        }
        Some(ContextPolicy::Worlds(_)) | None => Default::default(),
    };
    map.insert(VIOLATION_KEY.to_string(), handler.clone());
    ContextPolicy::Nested(map)
}

/// Registers `handler` as what a tracked chunk turns into when access to it
/// under `context` is denied.
///
/// Untracked chunks are left alone. The handler is stored under the
/// `VIOLATION` sub-context key, next to whatever policy the chunk already
/// has for `context`.
pub fn assign_violation(
    string: &TaintedString,
    context: &str,
    handler: SanitizerRef,
    ctx: &Ctx,
) -> TaintedString {
    let add = |b: &BaseTransformer| {
        let policy = with_violation(b.policy(context), &handler);
        b.clone().with_policy(context, policy)
    };
    let mut out = TaintedString::default();
    for chunk in string.chunks() {
        let transformer = match chunk.transformer {
            Some(Transformer::Base(b)) => Some(add(b).into()),
            Some(Transformer::Composed(c)) => {
                Some(ComposedTransformer::from_bases(c.members().iter().map(&add)).into())
            }
            other => other.cloned(),
        };
        out.push_chunk(chunk.text, transformer);
    }
    ctx.record(
        AuditEvent::new(AuditEventKind::ViolationAssigned, context)
            .with_sub_context(VIOLATION_KEY)
            .with_scope(handler.name()),
    );
    out
}

fn violation_handler<'a>(transformer: &'a Transformer, context: &str) -> Option<&'a SanitizerRef> {
    let lookup = |b: &'a BaseTransformer| match b.policy(context) {
        Some(ContextPolicy::Nested(map)) => map.get(VIOLATION_KEY),
        _ => None,
    };
    match transformer {
        Transformer::Base(b) => lookup(b),
        Transformer::Composed(c) => c.members().iter().find_map(lookup),
        Transformer::Identity | Transformer::Rollback(_) => None,
    }
}

/// Replaces every chunk that carries a violation handler for `context` with
/// the handler's output, tagged safe.
///
/// Callers invoke this once they have decided access is denied. Chunks
/// without a handler are kept as they are.
///
/// # Errors
///
/// Returns [`TaintError::UnknownSanitizer`](crate::TaintError::UnknownSanitizer)
/// if a handler is not registered.
///
/// # Examples
///
/// ```
/// use policy_taint::policy::{apply_violation, assign_violation};
/// use policy_taint::{Ctx, SanitizerRef, TaintedString};
///
/// let ctx = Ctx::builder()
///     .sanitizer("redact", |_: &str| "[hidden]".to_string())
///     .build()
///     .unwrap();
/// let email = TaintedString::plain("mail: ") + &TaintedString::default_tainted("a@b.c");
///
/// let guarded = assign_violation(&email, "read", SanitizerRef::new("redact"), &ctx);
/// let denied = apply_violation(&guarded, "read", &ctx).unwrap();
/// assert_eq!(denied, "mail: [hidden]");
/// ```
pub fn apply_violation(string: &TaintedString, context: &str, ctx: &Ctx) -> Result<TaintedString> {
    let mut out = TaintedString::default();
    let mut applied = 0;
    for chunk in string.chunks() {
        match chunk.transformer.and_then(|t| violation_handler(t, context)) {
            Some(handler) => {
                let replaced = ctx.registry().resolve(handler)?.sanitize(chunk.text);
                out.push_chunk(&replaced, Some(Transformer::safe()));
                applied += 1;
            }
            None => out.push_chunk(chunk.text, chunk.transformer.cloned()),
        }
    }
    if applied > 0 {
        tracing::debug!(context, chunks = applied, "violation handlers applied");
        ctx.record(
            AuditEvent::new(AuditEventKind::ViolationApplied, context)
                .with_sub_context(VIOLATION_KEY)
                .with_chunks(applied),
        );
    }
    Ok(out)
}
