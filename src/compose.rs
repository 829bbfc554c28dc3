//! Blending of independently applied taints.
//!
//! When characters from two differently tainted sources end up sharing one
//! chunk (a callback substitution, a padded string, a compressed run), the
//! chunk carries a [`ComposedTransformer`] holding every contributing
//! [`BaseTransformer`]. Sanitizing such a chunk must not depend on the order
//! the policies happen to be stored in, so every permutation is applied and
//! all of them must agree.

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::context::Ctx;
use crate::error::{Result, TaintError};
use crate::transformer::{BaseTransformer, Transformer, Worlds, WORLDS};

/// An ordered set of base transformers applied together.
///
/// Members are always base transformers; composition is one level deep.
/// Value-equal members are stored once.
///
/// # Examples
///
/// ```
/// use policy_taint::{taint_union, Transformer};
///
/// let a = Transformer::default_policy();
/// let b = Transformer::safe();
/// let union = taint_union([Some(&a), None, Some(&b), Some(&a)]).unwrap();
/// assert_eq!(union.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposedTransformer {
    members: Vec<BaseTransformer>,
}

impl ComposedTransformer {
    /// Builds a composition from explicit members.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::NestedCompositionUnsupported`] if any member is
    /// not a base transformer.
    pub fn new(members: Vec<Transformer>) -> Result<Self> {
        let mut composed = Self::default();
        for member in members {
            match member {
                Transformer::Base(b) => composed.push(b),
                other => {
                    return Err(TaintError::NestedCompositionUnsupported {
                        found: other.kind_name(),
                    })
                }
            }
        }
        Ok(composed)
    }

    /// Builds a composition from base transformers.
    pub fn from_bases(members: impl IntoIterator<Item = BaseTransformer>) -> Self {
        let mut composed = Self::default();
        for member in members {
            composed.push(member);
        }
        composed
    }

    fn push(&mut self, member: BaseTransformer) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    /// Returns the member transformers.
    pub fn members(&self) -> &[BaseTransformer] {
        &self.members
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if nothing was blended in.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Converts into a segment transformer. An empty composition carries no
    /// taint at all and a single member is returned as a plain base.
    pub fn into_transformer(mut self) -> Option<Transformer> {
        match self.members.len() {
            0 => None,
            1 => self.members.pop().map(Transformer::Base),
            _ => Some(Transformer::Composed(self)),
        }
    }

    /// Returns a copy with every member's `Worlds` entry removed.
    pub fn without_worlds(&self) -> ComposedTransformer {
        Self::from_bases(self.members.iter().map(|m| m.without(WORLDS)))
    }

    /// Computes the least-privilege capability envelope of all members.
    ///
    /// Each capability set is intersected across members; a member without
    /// a `Worlds` entry, or without a given capability, empties it. Returns
    /// `None` when nothing survives.
    pub fn pull_worlds(&self) -> Option<Worlds> {
        let mut members = self.members.iter();
        let first = members.next()?.worlds()?.clone();
        let mut envelope = first;
        for member in members {
            let worlds = member.worlds()?;
            envelope = envelope.intersect(worlds);
        }
        if envelope.is_empty() {
            None
        } else {
            Some(envelope)
        }
    }

    /// Sanitizes `text` with every member, in every order.
    ///
    /// `Worlds` entries are ignored since they never change text. This is
    /// O(k!) in the number of members `k`, bounded by
    /// [`TaintConfig::max_composed`](crate::TaintConfig::max_composed).
    ///
    /// # Errors
    ///
    /// - [`TaintError::CompositionTooLarge`] if `k` exceeds the bound.
    /// - [`TaintError::NonCommutativeMixing`] if two orders disagree.
    pub fn transform(
        &self,
        text: &str,
        context: &str,
        sub_context: Option<&str>,
        ctx: &Ctx,
    ) -> Result<String> {
        let effective = self.without_worlds();
        let members = effective.members();
        let limit = ctx.config().max_composed;
        if members.len() > limit {
            tracing::warn!(
                context,
                members = members.len(),
                limit,
                "taint composition exceeds permutation bound"
            );
            return Err(TaintError::CompositionTooLarge {
                members: members.len(),
                limit,
            });
        }

        let mut expected: Option<String> = None;
        let outcome = for_each_permutation(members.len(), |order| {
            let mut current = text.to_string();
            for &i in order {
                current = members[i].transform(&current, context, sub_context, ctx.registry())?;
            }
            match &expected {
                None => expected = Some(current),
                Some(first) if *first == current => {}
                Some(_) => {
                    return Err(TaintError::NonCommutativeMixing {
                        context: context.to_string(),
                        members: members.len(),
                    })
                }
            }
            Ok(())
        });

        if let Err(err) = outcome {
            if matches!(err, TaintError::NonCommutativeMixing { .. }) {
                tracing::warn!(context, members = members.len(), "non-commutative taint blend");
                ctx.record(AuditEvent::new(AuditEventKind::NonCommutativeMixing, context));
            }
            return Err(err);
        }
        Ok(expected.unwrap_or_else(|| text.to_string()))
    }
}

/// Blends transformers into one composition.
///
/// `None` and identity inputs add no obligation and are dropped; composed
/// inputs are flattened into their members.
///
/// # Errors
///
/// Returns [`TaintError::NestedCompositionUnsupported`] for a rollback input:
/// content that was already provisionally sanitized cannot be blended.
pub fn taint_union<'a, I>(transformers: I) -> Result<ComposedTransformer>
where
    I: IntoIterator<Item = Option<&'a Transformer>>,
{
    let mut composed = ComposedTransformer::default();
    for transformer in transformers.into_iter().flatten() {
        match transformer {
            Transformer::Identity => {}
            Transformer::Base(b) => composed.push(b.clone()),
            Transformer::Composed(c) => {
                for member in c.members() {
                    composed.push(member.clone());
                }
            }
            Transformer::Rollback(_) => {
                return Err(TaintError::NestedCompositionUnsupported {
                    found: transformer.kind_name(),
                })
            }
        }
    }
    Ok(composed)
}

/// Returns the base members of a transformer that can be blended, or `None`
/// for identity and rollback transformers.
pub(crate) fn blendable_members(transformer: &Transformer) -> Option<Vec<BaseTransformer>> {
    match transformer {
        Transformer::Base(b) => Some(vec![b.clone()]),
        Transformer::Composed(c) => Some(c.members().to_vec()),
        Transformer::Identity | Transformer::Rollback(_) => None,
    }
}

// Heap's algorithm; stops at the first error.
fn for_each_permutation<F>(k: usize, mut visit: F) -> Result<()>
where
    F: FnMut(&[usize]) -> Result<()>,
{
    let mut order: Vec<usize> = (0..k).collect();
    let mut counters = vec![0usize; k];
    visit(&order)?;
    let mut i = 1;
    while i < k {
        if counters[i] < i {
            if i % 2 == 0 {
                order.swap(0, i);
            } else {
                order.swap(counters[i], i);
            }
            visit(&order)?;
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::SanitizerRef;
    use crate::transformer::{Capability, ContextPolicy};
    use crate::RollbackTransformer;
    use crate::TaintedString;

    fn base(context: &str, sanitizer: &str) -> BaseTransformer {
        BaseTransformer::safe().with_policy(
            context,
            ContextPolicy::Sanitizer(SanitizerRef::new(sanitizer)),
        )
    }

    fn worlds(w: Worlds) -> BaseTransformer {
        BaseTransformer::safe().with_policy(WORLDS, ContextPolicy::Worlds(w))
    }

    fn test_ctx() -> Ctx {
        Ctx::builder()
            .sanitizer("a_to_1", |s: &str| s.replace('a', "1"))
            .sanitizer("one_to_2", |s: &str| s.replace('1', "2"))
            .sanitizer("upper", |s: &str| s.to_uppercase())
            .sanitizer("strip_x", |s: &str| s.replace('x', ""))
            .build()
            .unwrap()
    }

    #[test]
    fn permutations_cover_every_order() {
        let mut seen = Vec::new();
        for_each_permutation(3, |order| {
            seen.push(order.to_vec());
            Ok(())
        })
        .unwrap();

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn permutations_of_zero_and_one() {
        let mut count = 0;
        for_each_permutation(0, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
        for_each_permutation(1, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn commuting_sanitizers_compose() {
        let ctx = test_ctx();
        let composed = ComposedTransformer::from_bases([base("X", "upper"), base("X", "strip_x")]);

        let out = composed.transform("abxc", "X", None, &ctx).unwrap();
        assert_eq!(out, "ABC");
    }

    #[test]
    fn non_commuting_sanitizers_are_rejected() {
        let ctx = test_ctx();
        let composed =
            ComposedTransformer::from_bases([base("X", "a_to_1"), base("X", "one_to_2")]);

        let err = composed.transform("a", "X", None, &ctx).unwrap_err();
        assert!(matches!(err, TaintError::NonCommutativeMixing { members: 2, .. }));
        assert_eq!(ctx.audit().len(), 1);
    }

    #[test]
    fn other_contexts_are_unaffected_by_mixing() {
        let ctx = test_ctx();
        let composed =
            ComposedTransformer::from_bases([base("X", "a_to_1"), base("X", "one_to_2")]);
        assert_eq!(composed.transform("a", "Y", None, &ctx).unwrap(), "a");
    }

    #[test]
    fn empty_composition_passes_through() {
        let ctx = test_ctx();
        let composed = ComposedTransformer::default();
        assert_eq!(composed.transform("<x>", "HTML", None, &ctx).unwrap(), "<x>");
        assert!(composed.into_transformer().is_none());
    }

    #[test]
    fn composition_bound_fails_fast() {
        let ctx = Ctx::builder()
            .config(crate::TaintConfig {
                max_composed: 2,
                ..Default::default()
            })
            .build()
            .unwrap();
        let composed = ComposedTransformer::from_bases([
            base("X", "identity"),
            base("Y", "identity"),
            base("Z", "identity"),
        ]);

        let err = composed.transform("a", "X", None, &ctx).unwrap_err();
        assert!(matches!(
            err,
            TaintError::CompositionTooLarge {
                members: 3,
                limit: 2
            }
        ));
    }

    #[test]
    fn worlds_only_differences_do_not_count_toward_bound() {
        let ctx = Ctx::builder()
            .config(crate::TaintConfig {
                max_composed: 1,
                ..Default::default()
            })
            .build()
            .unwrap();
        let composed = ComposedTransformer::from_bases([
            worlds(Worlds::new().with(Capability::Read, ["a"])),
            worlds(Worlds::new().with(Capability::Read, ["b"])),
        ]);
        assert_eq!(composed.len(), 2);
        assert_eq!(composed.transform("t", "HTML", None, &ctx).unwrap(), "t");
    }

    #[test]
    fn new_rejects_nested_members() {
        let inner = ComposedTransformer::from_bases([base("X", "upper")]);
        let err = ComposedTransformer::new(vec![Transformer::safe(), Transformer::Composed(inner)])
            .unwrap_err();
        assert!(matches!(
            err,
            TaintError::NestedCompositionUnsupported { found: "composed" }
        ));
    }

    #[test]
    fn union_flattens_and_drops_untracked() {
        let a = Transformer::Base(base("X", "upper"));
        let b = Transformer::Base(base("Y", "upper"));
        let ab = Transformer::Composed(taint_union([Some(&a), Some(&b)]).unwrap());

        let union = taint_union([Some(&ab), None, Some(&Transformer::Identity), Some(&a)]).unwrap();
        assert_eq!(union.members().len(), 2);
    }

    #[test]
    fn union_rejects_rollback() {
        let rollback = Transformer::Rollback(RollbackTransformer::new(TaintedString::plain("x")));
        let err = taint_union([Some(&rollback)]).unwrap_err();
        assert!(matches!(
            err,
            TaintError::NestedCompositionUnsupported { found: "rollback" }
        ));
    }

    #[test]
    fn pull_worlds_intersects_each_capability() {
        let composed = ComposedTransformer::from_bases([
            worlds(
                Worlds::new()
                    .with(Capability::Read, ["alice", "bob"])
                    .with(Capability::Write, ["alice"]),
            ),
            worlds(
                Worlds::new()
                    .with(Capability::Read, ["bob", "carol"])
                    .with(Capability::Write, ["alice", "bob"]),
            ),
        ]);

        let envelope = composed.pull_worlds().unwrap();
        assert!(envelope.allows(Capability::Read, "bob"));
        assert!(!envelope.allows(Capability::Read, "alice"));
        assert!(envelope.allows(Capability::Write, "alice"));
        assert!(envelope.scopes(Capability::ReadR).is_none());
    }

    #[test]
    fn pull_worlds_missing_capability_collapses() {
        let composed = ComposedTransformer::from_bases([
            worlds(Worlds::new().with(Capability::Read, ["a"])),
            worlds(Worlds::new().with(Capability::Write, ["a"])),
        ]);
        assert!(composed.pull_worlds().is_none());
    }

    #[test]
    fn pull_worlds_member_without_worlds_collapses() {
        let composed = ComposedTransformer::from_bases([
            worlds(Worlds::new().with(Capability::Read, ["a"])),
            base("X", "upper"),
        ]);
        assert!(composed.pull_worlds().is_none());
        assert!(ComposedTransformer::default().pull_worlds().is_none());
    }
}
