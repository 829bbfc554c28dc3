//! Contextual sanitization for the `HTML` context.
//!
//! HTML output is assembled from fragments that are often rendered on their
//! own first (a partial, a helper's output) and then embedded in a larger
//! document. Sanitizing each fragment where it is first rendered would
//! escape it for the wrong context, and sanitizing the document again would
//! escape it twice. So every HTML sanitization is provisional: the result is
//! wrapped in a [`RollbackTransformer`](crate::RollbackTransformer) holding
//! the unsanitized input, and the next HTML sanitization of an enclosing
//! document first restores that input before classifying and sanitizing the
//! whole document.

mod classifier;

pub use classifier::{
    ContextClassifier, MarkupClassifier, NullClassifier, ATTRIBUTE_VALUE, STYLE_PATH, TAG,
};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::context::Ctx;
use crate::error::Result;
use crate::tainted::TaintedString;
use crate::transformer::{BaseTransformer, RollbackTransformer, Transformer, HTML};

/// Replaces every rollback chunk with the string it was sanitized from.
///
/// Restored backups keep their own segments.
///
/// # Examples
///
/// ```
/// use policy_taint::{run_rollback, Ctx, TaintedString, HTML};
///
/// let ctx = Ctx::new();
/// let fragment = TaintedString::default_tainted("<b>");
/// let sanitized = fragment.transform(HTML, None, &ctx).unwrap();
/// assert_eq!(sanitized, "&lt;b&gt;");
/// assert_eq!(run_rollback(&sanitized), fragment);
/// ```
pub fn run_rollback(string: &TaintedString) -> TaintedString {
    let mut out = TaintedString::default();
    for chunk in string.chunks() {
        match chunk.transformer {
            Some(Transformer::Rollback(r)) => out.push_tainted(&run_rollback(r.backup())),
            other => out.push_chunk(chunk.text, other.cloned()),
        }
    }
    out
}

// A chunk is unclassified when it owes an HTML policy but nothing in that
// policy matches its sub-context or DEFAULT.
fn is_unclassified(transformer: &Transformer, key: Option<&str>) -> bool {
    let unresolved = |b: &BaseTransformer| {
        b.policy(HTML).is_some() && b.sanitizer_for(HTML, key).is_none()
    };
    match transformer {
        Transformer::Base(b) => unresolved(b),
        Transformer::Composed(c) => c.members().iter().any(unresolved),
        Transformer::Identity | Transformer::Rollback(_) => false,
    }
}

/// Sanitizes a document for the `HTML` context.
///
/// Runs three phases: roll back provisional sanitization, classify the
/// restored document and sanitize each chunk with the sanitizer its policy
/// names for that sub-context, then wrap the result in a single rollback
/// transformer whose backup is the restored document.
pub(crate) fn transform_html(string: &TaintedString, ctx: &Ctx) -> Result<TaintedString> {
    let rollbacks = string
        .segments()
        .iter()
        .filter(|s| matches!(s.transformer, Some(Transformer::Rollback(_))))
        .count();
    let restored = if rollbacks > 0 {
        tracing::debug!(rollbacks, "restoring provisionally sanitized chunks");
        ctx.record(AuditEvent::new(AuditEventKind::RollbackApplied, HTML).with_chunks(rollbacks));
        run_rollback(string)
    } else {
        string.clone()
    };

    let ranges: Vec<_> = restored.chunks().map(|c| c.range()).collect();
    let keys = ctx.classifier().classify(restored.as_str(), &ranges);

    let mut out = String::with_capacity(restored.as_str().len());
    for (i, chunk) in restored.chunks().enumerate() {
        let key = keys.get(i).and_then(|k| k.as_deref());
        let Some(transformer) = chunk.transformer else {
            out.push_str(chunk.text);
            continue;
        };
        if is_unclassified(transformer, key) {
            tracing::warn!(
                sub_context = ?key,
                range = ?chunk.range(),
                "no sanitizer for html chunk"
            );
            let mut event =
                AuditEvent::new(AuditEventKind::UnclassifiedChunk, HTML).with_range(chunk.range());
            if let Some(k) = key {
                event = event.with_sub_context(k);
            }
            ctx.record(event);
            out.push_str(chunk.text);
            continue;
        }
        out.push_str(&transformer.transform(chunk.text, HTML, key, ctx)?);
    }

    ctx.record(AuditEvent::new(AuditEventKind::Sanitized, HTML).with_chunks(ranges.len()));
    let rollback = RollbackTransformer::new(restored);
    Ok(TaintedString::with_taint(out, Some(Transformer::Rollback(rollback))))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_utils::arb_markup_fragment;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn embedded_fragment_matches_in_place_sanitization(
            prefix in "[a-z<>/ ]{0,8}",
            fragment in arb_markup_fragment(),
            suffix in "[a-z<>/ ]{0,8}",
        ) {
            let ctx = Ctx::new();
            let raw = TaintedString::default_tainted(fragment);

            let rendered = raw.transform(HTML, None, &ctx).unwrap();
            let embedded = TaintedString::plain(prefix.clone()) + &rendered + suffix.as_str();
            let direct = TaintedString::plain(prefix) + &raw + suffix.as_str();

            let via_fragment = embedded.transform(HTML, None, &ctx).unwrap();
            let in_place = direct.transform(HTML, None, &ctx).unwrap();
            prop_assert_eq!(via_fragment, in_place);
        }
    }
}
