//! Shared proptest strategies.

use proptest::prelude::*;

use crate::chunk::{compose, Chunk};
use crate::tainted::TaintedString;
use crate::transformer::{BaseTransformer, ContextPolicy, Transformer, HTML, SQL};

// Strategy: one of the transformers strings commonly carry
fn arb_transformer() -> impl Strategy<Value = Option<Transformer>> {
    prop_oneof![
        Just(None),
        Just(Some(Transformer::safe())),
        Just(Some(Transformer::default_policy())),
        Just(Some(Transformer::Identity)),
        Just(Some(
            BaseTransformer::safe()
                .with_policy(HTML, ContextPolicy::nested([("DEFAULT", "invisible")]))
                .into()
        )),
        Just(Some(
            BaseTransformer::safe()
                .with_policy(SQL, ContextPolicy::nested([("DEFAULT", "identity")]))
                .into()
        )),
    ]
}

// Strategy: short chunk text, including multibyte characters
fn arb_chunk_text() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-c <>é€ ]{0,5}").unwrap()
}

/// A tainted string made of up to six chunks with mixed transformers.
pub(crate) fn arb_tainted_string() -> impl Strategy<Value = TaintedString> {
    prop::collection::vec((arb_chunk_text(), arb_transformer()), 0..6)
        .prop_map(|chunks| compose(chunks.into_iter().map(|(text, t)| Chunk::new(text, t))))
}

/// A fragment of text that may contain markup characters.
pub(crate) fn arb_markup_fragment() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z<>&\"' ]{1,10}").unwrap()
}
