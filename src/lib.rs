//! Chunked taint tracking and context-aware sanitization for strings.
//!
//! Untrusted text is carried in a [`TaintedString`]: the raw text plus an
//! ordered list of [`Segment`]s recording, for every character, which
//! sanitization policy it still owes. Every string operation in this crate
//! propagates that metadata, so a value keeps its provenance through
//! concatenation, slicing, substitution, splitting and the rest. Sanitization
//! happens once, when the string reaches its final rendering context.
//!
//! # Core Types
//!
//! - [`TaintedString`]: text plus per-character taint
//! - [`Transformer`]: what a chunk owes (identity, base policy map, a blend
//!   of policies, or a rollback of a provisional sanitization)
//! - [`Ctx`]: explicit execution context holding the sanitizer registry,
//!   the HTML context classifier, configuration and the audit trail
//! - [`Sanitizer`]: the plugin contract for escaping functions
//!
//! # Examples
//!
//! ```
//! use policy_taint::{Ctx, Pattern, TaintedString, HTML, SQL};
//!
//! let ctx = Ctx::new();
//! let name = TaintedString::default_tainted("O'Brien <admin>");
//!
//! let greeting = TaintedString::plain("<p>Hello, ") + &name + "</p>";
//! assert_eq!(
//!     greeting.transform(HTML, None, &ctx).unwrap(),
//!     "<p>Hello, O&#39;Brien &lt;admin&gt;</p>",
//! );
//!
//! let first = name.split(Some(&Pattern::from(" ")), 0).remove(0);
//! assert_eq!(first.transform(SQL, None, &ctx).unwrap(), "O''Brien");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
mod chunk;
mod compose;
mod config;
mod context;
mod error;
mod html;
mod ops;
mod pattern;
pub mod persist;
pub mod policy;
mod sanitizer;
mod segment;
mod tainted;
mod transformer;

#[cfg(test)]
mod test_utils;

pub use chunk::{
    compose, compress_taint, decompose, rebuild_across_range, special_compress_taint, Chunk,
    ChunkRef, Chunks,
};
pub use compose::{taint_union, ComposedTransformer};
pub use config::{TaintConfig, MAX_COMPOSED_CEILING};
pub use context::{Ctx, CtxBuilder};
pub use error::{Result, TaintError};
pub use html::{
    run_rollback, ContextClassifier, MarkupClassifier, NullClassifier, ATTRIBUTE_VALUE,
    STYLE_PATH, TAG,
};
pub use ops::{ScanItem, Slice, Unpacked};
pub use pattern::{Pattern, TaintedMatch};
pub use sanitizer::{
    Identity, Invisible, NoHtml, Sanitizer, SanitizerRef, SanitizerRegistry, SqlDefault,
    IDENTITY, INVISIBLE, NO_HTML, SQL_DEFAULT,
};
pub use segment::Segment;
pub use tainted::TaintedString;
pub use transformer::{
    BaseTransformer, Capability, ContextPolicy, RollbackTransformer, Transformer, Worlds,
    DEFAULT_KEY, HTML, SCRIPT_PATH, SQL, VIOLATION_KEY, WORLDS,
};
