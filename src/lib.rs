//! `ordinal-cardinality` estimates how many distinct values a field takes within each bucket of
//! an aggregation over a segmented, ordinal-encoded index, without materializing the values.
//!
//! Collection records visited ordinals per bucket in bitsets, optionally pruning the document
//! stream once every value of the field has been observed. After collection, each distinct
//! visited ordinal is hashed once and folded into per-bucket HyperLogLog++ sketches, which can
//! be cloned into independent results and merged across shards.
pub mod aggregator;
pub mod bit_array;
pub mod breaker;
pub mod collector;
pub mod competitive;
pub mod config;
pub mod error;
pub mod estimator;
mod hyperloglog;
pub mod in_memory;
mod representation;
pub mod result;
#[cfg(feature = "with_serde")]
mod serde;
pub mod source;
mod sparse;
pub mod visited;

/// Document id within one leaf.
pub type DocId = u32;
/// Dense per-field ordinal of a distinct value, in `[0, max_ord)`.
pub type Ordinal = u64;
/// Dense bucket identifier supplied by the surrounding aggregation.
pub type BucketOrd = usize;

/// Sentinel returned by exhausted document iterators.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

pub use aggregator::{DebugCounters, OrdinalCardinalityAggregator};
pub use collector::{collect_leaf, LeafCollector};
pub use config::CardinalityConfig;
pub use error::CardinalityError;
pub use estimator::{HyperLogLogPlusPlus, Sketch};
pub use result::InternalCardinality;
pub use source::{DocIdIterator, LeafContext, OrdinalValues, TermDictionary};
