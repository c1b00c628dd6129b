//! Per-leaf collectors and the loop that feeds them.
//!
//! A leaf is collected by exactly one of three strategies chosen by
//! [`OrdinalCardinalityAggregator::leaf_collector`](crate::OrdinalCardinalityAggregator::leaf_collector):
//! skipping it, recording ordinals while pruning the document stream, or recording every
//! ordinal of every matching document into the bucket's visited set.

use tracing::trace;

use crate::aggregator::DebugCounters;
use crate::bit_array::BitArray;
use crate::breaker::MemoryBreaker;
use crate::competitive::CompetitiveIterator;
use crate::error::CardinalityError;
use crate::source::{DocIdIterator, OrdinalValues};
use crate::visited::VisitedOrdinals;
use crate::{BucketOrd, DocId, Ordinal, NO_MORE_DOCS};

/// Receives the matching documents of one leaf.
pub trait LeafCollector {
    /// Record the values of `doc` for `bucket`. Documents arrive in increasing order.
    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<(), CardinalityError>;

    /// Iterator of documents still worth collecting, if the collector can prune.
    fn competitive_iterator(&mut self) -> Option<&mut dyn DocIdIterator> {
        None
    }
}

/// Collects nothing, for leaves where the field has no values.
#[derive(Debug, Default)]
pub(crate) struct NoOpCollector;

impl LeafCollector for NoOpCollector {
    #[inline]
    fn collect(&mut self, _doc: DocId, _bucket: BucketOrd) -> Result<(), CardinalityError> {
        Ok(())
    }
}

#[inline]
fn check_ordinal(ord: Ordinal, max_ord: u64) -> Result<(), CardinalityError> {
    if ord < max_ord {
        Ok(())
    } else {
        Err(CardinalityError::OrdinalOutOfRange { ordinal: ord, max_ord })
    }
}

/// Records ordinals of the top-level bucket and prunes documents whose values were all seen.
pub(crate) struct PruningCollector<'a> {
    values: &'a dyn OrdinalValues,
    max_ord: u64,
    bits: &'a mut BitArray,
    competitive: CompetitiveIterator<'a>,
    counters: &'a mut DebugCounters,
}

impl<'a> PruningCollector<'a> {
    pub(crate) fn new(
        values: &'a dyn OrdinalValues,
        max_ord: u64,
        bits: &'a mut BitArray,
        competitive: CompetitiveIterator<'a>,
        counters: &'a mut DebugCounters,
    ) -> Self {
        Self {
            values,
            max_ord,
            bits,
            competitive,
            counters,
        }
    }
}

impl LeafCollector for PruningCollector<'_> {
    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<(), CardinalityError> {
        debug_assert_eq!(bucket, 0, "pruning only runs without a parent aggregation");
        for &ord in self.values.ordinals(doc) {
            check_ordinal(ord, self.max_ord)?;
            if !self.bits.get_and_set(ord) {
                trace!(doc, ord, "visited new ordinal");
                self.competitive
                    .on_visited_ordinal(ord, &*self.bits, self.counters);
            }
        }
        Ok(())
    }

    fn competitive_iterator(&mut self) -> Option<&mut dyn DocIdIterator> {
        Some(&mut self.competitive)
    }
}

/// Records every ordinal of every collected document into its bucket's visited set.
pub(crate) struct BruteForceCollector<'a> {
    values: &'a dyn OrdinalValues,
    max_ord: u64,
    visited: &'a mut VisitedOrdinals,
    breaker: &'a mut MemoryBreaker,
}

impl<'a> BruteForceCollector<'a> {
    pub(crate) fn new(
        values: &'a dyn OrdinalValues,
        visited: &'a mut VisitedOrdinals,
        breaker: &'a mut MemoryBreaker,
    ) -> Self {
        Self {
            values,
            max_ord: visited.max_ord(),
            visited,
            breaker,
        }
    }
}

impl LeafCollector for BruteForceCollector<'_> {
    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<(), CardinalityError> {
        let ords = self.values.ordinals(doc);
        if ords.is_empty() {
            return Ok(());
        }
        let bits = self.visited.get_or_create(bucket, self.breaker)?;
        for &ord in ords {
            check_ordinal(ord, self.max_ord)?;
            bits.set(ord);
        }
        Ok(())
    }
}

/// Feed every document of `matching` to `collector` under `bucket`, honoring the collector's
/// competitive iterator. Returns the number of documents collected.
pub fn collect_leaf(
    matching: &mut dyn DocIdIterator,
    collector: &mut dyn LeafCollector,
    bucket: BucketOrd,
) -> Result<u64, CardinalityError> {
    collect_leaf_with(matching, collector, |_| bucket)
}

/// Like [`collect_leaf`], with the bucket of each document chosen by `bucket_of`.
pub fn collect_leaf_with(
    matching: &mut dyn DocIdIterator,
    collector: &mut dyn LeafCollector,
    mut bucket_of: impl FnMut(DocId) -> BucketOrd,
) -> Result<u64, CardinalityError> {
    let mut collected = 0;
    let mut doc = matching.next_doc();
    while doc != NO_MORE_DOCS {
        if let Some(competitive) = collector.competitive_iterator() {
            let competitive_doc = competitive.advance(doc);
            if competitive_doc == NO_MORE_DOCS {
                break;
            }
            if competitive_doc > doc {
                doc = matching.advance(competitive_doc);
                continue;
            }
        }
        collector.collect(doc, bucket_of(doc))?;
        collected += 1;
        doc = matching.next_doc();
    }
    Ok(collected)
}
