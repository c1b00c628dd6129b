//! Cardinality aggregation over ordinal-encoded values.
//!
//! Collection happens leaf by leaf through [`OrdinalCardinalityAggregator::leaf_collector`],
//! which only records visited ordinals. [`OrdinalCardinalityAggregator::post_collection`] then
//! hashes every distinct visited ordinal exactly once and folds the hashes into per-bucket
//! HyperLogLog++ sketches, after which results can be built per bucket.
//!
//! ```
//! use ordinal_cardinality::in_memory::InMemoryIndex;
//! use ordinal_cardinality::{collect_leaf, CardinalityConfig, OrdinalCardinalityAggregator};
//!
//! let index = InMemoryIndex::new(&[vec![vec!["a"], vec!["b"]], vec![vec!["a"], vec!["c"]]]);
//! let mut aggregator = OrdinalCardinalityAggregator::new(
//!     "distinct_tags",
//!     Some("tags"),
//!     index.max_ord(),
//!     CardinalityConfig::default(),
//! )
//! .unwrap();
//! for segment in index.segments() {
//!     let mut collector = aggregator.leaf_collector(segment.leaf()).unwrap();
//!     collect_leaf(&mut segment.all_docs(), collector.as_mut(), 0).unwrap();
//! }
//! aggregator.post_collection(&index.segments()[0]).unwrap();
//! assert_eq!(aggregator.build_aggregation(0).value(), 3);
//! ```

use std::mem::size_of;

#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bit_array::BitArray;
use crate::breaker::MemoryBreaker;
use crate::collector::{BruteForceCollector, LeafCollector, NoOpCollector, PruningCollector};
use crate::competitive::CompetitiveIterator;
use crate::config::CardinalityConfig;
use crate::error::CardinalityError;
use crate::estimator::{hash_value, HyperLogLogPlusPlus, Sketch};
use crate::result::InternalCardinality;
use crate::source::{LeafContext, OrdinalValues};
use crate::visited::VisitedOrdinals;
use crate::BucketOrd;

/// Counts of the collection strategies chosen during one execution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Serialize, Deserialize))]
pub struct DebugCounters {
    /// Leaves collected with a competitive iterator
    pub dynamic_pruning_attempted: u64,
    /// Times a competitive iterator switched to following postings
    pub dynamic_pruning_used: u64,
    /// Leaves collected by recording every document's ordinals
    pub brute_force_used: u64,
    /// Leaves skipped because the field has no values in them
    pub skipped_due_to_no_data: u64,
}

impl DebugCounters {
    /// Report every counter under its name.
    pub fn for_each(&self, add: &mut dyn FnMut(&str, u64)) {
        add("dynamic_pruning_attempted", self.dynamic_pruning_attempted);
        add("dynamic_pruning_used", self.dynamic_pruning_used);
        add("brute_force_used", self.brute_force_used);
        add("skipped_due_to_no_data", self.skipped_due_to_no_data);
    }
}

/// Approximate distinct count of one field, per bucket of the surrounding aggregation.
#[derive(Debug)]
pub struct OrdinalCardinalityAggregator {
    name: String,
    field: Option<String>,
    config: CardinalityConfig,
    max_ord: u64,
    has_parent: bool,
    visited: VisitedOrdinals,
    counts: Option<HyperLogLogPlusPlus>,
    counters: DebugCounters,
    breaker: MemoryBreaker,
}

impl OrdinalCardinalityAggregator {
    /// Create an aggregator over a field whose values have global ordinals in `[0, max_ord)`.
    ///
    /// `field` is `None` when the values come from a script rather than an indexed field, which
    /// rules out dynamic pruning.
    pub fn new(
        name: impl Into<String>,
        field: Option<&str>,
        max_ord: u64,
        config: CardinalityConfig,
    ) -> Result<Self, CardinalityError> {
        config.validate()?;
        let name = name.into();
        debug!(
            name = %name,
            field = ?field,
            max_ord,
            precision = config.precision,
            "creating cardinality aggregator"
        );
        Ok(Self {
            name,
            field: field.map(str::to_owned),
            max_ord,
            has_parent: false,
            visited: VisitedOrdinals::new(max_ord),
            counts: None,
            counters: DebugCounters::default(),
            breaker: MemoryBreaker::new(config.memory_limit),
            config,
        })
    }

    /// Mark the aggregator as nested under a bucketing parent, which disables pruning.
    pub fn with_parent(mut self, has_parent: bool) -> Self {
        self.has_parent = has_parent;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn max_ord(&self) -> u64 {
        self.max_ord
    }

    #[inline]
    pub fn config(&self) -> &CardinalityConfig {
        &self.config
    }

    /// Pick the collection strategy for one leaf.
    pub fn leaf_collector<'s>(
        &'s mut self,
        leaf: LeafContext<'s>,
    ) -> Result<Box<dyn LeafCollector + 's>, CardinalityError> {
        let values = leaf.values;
        if values.max_ord() > self.max_ord {
            return Err(CardinalityError::OrdinalOutOfRange {
                ordinal: values.max_ord() - 1,
                max_ord: self.max_ord,
            });
        }
        if !self.has_parent && self.field.is_some() {
            if let Some(terms) = leaf.terms {
                let seen = self.visited.get(0).map_or(0, BitArray::cardinality);
                let num_non_visited = self.max_ord.saturating_sub(seen);
                let max_terms = self.config.max_terms_for_dynamic_pruning;
                if self.max_ord <= self.config.max_field_cardinality_for_dynamic_pruning
                    || num_non_visited <= max_terms
                {
                    self.counters.dynamic_pruning_attempted += 1;
                    debug!(
                        name = %self.name,
                        max_ord = self.max_ord,
                        num_non_visited,
                        "collecting leaf with dynamic pruning"
                    );
                    let bits = self.visited.get_or_create(0, &mut self.breaker)?;
                    let mut competitive =
                        CompetitiveIterator::new(values, terms, num_non_visited, max_terms);
                    if num_non_visited <= max_terms {
                        competitive.start_pruning(bits, &mut self.counters);
                    }
                    return Ok(Box::new(PruningCollector::new(
                        values,
                        self.max_ord,
                        bits,
                        competitive,
                        &mut self.counters,
                    )));
                }
            } else if leaf.field_indexed {
                self.counters.skipped_due_to_no_data += 1;
                debug!(name = %self.name, "field has no terms in leaf, skipping");
                return Ok(Box::new(NoOpCollector));
            }
        }
        self.counters.brute_force_used += 1;
        Ok(Box::new(BruteForceCollector::new(
            values,
            &mut self.visited,
            &mut self.breaker,
        )))
    }

    /// Turn visited ordinals into sketches. `values` resolves global ordinals to their bytes.
    ///
    /// Each distinct ordinal is hashed once no matter how many buckets visited it. On error no
    /// partial sketches are kept.
    pub fn post_collection(&mut self, values: &dyn OrdinalValues) -> Result<(), CardinalityError> {
        let mut visited = std::mem::replace(&mut self.visited, VisitedOrdinals::new(self.max_ord));
        let built = self.build_sketches(&mut visited, values);
        // bits of buckets not folded before an error
        visited.clear(&mut self.breaker);
        let (counts, distinct) = built?;

        debug!(
            name = %self.name,
            buckets = counts.max_bucket(),
            distinct,
            peak_memory = self.breaker.peak(),
            "built cardinality sketches"
        );
        self.counts = Some(counts);
        Ok(())
    }

    /// Fold every bucket's bits into its sketch, returning the sketches and the number of
    /// distinct visited ordinals.
    fn build_sketches(
        &mut self,
        visited: &mut VisitedOrdinals,
        values: &dyn OrdinalValues,
    ) -> Result<(HyperLogLogPlusPlus, u64), CardinalityError> {
        let mut counts = HyperLogLogPlusPlus::new(&self.config, visited.len())?;
        if visited.is_empty() {
            debug!(name = %self.name, "no bucket collected anything");
            return Ok((counts, 0));
        }

        let (hashes, distinct) = self.hash_visited(visited, values)?;
        let folded = self.fold_buckets(visited, &hashes, &mut counts);
        let hash_bytes = hashes.len() * size_of::<u64>();
        drop(hashes);
        self.breaker.release(hash_bytes);
        folded?;
        Ok((counts, distinct))
    }

    /// Collect cached hashes into the sketches, highest bucket first, releasing each bucket's
    /// bits as soon as they are folded.
    fn fold_buckets(
        &mut self,
        visited: &mut VisitedOrdinals,
        hashes: &[u64],
        counts: &mut HyperLogLogPlusPlus,
    ) -> Result<(), CardinalityError> {
        let mut reserved = 0;
        for bucket in (0..visited.len()).rev() {
            let Some(bits) = visited.take(bucket, &mut self.breaker) else {
                continue;
            };
            let folded = bits
                .iter_ones()
                .try_for_each(|ord| counts.collect(bucket, hashes[ord as usize]))
                .and_then(|()| {
                    let size = counts.get(bucket).map_or(0, Sketch::size_of);
                    self.breaker.reserve(size).map(|()| size)
                });
            match folded {
                Ok(size) => reserved += size,
                Err(err) => {
                    // sketches are discarded on error
                    self.breaker.release(reserved);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Hash of every ordinal visited by any bucket, indexed by ordinal.
    fn hash_visited(
        &mut self,
        visited: &VisitedOrdinals,
        values: &dyn OrdinalValues,
    ) -> Result<(Vec<u64>, u64), CardinalityError> {
        let len = self.max_ord as usize;
        let bytes = len * size_of::<u64>();
        self.breaker.reserve(bytes)?;
        let mut hashes = Vec::new();
        if let Err(source) = hashes.try_reserve_exact(len) {
            self.breaker.release(bytes);
            return Err(CardinalityError::AllocationFailed { bytes, source });
        }
        hashes.resize(len, 0);

        let all = visited
            .union_all(&mut self.breaker)
            .inspect_err(|_| self.breaker.release(bytes))?;
        let result = all.iter_ones().try_for_each(|ord| {
            let value = values
                .lookup_ord(ord)
                .ok_or(CardinalityError::MissingOrdinalValue(ord))?;
            hashes[ord as usize] = hash_value(value);
            Ok(())
        });
        self.breaker.release(BitArray::bytes_for(self.max_ord));
        if let Err(err) = result {
            self.breaker.release(bytes);
            return Err(err);
        }
        Ok((hashes, all.cardinality()))
    }

    /// Cardinality estimate of `bucket`, 0 before post-collection or for empty buckets.
    pub fn metric(&self, bucket: BucketOrd) -> u64 {
        self.counts.as_ref().map_or(0, |counts| counts.cardinality(bucket))
    }

    /// Partial result of `bucket`, holding an independent copy of its sketch.
    pub fn build_aggregation(&self, bucket: BucketOrd) -> InternalCardinality {
        match &self.counts {
            Some(counts) if bucket < counts.max_bucket() && counts.cardinality(bucket) > 0 => {
                InternalCardinality::new(self.name.clone(), counts.clone_bucket(bucket))
            }
            _ => self.build_empty_aggregation(),
        }
    }

    /// Result for a bucket that saw no values.
    pub fn build_empty_aggregation(&self) -> InternalCardinality {
        InternalCardinality::new(self.name.clone(), None)
    }

    /// Report the debug counters under their names.
    pub fn collect_debug_info(&self, add: &mut dyn FnMut(&str, u64)) {
        self.counters.for_each(add);
    }

    #[inline]
    pub fn debug_counters(&self) -> DebugCounters {
        self.counters
    }

    /// Bytes currently accounted for by bitsets and sketches
    #[inline]
    pub fn memory_used(&self) -> usize {
        self.breaker.used()
    }

    #[inline]
    pub fn peak_memory(&self) -> usize {
        self.breaker.peak()
    }
}
