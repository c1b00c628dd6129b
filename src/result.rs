//! Partial and reduced results of a cardinality aggregation.

#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

use crate::error::CardinalityError;
use crate::estimator::Sketch;

/// Result of one bucket on one shard. Owns an independent copy of the bucket's sketch, so it
/// stays valid after the aggregator is dropped and can be merged with results of other shards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Serialize, Deserialize))]
pub struct InternalCardinality {
    name: String,
    /// `None` for buckets that saw no values
    sketch: Option<Sketch>,
}

impl InternalCardinality {
    pub fn new(name: impl Into<String>, sketch: Option<Sketch>) -> Self {
        Self {
            name: name.into(),
            sketch,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sketch(&self) -> Option<&Sketch> {
        self.sketch.as_ref()
    }

    /// Estimated number of distinct values, 0 without a sketch.
    #[inline]
    pub fn value(&self) -> u64 {
        self.sketch.as_ref().map_or(0, Sketch::estimate)
    }

    /// Merge `other` into `self`. Results without a sketch are neutral.
    pub fn merge(&mut self, other: &InternalCardinality) -> Result<(), CardinalityError> {
        match (&mut self.sketch, &other.sketch) {
            (_, None) => Ok(()),
            (Some(lhs), Some(rhs)) => lhs.merge(rhs),
            (lhs @ None, Some(rhs)) => {
                *lhs = Some(rhs.clone());
                Ok(())
            }
        }
    }

    /// Combine partial results of the same aggregation into one, named after the first part.
    ///
    /// Returns `None` when there are no parts.
    pub fn reduce<I>(parts: I) -> Result<Option<InternalCardinality>, CardinalityError>
    where
        I: IntoIterator<Item = InternalCardinality>,
    {
        let mut parts = parts.into_iter();
        let Some(mut reduced) = parts.next() else {
            return Ok(None);
        };
        for part in parts {
            reduced.merge(&part)?;
        }
        Ok(Some(reduced))
    }
}
