//! Aggregation settings, validated once before collection starts.

use crate::error::CardinalityError;

/// Smallest supported precision
pub const MIN_PRECISION: u8 = 4;
/// Largest supported precision (bounded by the LogLog-Beta coefficient table)
pub const MAX_PRECISION: u8 = 18;
/// Precision used when none is configured, matching a precision threshold of 3000.
pub const DEFAULT_PRECISION: u8 = 14;
/// Fields with at most this many ordinals are always collected with dynamic pruning.
pub const MAX_FIELD_CARDINALITY_FOR_DYNAMIC_PRUNING: u64 = 1024;
/// Pruning starts once at most this many ordinals remain unvisited.
pub const MAX_TERMS_FOR_DYNAMIC_PRUNING: u64 = 128;

/// Load factor of the hash table that a precision threshold is sized against.
const MAX_LOAD_FACTOR: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CardinalityConfig {
    /// Number of bits used for HyperLogLog register indices.
    pub precision: u8,
    /// Number of distinct encoded hashes kept in sparse form before promotion to registers.
    /// Defaults to `2^precision / 4`.
    pub sparse_threshold: Option<usize>,
    pub max_field_cardinality_for_dynamic_pruning: u64,
    pub max_terms_for_dynamic_pruning: u64,
    /// Upper bound on bytes held by bitsets, hash cache and sketches.
    pub memory_limit: Option<usize>,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            sparse_threshold: None,
            max_field_cardinality_for_dynamic_pruning: MAX_FIELD_CARDINALITY_FOR_DYNAMIC_PRUNING,
            max_terms_for_dynamic_pruning: MAX_TERMS_FOR_DYNAMIC_PRUNING,
            memory_limit: None,
        }
    }
}

impl CardinalityConfig {
    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Derive precision from a user-facing precision threshold (expected exact count).
    pub fn with_precision_threshold(self, count: u64) -> Self {
        self.with_precision(precision_from_threshold(count))
    }

    pub fn with_sparse_threshold(mut self, threshold: usize) -> Self {
        self.sparse_threshold = Some(threshold);
        self
    }

    pub fn with_dynamic_pruning_limits(mut self, max_field_cardinality: u64, max_terms: u64) -> Self {
        self.max_field_cardinality_for_dynamic_pruning = max_field_cardinality;
        self.max_terms_for_dynamic_pruning = max_terms;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Number of dense registers
    #[inline]
    pub fn registers(&self) -> usize {
        1 << self.precision
    }

    /// Effective sparse-to-dense promotion threshold
    #[inline]
    pub fn effective_sparse_threshold(&self) -> usize {
        self.sparse_threshold
            .unwrap_or_else(|| default_sparse_threshold(self.precision))
    }

    /// Reject settings that can not be collected with.
    pub fn validate(&self) -> Result<(), CardinalityError> {
        validate_precision(self.precision)?;
        let threshold = self.effective_sparse_threshold();
        let max = self.registers();
        if threshold == 0 || threshold > max {
            return Err(CardinalityError::InvalidSparseThreshold { threshold, max });
        }
        Ok(())
    }
}

pub(crate) fn validate_precision(precision: u8) -> Result<(), CardinalityError> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(CardinalityError::InvalidPrecision {
            precision,
            min: MIN_PRECISION,
            max: MAX_PRECISION,
        });
    }
    Ok(())
}

/// Sparse hashes take 4 bytes each against one byte per register.
#[inline]
pub(crate) fn default_sparse_threshold(precision: u8) -> usize {
    (1usize << precision) / 4
}

/// Compute the precision whose sparse form can hold `count` values.
pub fn precision_from_threshold(count: u64) -> u8 {
    let entries = (count as f64 / MAX_LOAD_FACTOR).ceil() as u64;
    let bytes = entries.saturating_mul(4);
    let bits_required = (u64::BITS - bytes.leading_zeros()) as u8;
    bits_required.clamp(MIN_PRECISION, MAX_PRECISION)
}
