//! HyperLogLog++ sketches estimate the number of distinct hashes inserted into them and are
//! defined by two runtime parameters:
//! - `precision`: in [4..18] range, which defines number of bits to use for register indices.
//! - `sparse_threshold`: number of distinct hashes kept exactly before switching to registers.
//!
//! # Data-structure design rationale
//!
//! ## Low memory footprint
//!
//! For precision 14 with the default threshold of 4096:
//! - Cardinality in [0..4096] range - 4 bytes per distinct value (sparse representation)
//! - Cardinality in [4097..] range - 12292 bytes (dense representation, 6 bits per register)
//!
//! ## Determinism
//! - Sparse lists are kept sorted, registers only ever grow, so a sketch depends on the set of
//!   inserted hashes and not on their arrival order.
//! - The harmonic sum is recomputed from registers in index order on every estimate.
//!
//! ## High accuracy
//! - Up to `sparse_threshold` values the cardinality is counted exactly (within hash collision
//!   chance of the 31-bit encoding).
//! - Past it, linear counting is used while below the published HyperLogLog++ thresholds, and
//!   LogLog-Beta bias corrected HyperLogLog above them.
//!   - Expected error:
//!     P = 10: 1.04 / sqrt(2^10) = 3.25%
//!     P = 12: 1.04 / sqrt(2^12) = 1.62%
//!     P = 14: 1.04 / sqrt(2^14) = 0.81%
//!     P = 18: 1.04 / sqrt(2^18) = 0.20%
//!
//! # Data storage format
//!
//! ## Sparse representation
//! Sorted `Vec<u32>` of encoded hashes: bits `6..31` store the low 25 bits of the hash and
//! bits `0..6` its rank, enough to rebuild the register of any precision up to 18.
//!
//! ## Dense representation
//! `2^P` registers packed with 6 bits each into a `Vec<u32>`.

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::mem::size_of;

use wyhash::WyHash;

use crate::config::CardinalityConfig;
use crate::error::CardinalityError;
use crate::hyperloglog::HyperLogLog;
use crate::representation::{encode_hash, Representation, RepresentationTrait};
use crate::sparse::Sparse;
use crate::BucketOrd;

/// Hash the raw bytes of a field value.
#[inline]
pub fn hash_value(bytes: &[u8]) -> u64 {
    wyhash::wyhash(bytes, 0)
}

/// Mergeable HyperLogLog++ sketch of one bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct Sketch {
    precision: u8,
    sparse_threshold: usize,
    pub(crate) repr: Representation,
}

impl Sketch {
    /// Creates new empty sketch, rejecting invalid settings
    pub fn new(config: &CardinalityConfig) -> Result<Self, CardinalityError> {
        config.validate()?;
        Ok(Self::with_params(
            config.precision,
            config.effective_sparse_threshold(),
        ))
    }

    /// Creates new empty sketch from already validated settings
    #[inline]
    pub(crate) fn with_params(precision: u8, sparse_threshold: usize) -> Self {
        Self {
            precision,
            sparse_threshold,
            repr: Representation::Sparse(Sparse::default()),
        }
    }

    /// Restore a sketch from its parts, validating every invariant
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_parts(
        precision: u8,
        sparse_threshold: usize,
        repr: Representation,
    ) -> Result<Self, CardinalityError> {
        CardinalityConfig::default()
            .with_precision(precision)
            .with_sparse_threshold(sparse_threshold)
            .validate()?;
        if let Representation::Sparse(sparse) = &repr {
            if sparse.len() > sparse_threshold {
                return Err(CardinalityError::InvalidRepresentation(
                    "sparse list exceeds its threshold",
                ));
            }
        }
        Ok(Self {
            precision,
            sparse_threshold,
            repr,
        })
    }

    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    #[inline]
    pub fn sparse_threshold(&self) -> usize {
        self.sparse_threshold
    }

    /// Return whether the sketch still counts exactly
    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self.repr, Representation::Sparse(_))
    }

    /// Insert a hashable item
    #[inline]
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) -> Result<(), CardinalityError> {
        let hash = BuildHasherDefault::<WyHash>::default().hash_one(item);
        self.insert_hash(hash)
    }

    /// Insert raw value bytes, hashed the same way collection hashes ordinal values
    #[inline]
    pub fn insert_bytes(&mut self, bytes: &[u8]) -> Result<(), CardinalityError> {
        self.insert_hash(hash_value(bytes))
    }

    /// Insert hash, promoting to dense registers once the sparse list outgrows its threshold
    #[inline]
    pub fn insert_hash(&mut self, hash: u64) -> Result<(), CardinalityError> {
        match &mut self.repr {
            Representation::Dense(hll) => {
                hll.insert_hash(hash);
                Ok(())
            }
            Representation::Sparse(sparse) => {
                sparse.insert_encoded_hash(encode_hash(hash));
                self.promote_if_needed()
            }
        }
    }

    /// Return cardinality estimate
    #[inline]
    pub fn estimate(&self) -> u64 {
        self.repr.estimate()
    }

    /// Merge `rhs` into `self`: set union while sparse, register-wise maximum when dense.
    ///
    /// The merged sketch keeps the smaller of both sparse thresholds.
    pub fn merge(&mut self, rhs: &Sketch) -> Result<(), CardinalityError> {
        if self.precision != rhs.precision {
            return Err(CardinalityError::PrecisionMismatch {
                left: self.precision,
                right: rhs.precision,
            });
        }
        self.sparse_threshold = self.sparse_threshold.min(rhs.sparse_threshold);
        match &rhs.repr {
            Representation::Sparse(rhs_sparse) => {
                match &mut self.repr {
                    Representation::Sparse(lhs) => lhs.union(rhs_sparse.items()),
                    Representation::Dense(lhs) => rhs_sparse
                        .items()
                        .iter()
                        .for_each(|&h| lhs.insert_encoded_hash(h)),
                }
                self.promote_if_needed()
            }
            Representation::Dense(rhs_hll) => {
                match &mut self.repr {
                    Representation::Dense(lhs) => lhs.merge(rhs_hll),
                    Representation::Sparse(lhs) => {
                        // when `self` is sparse - copy `rhs` registers and replay own hashes
                        let mut dense = rhs_hll.clone();
                        lhs.items()
                            .iter()
                            .for_each(|&h| dense.insert_encoded_hash(h));
                        self.repr = Representation::Dense(dense);
                    }
                }
                Ok(())
            }
        }
    }

    /// Return memory size of `Sketch`
    pub fn size_of(&self) -> usize {
        size_of::<Self>() - size_of::<Representation>() + self.repr.size_of()
    }

    /// Replace sparse representation by registers once it exceeds the threshold
    #[inline]
    fn promote_if_needed(&mut self) -> Result<(), CardinalityError> {
        if let Representation::Sparse(sparse) = &self.repr {
            if sparse.len() > self.sparse_threshold {
                let dense = HyperLogLog::from_items(self.precision, sparse.items())?;
                self.repr = Representation::Dense(dense);
            }
        }
        Ok(())
    }
}

impl Debug for Sketch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ representation: {}, precision: {}, estimate: {} }}",
            self.repr.name(),
            self.precision,
            self.estimate()
        )
    }
}

/// HyperLogLog++ sketches of many buckets, indexed by dense bucket ordinal.
///
/// Buckets are created on first collect; buckets never collected into report 0 and hold no
/// sketch.
#[derive(Debug, Clone)]
pub struct HyperLogLogPlusPlus {
    precision: u8,
    sparse_threshold: usize,
    sketches: Vec<Option<Sketch>>,
}

impl HyperLogLogPlusPlus {
    /// Creates sketches for `initial_buckets` buckets (growing on demand)
    pub fn new(config: &CardinalityConfig, initial_buckets: usize) -> Result<Self, CardinalityError> {
        config.validate()?;
        let mut sketches = Vec::new();
        sketches.resize_with(initial_buckets, || None);
        Ok(Self {
            precision: config.precision,
            sparse_threshold: config.effective_sparse_threshold(),
            sketches,
        })
    }

    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// One past the highest bucket ordinal that can hold a sketch
    #[inline]
    pub fn max_bucket(&self) -> BucketOrd {
        self.sketches.len()
    }

    /// Insert `hash` into the sketch of `bucket`
    #[inline]
    pub fn collect(&mut self, bucket: BucketOrd, hash: u64) -> Result<(), CardinalityError> {
        self.sketch_mut(bucket).insert_hash(hash)
    }

    /// Cardinality estimate of `bucket`, 0 when nothing was collected into it
    #[inline]
    pub fn cardinality(&self, bucket: BucketOrd) -> u64 {
        self.get(bucket).map_or(0, Sketch::estimate)
    }

    #[inline]
    pub fn get(&self, bucket: BucketOrd) -> Option<&Sketch> {
        self.sketches.get(bucket).and_then(Option::as_ref)
    }

    /// Merge an independent sketch into `bucket`
    pub fn merge(&mut self, bucket: BucketOrd, other: &Sketch) -> Result<(), CardinalityError> {
        if other.precision != self.precision {
            return Err(CardinalityError::PrecisionMismatch {
                left: self.precision,
                right: other.precision,
            });
        }
        self.sketch_mut(bucket).merge(other)
    }

    /// Independent copy of one bucket's sketch, suitable for a partial result
    pub fn clone_bucket(&self, bucket: BucketOrd) -> Option<Sketch> {
        self.get(bucket).cloned()
    }

    /// Return memory size of all sketches
    pub fn size_of(&self) -> usize {
        size_of::<Self>()
            + self
                .sketches
                .iter()
                .map(|s| s.as_ref().map_or(size_of::<Option<Sketch>>(), Sketch::size_of))
                .sum::<usize>()
    }

    fn sketch_mut(&mut self, bucket: BucketOrd) -> &mut Sketch {
        if bucket >= self.sketches.len() {
            self.sketches.resize_with(bucket + 1, || None);
        }
        let (precision, sparse_threshold) = (self.precision, self.sparse_threshold);
        self.sketches[bucket].get_or_insert_with(|| Sketch::with_params(precision, sparse_threshold))
    }
}
