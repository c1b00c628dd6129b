use enum_dispatch::enum_dispatch;

use crate::hyperloglog::HyperLogLog;
use crate::sparse::Sparse;

/// Register width in bits
pub(crate) const W: usize = 6;
/// Number of low hash bits kept by the sparse encoding
const SPARSE_INDEX_BITS: u32 = 25;
/// Rank stored by the sparse encoding is capped at the largest rank of the lowest precision
/// (`65 - MIN_PRECISION`).
const MAX_ENCODED_RANK: u32 = 61;

/// Representation types supported by `Sketch`
#[derive(Debug, Clone, PartialEq, Eq)]
#[enum_dispatch]
pub(crate) enum Representation {
    Sparse(Sparse),
    Dense(HyperLogLog),
}

/// Representation trait which must be implemented by all representations.
#[enum_dispatch(Representation)]
pub(crate) trait RepresentationTrait {
    fn insert_encoded_hash(&mut self, h: u32);
    fn estimate(&self) -> u64;
    fn size_of(&self) -> usize;
}

impl Representation {
    /// Short name of the representation used by `Debug` output
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Representation::Sparse(_) => "Sparse",
            Representation::Dense(_) => "Dense",
        }
    }
}

/// Compute the sparse encoding of the given hash
///
/// Layout: bits `6..31` hold the low 25 bits of `hash`, bits `0..6` its leading-zero rank.
/// The encoding is never 0.
#[inline]
pub(crate) fn encode_hash(hash: u64) -> u32 {
    let idx = (hash & ((1 << SPARSE_INDEX_BITS) - 1)) as u32;
    let rank = (hash.leading_zeros() + 1).min(MAX_ENCODED_RANK);
    (idx << W) | rank
}

/// Return register index and rank at `precision` from encoded sparse hash
#[inline]
pub(crate) fn decode_hash(h: u32, precision: u8) -> (u32, u32) {
    let rank = (h & ((1 << W) - 1)).min(65 - u32::from(precision));
    let idx = (h >> W) & ((1 << precision) - 1);
    (idx, rank)
}

/// Whether `h` could have been produced by [`encode_hash`]
#[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
#[inline]
pub(crate) fn is_valid_encoding(h: u32) -> bool {
    let rank = h & ((1 << W) - 1);
    h >> (SPARSE_INDEX_BITS + W as u32) == 0 && rank >= 1 && rank <= MAX_ENCODED_RANK
}
