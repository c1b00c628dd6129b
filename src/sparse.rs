//! ## Sparse representation
//! Counts small cardinalities exactly as a sorted list of distinct encoded hashes.
//!
//! Two values only count once if their hashes share the low 25 bits and the rank, so among `n`
//! values about `n^2 / 2^27` pairs are expected to collide.
//!
//! Every encoded hash keeps the low 25 bits of the original hash and its rank, so the list can
//! be replayed into dense registers of any supported precision when it outgrows its threshold.

use std::cmp::Ordering;
use std::mem::{size_of, size_of_val};

use crate::representation::RepresentationTrait;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Sparse {
    /// Strictly increasing encoded hashes
    hashes: Vec<u32>,
}

impl Sparse {
    /// Create sparse representation from strictly increasing encoded hashes
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_sorted(hashes: Vec<u32>) -> Self {
        debug_assert!(hashes.windows(2).all(|w| w[0] < w[1]));
        Self { hashes }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Return items stored within `Sparse` representation
    #[inline]
    pub(crate) fn items(&self) -> &[u32] {
        &self.hashes
    }

    /// Union sorted `rhs` hashes into `self`
    pub(crate) fn union(&mut self, rhs: &[u32]) {
        if rhs.is_empty() {
            return;
        }
        let lhs = std::mem::take(&mut self.hashes);
        let mut merged = Vec::with_capacity(lhs.len() + rhs.len());
        let (mut i, mut j) = (0, 0);
        while i < lhs.len() && j < rhs.len() {
            match lhs[i].cmp(&rhs[j]) {
                Ordering::Less => {
                    merged.push(lhs[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(rhs[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(lhs[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&lhs[i..]);
        merged.extend_from_slice(&rhs[j..]);
        self.hashes = merged;
    }
}

impl RepresentationTrait for Sparse {
    /// Insert encoded hash keeping the list sorted and distinct
    #[inline]
    fn insert_encoded_hash(&mut self, h: u32) {
        if let Err(pos) = self.hashes.binary_search(&h) {
            self.hashes.insert(pos, h);
        }
    }

    /// Number of distinct encodings
    #[inline]
    fn estimate(&self) -> u64 {
        self.hashes.len() as u64
    }

    /// Return memory size of `Sparse`
    #[inline]
    fn size_of(&self) -> usize {
        size_of::<Self>() + size_of_val(self.hashes.as_slice())
    }
}
