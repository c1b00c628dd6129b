//! ## Bit array
//! Fixed-length bitset over ordinals `[0, len)` backed by `u64` words.
//!
//! Bits are only ever set while collecting, so a bit array doubles as the monotonic "visited"
//! set of one bucket and as the union of all visited ordinals during post-collection.

use std::mem::{size_of, size_of_val};

use crate::error::CardinalityError;
use crate::Ordinal;

const WORD_BITS: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    words: Vec<u64>,
    len: u64,
}

impl BitArray {
    /// Allocate a cleared bit array for `len` ordinals.
    pub fn new(len: u64) -> Result<Self, CardinalityError> {
        let num_words = len.div_ceil(WORD_BITS) as usize;
        let mut words = Vec::new();
        words
            .try_reserve_exact(num_words)
            .map_err(|source| CardinalityError::AllocationFailed {
                bytes: num_words * size_of::<u64>(),
                source,
            })?;
        words.resize(num_words, 0);
        Ok(Self { words, len })
    }

    /// Number of bytes a bit array over `len` ordinals holds.
    #[inline]
    pub fn bytes_for(len: u64) -> usize {
        len.div_ceil(WORD_BITS) as usize * size_of::<u64>()
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, ord: Ordinal) -> bool {
        let (word, mask) = Self::locate(ord);
        self.words[word] & mask != 0
    }

    #[inline]
    pub fn set(&mut self, ord: Ordinal) {
        let (word, mask) = Self::locate(ord);
        self.words[word] |= mask;
    }

    /// Set bit `ord` and return whether it was already set.
    #[inline]
    pub fn get_and_set(&mut self, ord: Ordinal) -> bool {
        let (word, mask) = Self::locate(ord);
        let old = self.words[word];
        self.words[word] = old | mask;
        old & mask != 0
    }

    /// Number of set bits
    pub fn cardinality(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Union `other` into `self`. Both must cover the same ordinal range.
    pub fn or(&mut self, other: &BitArray) {
        debug_assert_eq!(self.len, other.len);
        self.words
            .iter_mut()
            .zip(other.words.iter())
            .for_each(|(lhs, rhs)| *lhs |= *rhs);
    }

    /// Iterate set ordinals in increasing order.
    pub fn iter_ones(&self) -> impl Iterator<Item = Ordinal> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            let base = idx as u64 * WORD_BITS;
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = u64::from(rest.trailing_zeros());
                rest &= rest - 1;
                Some(base + bit)
            })
        })
    }

    /// Return memory size of `BitArray`
    #[inline]
    pub fn size_of(&self) -> usize {
        size_of::<Self>() + size_of_val(self.words.as_slice())
    }

    #[inline]
    fn locate(ord: Ordinal) -> (usize, u64) {
        ((ord / WORD_BITS) as usize, 1 << (ord % WORD_BITS))
    }
}
