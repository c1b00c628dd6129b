//! Per-bucket visited ordinal sets.

use crate::bit_array::BitArray;
use crate::breaker::MemoryBreaker;
use crate::error::CardinalityError;
use crate::BucketOrd;

/// Bucket-indexed arena of optional bit arrays; `None` marks a bucket that has not been
/// collected into (or whose bits were already folded into a sketch).
#[derive(Debug, Default)]
pub struct VisitedOrdinals {
    max_ord: u64,
    buckets: Vec<Option<BitArray>>,
}

impl VisitedOrdinals {
    pub fn new(max_ord: u64) -> Self {
        Self {
            max_ord,
            buckets: Vec::new(),
        }
    }

    #[inline]
    pub fn max_ord(&self) -> u64 {
        self.max_ord
    }

    /// One past the highest bucket slot allocated so far
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[inline]
    pub fn get(&self, bucket: BucketOrd) -> Option<&BitArray> {
        self.buckets.get(bucket).and_then(Option::as_ref)
    }

    /// Bits of `bucket`, allocating slots and the bit array on first use
    pub fn get_or_create(
        &mut self,
        bucket: BucketOrd,
        breaker: &mut MemoryBreaker,
    ) -> Result<&mut BitArray, CardinalityError> {
        if bucket >= self.buckets.len() {
            // `Vec` grows geometrically
            self.buckets.resize_with(bucket + 1, || None);
        }
        let max_ord = self.max_ord;
        let slot = &mut self.buckets[bucket];
        let bits = match slot {
            Some(bits) => bits,
            None => slot.insert(allocate(max_ord, breaker)?),
        };
        Ok(bits)
    }

    /// Detach the bits of `bucket`, leaving it absent.
    pub fn take(&mut self, bucket: BucketOrd, breaker: &mut MemoryBreaker) -> Option<BitArray> {
        let bits = self.buckets.get_mut(bucket).and_then(Option::take)?;
        breaker.release(BitArray::bytes_for(self.max_ord));
        Some(bits)
    }

    /// Drop the bits of every bucket still held
    pub fn clear(&mut self, breaker: &mut MemoryBreaker) {
        let bytes = BitArray::bytes_for(self.max_ord);
        for _ in self.buckets.drain(..).flatten() {
            breaker.release(bytes);
        }
    }

    /// Union of every bucket's bits
    pub fn union_all(&self, breaker: &mut MemoryBreaker) -> Result<BitArray, CardinalityError> {
        let mut all = allocate(self.max_ord, breaker)?;
        self.buckets
            .iter()
            .rev()
            .flatten()
            .for_each(|bits| all.or(bits));
        Ok(all)
    }
}

/// Allocate an accounted bit array, undoing the reservation if allocation fails
fn allocate(max_ord: u64, breaker: &mut MemoryBreaker) -> Result<BitArray, CardinalityError> {
    let bytes = BitArray::bytes_for(max_ord);
    breaker.reserve(bytes)?;
    BitArray::new(max_ord).inspect_err(|_| breaker.release(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_buckets() {
        let mut breaker = MemoryBreaker::default();
        let mut visited = VisitedOrdinals::new(100);
        assert!(visited.is_empty());
        visited.get_or_create(5, &mut breaker).unwrap().set(7);
        visited.get_or_create(5, &mut breaker).unwrap().set(9);
        visited.get_or_create(2, &mut breaker).unwrap().set(9);
        assert_eq!(visited.len(), 6);
        assert!(visited.get(0).is_none());
        assert_eq!(visited.get(5).unwrap().cardinality(), 2);
        assert_eq!(breaker.used(), 2 * BitArray::bytes_for(100));

        let all = visited.union_all(&mut breaker).unwrap();
        assert_eq!(all.iter_ones().collect::<Vec<_>>(), vec![7, 9]);

        let bits = visited.take(5, &mut breaker).unwrap();
        assert_eq!(bits.cardinality(), 2);
        assert!(visited.get(5).is_none());
        assert!(visited.take(5, &mut breaker).is_none());
        assert!(visited.take(50, &mut breaker).is_none());

        breaker.release(BitArray::bytes_for(100));
        visited.clear(&mut breaker);
        assert!(visited.is_empty());
        assert_eq!(breaker.used(), 0);
    }

    #[test]
    fn test_breaker_limit() {
        let mut breaker = MemoryBreaker::new(Some(BitArray::bytes_for(1000)));
        let mut visited = VisitedOrdinals::new(1000);
        visited.get_or_create(0, &mut breaker).unwrap();
        assert!(matches!(
            visited.get_or_create(1, &mut breaker),
            Err(CardinalityError::MemoryLimitExceeded { .. })
        ));
        assert!(visited.get(1).is_none());
    }
}
