//! Memory accounting for one aggregation execution.

use crate::error::CardinalityError;

/// Tracks bytes held by visited bitsets, the hash cache and sketches against an optional limit.
///
/// Owned by a single aggregator, no state is shared between executions.
#[derive(Debug, Default, Clone)]
pub struct MemoryBreaker {
    limit: Option<usize>,
    used: usize,
    peak: usize,
}

impl MemoryBreaker {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            used: 0,
            peak: 0,
        }
    }

    /// Account for `bytes` more, failing without side effects if the limit would be exceeded.
    pub fn reserve(&mut self, bytes: usize) -> Result<(), CardinalityError> {
        let used = self.used.saturating_add(bytes);
        if let Some(limit) = self.limit {
            if used > limit {
                return Err(CardinalityError::MemoryLimitExceeded {
                    requested: bytes,
                    used: self.used,
                    limit,
                });
            }
        }
        self.used = used;
        self.peak = self.peak.max(used);
        Ok(())
    }

    pub fn release(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    /// Bytes currently accounted for
    pub fn used(&self) -> usize {
        self.used
    }

    /// Highest number of bytes accounted for at once
    pub fn peak(&self) -> usize {
        self.peak
    }
}
