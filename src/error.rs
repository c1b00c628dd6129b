use std::collections::TryReserveError;

use thiserror::Error;

use crate::Ordinal;

/// Errors raised while configuring, collecting or merging cardinality aggregations.
#[derive(Debug, Error)]
pub enum CardinalityError {
    #[error("precision must be in [{min}..={max}], got {precision}")]
    InvalidPrecision { precision: u8, min: u8, max: u8 },
    #[error("sparse threshold must be in [1..={max}], got {threshold}")]
    InvalidSparseThreshold { threshold: usize, max: usize },
    #[error("cannot merge sketches with different precisions ({left} vs {right})")]
    PrecisionMismatch { left: u8, right: u8 },
    #[error("invalid sketch representation: {0}")]
    InvalidRepresentation(&'static str),
    #[error("ordinal {ordinal} is out of range [0, {max_ord})")]
    OrdinalOutOfRange { ordinal: Ordinal, max_ord: u64 },
    #[error("no value found for visited ordinal {0}")]
    MissingOrdinalValue(Ordinal),
    #[error("memory limit of {limit} bytes exceeded: {used} bytes in use, {requested} requested")]
    MemoryLimitExceeded {
        requested: usize,
        used: usize,
        limit: usize,
    },
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },
}
