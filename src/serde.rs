//! # Serde module for Sketch
//!
//! This module provides serde-based (serialization and deserialization) features for
//! [`Sketch`], so partial results can be shipped between shards and reduced elsewhere.
//!
//! A sketch is serialized as a tuple `(precision, sparse_threshold, dense, data)` where `data`
//! holds either the sorted encoded hashes of the sparse representation or the packed registers
//! of the dense one.
//!
//! Deserialization validates every invariant (precision range, threshold, sort order and
//! encoding of sparse hashes, register slice length and ranks) and rejects malformed input
//! instead of producing a sketch that would estimate garbage.
//!
//! Refer to the serde documentation for more details on custom serialization and deserialization:
//! - [Serialization](https://serde.rs/impl-serialize.html)
//! - [Deserialization](https://serde.rs/impl-deserialize.html)
use serde::de::Error;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize};

use crate::config::CardinalityConfig;
use crate::error::CardinalityError;
use crate::estimator::Sketch;
use crate::hyperloglog::HyperLogLog;
use crate::representation::{is_valid_encoding, Representation};
use crate::sparse::Sparse;

impl Serialize for Sketch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut tup = serializer.serialize_tuple(4)?;
        tup.serialize_element(&self.precision())?;
        tup.serialize_element(&self.sparse_threshold())?;
        match &self.repr {
            Representation::Sparse(sparse) => {
                tup.serialize_element(&false)?;
                tup.serialize_element(sparse.items())?;
            }
            Representation::Dense(hll) => {
                tup.serialize_element(&true)?;
                tup.serialize_element(hll.data())?;
            }
        }
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Sketch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (precision, sparse_threshold, dense, data): (u8, usize, bool, Vec<u32>) =
            Deserialize::deserialize(deserializer)?;
        restore(precision, sparse_threshold, dense, data).map_err(D::Error::custom)
    }
}

fn restore(
    precision: u8,
    sparse_threshold: usize,
    dense: bool,
    data: Vec<u32>,
) -> Result<Sketch, CardinalityError> {
    CardinalityConfig::default()
        .with_precision(precision)
        .with_sparse_threshold(sparse_threshold)
        .validate()?;
    let repr = if dense {
        Representation::Dense(HyperLogLog::from_data(precision, data)?)
    } else {
        if !data.windows(2).all(|w| w[0] < w[1]) {
            return Err(CardinalityError::InvalidRepresentation(
                "sparse hashes are not strictly increasing",
            ));
        }
        if !data.iter().all(|&h| is_valid_encoding(h)) {
            return Err(CardinalityError::InvalidRepresentation(
                "sparse hash has an invalid encoding",
            ));
        }
        Representation::Sparse(Sparse::from_sorted(data))
    };
    Sketch::from_parts(precision, sparse_threshold, repr)
}
