#![no_main]

use libfuzzer_sys::fuzz_target;
use ordinal_cardinality::{CardinalityConfig, Sketch};
use wyhash::wyhash;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let split_index = wyhash(data, 0) as usize % data.len();
    let (first_half, second_half) = data.split_at(split_index);
    // precision in [4, 18]
    let precision = 4 + data[0] % 15;
    let config = CardinalityConfig::default().with_precision(precision);

    let mut sketch1 = Sketch::new(&config).unwrap();
    for chunk in first_half.chunks(4) {
        sketch1.insert_bytes(chunk).unwrap();
        assert!(sketch1.estimate() > 0);
        assert!(sketch1.size_of() > 0);
    }

    let mut sketch2 = Sketch::new(&config).unwrap();
    for chunk in second_half.chunks(4) {
        sketch2.insert_bytes(chunk).unwrap();
        assert!(sketch2.estimate() > 0);
        assert!(sketch2.size_of() > 0);
    }

    let mut merged = sketch1.clone();
    merged.merge(&sketch2).unwrap();
    let mut reversed = sketch2.clone();
    reversed.merge(&sketch1).unwrap();
    assert_eq!(merged, reversed);
});
