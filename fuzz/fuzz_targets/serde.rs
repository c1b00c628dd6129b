#![no_main]

use libfuzzer_sys::fuzz_target;
use ordinal_cardinality::Sketch;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut sketch) = serde_json::from_slice::<Sketch>(data) {
        sketch.insert(&1).unwrap();
        assert!(sketch.estimate() > 0);
        let json = serde_json::to_vec(&sketch).unwrap();
        let restored: Sketch = serde_json::from_slice(&json).unwrap();
        assert_eq!(restored, sketch);
    }
});
