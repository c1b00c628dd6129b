#![no_main]

use libfuzzer_sys::fuzz_target;
use ordinal_cardinality::in_memory::InMemoryIndex;
use ordinal_cardinality::{collect_leaf, CardinalityConfig, OrdinalCardinalityAggregator};

/// Split input into leaves on `0xff` and documents on `0xfe`, each remaining byte is a value.
fn index_from(data: &[u8]) -> InMemoryIndex {
    let segments: Vec<Vec<Vec<[u8; 1]>>> = data
        .split(|&b| b == 0xff)
        .map(|segment| {
            segment
                .split(|&b| b == 0xfe)
                .map(|doc| doc.iter().map(|&b| [b]).collect())
                .collect()
        })
        .collect();
    InMemoryIndex::new(&segments)
}

fn aggregate(index: &InMemoryIndex, has_parent: bool) -> (u64, u64) {
    let mut aggregator = OrdinalCardinalityAggregator::new(
        "fuzz",
        Some("field"),
        index.max_ord(),
        CardinalityConfig::default().with_dynamic_pruning_limits(16, 4),
    )
    .unwrap()
    .with_parent(has_parent);
    let mut collected = 0;
    for segment in index.segments() {
        let mut collector = aggregator.leaf_collector(segment.leaf()).unwrap();
        collected += collect_leaf(&mut segment.all_docs(), collector.as_mut(), 0).unwrap();
    }
    aggregator.post_collection(&index.segments()[0]).unwrap();
    (aggregator.metric(0), collected)
}

fuzz_target!(|data: &[u8]| {
    let index = index_from(data);
    let (pruned, pruned_docs) = aggregate(&index, false);
    let (brute, brute_docs) = aggregate(&index, true);
    assert_eq!(pruned, brute);
    assert!(pruned_docs <= brute_docs);
});
