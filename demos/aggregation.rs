use ordinal_cardinality::in_memory::InMemoryIndex;
use ordinal_cardinality::{
    collect_leaf, CardinalityConfig, CardinalityError, InternalCardinality,
    OrdinalCardinalityAggregator,
};

/// Aggregate one shard, returning its partial result
fn shard_result(name: &str, segments: &[Vec<Vec<&str>>]) -> Result<InternalCardinality, CardinalityError> {
    let index = InMemoryIndex::new(segments);
    let mut aggregator = OrdinalCardinalityAggregator::new(
        name,
        Some("country"),
        index.max_ord(),
        CardinalityConfig::default().with_precision_threshold(1000),
    )?;
    for segment in index.segments() {
        let mut collector = aggregator.leaf_collector(segment.leaf())?;
        let collected = collect_leaf(&mut segment.all_docs(), collector.as_mut(), 0)?;
        println!("{name}: collected {collected} of {} documents", segment.max_doc());
    }
    if let Some(first) = index.segments().first() {
        aggregator.post_collection(first)?;
    }
    aggregator.collect_debug_info(&mut |key, value| println!("{name}: {key} = {value}"));
    Ok(aggregator.build_aggregation(0))
}

fn main() -> Result<(), CardinalityError> {
    let shard1 = shard_result(
        "shard1",
        &[
            vec![vec!["de"], vec!["fr"], vec!["de"], vec!["it"], vec!["de"], vec!["fr"]],
            vec![vec!["fr"], vec!["es"], vec![], vec!["de", "es"]],
        ],
    )?;
    println!("shard1 estimate = {}", shard1.value());

    let shard2 = shard_result("shard2", &[vec![vec!["pt"], vec!["de"], vec!["nl"]]])?;
    println!("shard2 estimate = {}", shard2.value());

    if let Some(reduced) = InternalCardinality::reduce([shard1, shard2])? {
        println!("reduced estimate = {}", reduced.value());
    }
    Ok(())
}
