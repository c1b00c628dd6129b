#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::hash::BuildHasherDefault;

use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use hyperloglogplus::HyperLogLog as HyperLogLogTrait;
use ordinal_cardinality::in_memory::InMemoryIndex;
use ordinal_cardinality::{collect_leaf, CardinalityConfig, OrdinalCardinalityAggregator, Sketch};
use pprof::criterion::{Output, PProfProfiler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabled::settings::{Settings, Style};
use tabled::{Table, Tabled};
use wyhash::WyHash;

/// Aggregations run over `DEFAULT_NUM_DOCS` documents (or environment variable `DOCS`) split
/// into `NUM_SEGMENTS` leaves, for fields with an increasing number of distinct values.
const DEFAULT_NUM_DOCS: usize = 100_000;
const NUM_SEGMENTS: usize = 4;
const FIELD_CARDINALITIES: [usize; 5] = [4, 64, 1024, 16384, 65536];
/// Sketch operations are benchmarked against cardinalities ranging from 0 to
/// `DEFAULT_MAX_CARDINALITY` or environment variable `N` (if defined) with cardinality doubled
/// with every iteration as [0, 1, 2, ..., N].
const DEFAULT_MAX_CARDINALITY: usize = 65536;

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Protobuf));
    targets = benchmark
}
criterion_main!(benches);

fn benchmark(c: &mut Criterion) {
    let bench_results_path =
        std::env::var("BENCH_RESULTS_PATH").unwrap_or_else(|_| "target".to_string());
    let num_docs = env_or("DOCS", DEFAULT_NUM_DOCS);
    let max_cardinality = env_or("N", DEFAULT_MAX_CARDINALITY);

    let indexes: Vec<(usize, InMemoryIndex)> = FIELD_CARDINALITIES
        .iter()
        .map(|&distinct| (distinct, random_index(distinct, num_docs)))
        .collect();

    let mut group = c.benchmark_group("aggregate");
    group.throughput(Throughput::Elements(num_docs as u64));
    for (distinct, index) in &indexes {
        bench_aggregate(&mut group, "dynamic_pruning", index, *distinct, false);
        bench_aggregate(&mut group, "brute_force", index, *distinct, true);
    }
    group.finish();

    let results: Vec<CollectRecord> = indexes
        .iter()
        .map(|(distinct, index)| CollectRecord {
            field_cardinality: *distinct,
            dynamic_pruning: aggregate(index, false).to_string(),
            brute_force: aggregate(index, true).to_string(),
        })
        .collect();
    write_table(&bench_results_path, "collected_documents.md", results);

    let cardinalities: Vec<usize> = std::iter::once(0)
        .chain((0..).map(|c| 1 << c))
        .take_while(|&c| c <= max_cardinality)
        .collect();

    let mut group = c.benchmark_group("insert");
    for &cardinality in &cardinalities {
        group.throughput(Throughput::Elements(cardinality.max(1) as u64));
        bench_insert::<SketchEstimator>(&mut group, cardinality);
        bench_insert::<HyperLogLogPlus>(&mut group, cardinality);
    }
    group.finish();

    let mut group = c.benchmark_group("estimate");
    group.throughput(Throughput::Elements(1));
    for &cardinality in &cardinalities {
        bench_estimate::<SketchEstimator>(&mut group, cardinality);
        bench_estimate::<HyperLogLogPlus>(&mut group, cardinality);
    }
    group.finish();

    let results: Vec<StatRecord> = cardinalities
        .iter()
        .map(|&cardinality| StatRecord {
            cardinality,
            sketch: measure_allocations::<SketchEstimator>(cardinality),
            hyperloglogplus: measure_allocations::<HyperLogLogPlus>(cardinality),
        })
        .collect();
    write_table(&bench_results_path, "memory_usage.md", results);

    let results: Vec<StatRecord> = cardinalities
        .iter()
        .map(|&cardinality| StatRecord {
            cardinality,
            sketch: measure_error::<SketchEstimator>(cardinality),
            hyperloglogplus: measure_error::<HyperLogLogPlus>(cardinality),
        })
        .collect();
    write_table(&bench_results_path, "relative_error.md", results);
}

fn env_or(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn write_table<R: Tabled>(dir: &str, file: &str, records: Vec<R>) {
    let table_config = Settings::default().with(Style::markdown());
    std::fs::write(
        format!("{}/{}", dir, file),
        Table::new(records).with(table_config).to_string(),
    )
    .unwrap();
}

/// Single valued field with `distinct` values drawn uniformly
fn random_index(distinct: usize, num_docs: usize) -> InMemoryIndex {
    let mut rng = StdRng::seed_from_u64(12345);
    let per_segment = num_docs / NUM_SEGMENTS;
    let segments: Vec<Vec<Vec<String>>> = (0..NUM_SEGMENTS)
        .map(|_| {
            (0..per_segment)
                .map(|_| vec![format!("value-{}", rng.gen_range(0..distinct))])
                .collect()
        })
        .collect();
    InMemoryIndex::new(&segments)
}

/// Run a full aggregation, returning the number of collected documents
fn aggregate(index: &InMemoryIndex, has_parent: bool) -> u64 {
    let mut aggregator = OrdinalCardinalityAggregator::new(
        "bench",
        Some("field"),
        index.max_ord(),
        CardinalityConfig::default(),
    )
    .unwrap()
    .with_parent(has_parent);
    let mut collected = 0;
    for segment in index.segments() {
        let mut collector = aggregator.leaf_collector(segment.leaf()).unwrap();
        collected += collect_leaf(&mut segment.all_docs(), collector.as_mut(), 0).unwrap();
    }
    aggregator.post_collection(&index.segments()[0]).unwrap();
    black_box(aggregator.build_aggregation(0).value());
    collected
}

fn bench_aggregate(
    group: &mut BenchmarkGroup<WallTime>,
    name: &str,
    index: &InMemoryIndex,
    distinct: usize,
    has_parent: bool,
) {
    group.bench_with_input(BenchmarkId::new(name, distinct), index, |b, index| {
        b.iter(|| aggregate(index, has_parent));
    });
}

/// Cardinality estimator trait representing common estimator operations.
trait CardinalityEstimatorTrait {
    fn new() -> Self;
    fn insert(&mut self, item: &usize);
    fn estimate(&mut self) -> usize;
    fn name() -> String;
}

fn bench_insert<E: CardinalityEstimatorTrait>(
    group: &mut BenchmarkGroup<WallTime>,
    cardinality: usize,
) {
    group.bench_with_input(
        BenchmarkId::new(E::name(), cardinality),
        &cardinality,
        |b, &cardinality| {
            b.iter(|| {
                let mut estimator = E::new();
                for i in 0..black_box(cardinality) {
                    estimator.insert(black_box(&i));
                }
            });
        },
    );
}

fn bench_estimate<E: CardinalityEstimatorTrait>(
    group: &mut BenchmarkGroup<WallTime>,
    cardinality: usize,
) {
    group.bench_with_input(
        BenchmarkId::new(E::name(), cardinality),
        &cardinality,
        |b, &cardinality| {
            let mut estimator = E::new();
            for i in 0..black_box(cardinality) {
                estimator.insert(black_box(&i));
            }
            b.iter(|| estimator.estimate());
        },
    );
}

fn measure_allocations<E: CardinalityEstimatorTrait>(cardinality: usize) -> String {
    let _profiler = dhat::Profiler::builder().testing().build();
    let mut estimator = E::new();
    for i in 0..cardinality {
        estimator.insert(&i);
    }
    let stats = dhat::HeapStats::get();
    format!(
        "{} / {} / {}",
        std::mem::size_of::<E>(),
        stats.total_bytes,
        stats.total_blocks,
    )
}

fn measure_error<E: CardinalityEstimatorTrait>(cardinality: usize) -> String {
    let n = 100;
    let mut total_relative_error: f64 = 0.0;
    let mut rng = StdRng::seed_from_u64(12345);
    for _ in 0..n {
        let mut estimator = E::new();
        for _ in 0..cardinality {
            estimator.insert(&rng.gen());
        }
        let relative_error = if cardinality == 0 {
            0.0
        } else {
            (estimator.estimate() as f64 - cardinality as f64).abs() / cardinality as f64
        };
        total_relative_error += relative_error;
    }
    let avg_relative_error = total_relative_error / (n as f64);

    if avg_relative_error < 1.0 {
        format!("{:.4}", avg_relative_error)
    } else {
        format!("{:.2e}", avg_relative_error)
    }
}

#[derive(Tabled)]
struct StatRecord {
    cardinality: usize,
    sketch: String,
    hyperloglogplus: String,
}

#[derive(Tabled)]
struct CollectRecord {
    field_cardinality: usize,
    dynamic_pruning: String,
    brute_force: String,
}

struct SketchEstimator(Sketch);

impl CardinalityEstimatorTrait for SketchEstimator {
    fn new() -> Self {
        Self(Sketch::new(&CardinalityConfig::default().with_precision(12)).unwrap())
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item).unwrap();
    }

    fn estimate(&mut self) -> usize {
        self.0.estimate() as usize
    }

    fn name() -> String {
        "ordinal-cardinality".to_string()
    }
}

struct HyperLogLogPlus(hyperloglogplus::HyperLogLogPlus<usize, BuildHasherDefault<WyHash>>);

impl CardinalityEstimatorTrait for HyperLogLogPlus {
    fn new() -> Self {
        Self(
            hyperloglogplus::HyperLogLogPlus::new(12, BuildHasherDefault::<WyHash>::default())
                .unwrap(),
        )
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.count() as usize
    }

    fn name() -> String {
        "hyperloglogplus".to_string()
    }
}
