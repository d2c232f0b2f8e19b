//! Performance benchmarks for the roadsnap index.
//!
//! Run with: `cargo bench`
//!
//! Uses synthetic city-scale road grids to measure bulk-load and
//! phantom-node query throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use roadsnap::{Coordinate, EdgeIndex, RoadEdge};

// ============================================================================
// Synthetic Network Generation
// ============================================================================

/// Generate a synthetic road network: short random segments scattered over
/// roughly one degree of a mid-latitude city region.
fn generate_network(edge_count: u32, seed: u64) -> Vec<RoadEdge> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..edge_count)
        .map(|id| {
            let lat = rng.gen_range(4_950_000..5_050_000);
            let lon = rng.gen_range(800_000..900_000);
            let dlat = rng.gen_range(-400..=400);
            let dlon = rng.gen_range(-400..=400);
            RoadEdge::new(
                id,
                id % 1024,
                rng.gen_range(1..500),
                Coordinate::new(lat, lon),
                Coordinate::new(lat + dlat, lon + dlon),
            )
        })
        .collect()
}

fn random_query(rng: &mut StdRng) -> Coordinate {
    Coordinate::new(
        rng.gen_range(4_950_000..5_050_000),
        rng.gen_range(800_000..900_000),
    )
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load");
    group.sample_size(10);

    for edge_count in [10_000u32, 50_000] {
        let edges = generate_network(edge_count, 7);
        group.bench_with_input(
            BenchmarkId::from_parameter(edge_count),
            &edges,
            |b, edges| {
                b.iter(|| {
                    let dir = TempDir::new().unwrap();
                    let tree_path = dir.path().join("bench.ramIndex");
                    let leaf_path = dir.path().join("bench.fileIndex");
                    EdgeIndex::build(black_box(edges), &tree_path, &leaf_path).unwrap();
                });
            },
        );
    }
    group.finish();
}

fn bench_phantom_node_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_phantom_node");

    for edge_count in [10_000u32, 100_000] {
        let edges = generate_network(edge_count, 11);
        let dir = TempDir::new().unwrap();
        let tree_path = dir.path().join("bench.ramIndex");
        let leaf_path = dir.path().join("bench.fileIndex");
        EdgeIndex::build(&edges, &tree_path, &leaf_path).unwrap();
        let index = EdgeIndex::open(&tree_path, &leaf_path).unwrap();

        let mut rng = StdRng::seed_from_u64(23);
        group.bench_function(BenchmarkId::from_parameter(edge_count), |b| {
            b.iter(|| {
                let query = random_query(&mut rng);
                index.find_phantom_node(black_box(&query), 18).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_simplify(c: &mut Criterion) {
    use roadsnap::{simplify, PolylineVertex};

    let mut rng = StdRng::seed_from_u64(31);
    let mut lat = 5_000_000;
    let mut lon = 850_000;
    let polyline: Vec<PolylineVertex> = (0..20_000)
        .map(|i| {
            lat += rng.gen_range(-300..=300);
            lon += rng.gen_range(50..=400);
            PolylineVertex::new(Coordinate::new(lat, lon), i == 0 || i == 19_999)
        })
        .collect();

    let mut group = c.benchmark_group("simplify");
    for zoom in [5u32, 12, 18] {
        group.bench_function(BenchmarkId::from_parameter(zoom), |b| {
            b.iter(|| {
                let mut work = polyline.clone();
                simplify(black_box(&mut work), zoom).unwrap();
                work
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_bulk_load,
    bench_phantom_node_query,
    bench_simplify
);
criterion_main!(benches);
