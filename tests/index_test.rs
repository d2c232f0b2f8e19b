//! Integration tests for building, opening, and querying the edge index.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use roadsnap::geo_utils::project_onto_segment;
use roadsnap::{Coordinate, EdgeIndex, RoadEdge, RoadSnapError};

fn index_paths(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    (
        dir.path().join("network.ramIndex"),
        dir.path().join("network.fileIndex"),
    )
}

fn build_and_open(edges: &[RoadEdge]) -> (TempDir, EdgeIndex) {
    let dir = TempDir::new().unwrap();
    let (tree_path, leaf_path) = index_paths(&dir);
    EdgeIndex::build(edges, &tree_path, &leaf_path).unwrap();
    let index = EdgeIndex::open(&tree_path, &leaf_path).unwrap();
    (dir, index)
}

/// Random city-scale edges around 50°N 8.5°E with stable ids.
fn random_edges(count: u32, seed: u64) -> Vec<RoadEdge> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let lat = rng.gen_range(4_950_000..5_050_000);
            let lon = rng.gen_range(800_000..900_000);
            let dlat = rng.gen_range(-500..=500);
            let dlon = rng.gen_range(-500..=500);
            RoadEdge::new(
                id,
                id % 97,
                rng.gen_range(1..300),
                Coordinate::new(lat, lon),
                Coordinate::new(lat + dlat, lon + dlon),
            )
        })
        .collect()
}

#[test]
fn test_build_then_open_round_trip() {
    let edges = random_edges(200, 7);
    let (_dir, index) = build_and_open(&edges);

    assert_eq!(index.len(), 200);
    assert!(!index.is_empty());

    // The root rectangle covers every input endpoint.
    let root = index.root_mbr();
    for edge in &edges {
        for point in [edge.start(), edge.end()] {
            assert!(root.min_lat <= point.lat && point.lat <= root.max_lat);
            assert!(root.min_lon <= point.lon && point.lon <= root.max_lon);
        }
    }
}

#[test]
fn test_interior_rectangles_cover_children() {
    // Enough edges for several leaf pages and a real interior level.
    let edges = random_edges(4_000, 21);
    let (_dir, index) = build_and_open(&edges);
    index.validate().unwrap();
}

#[test]
fn test_build_rejects_empty_edge_list() {
    let dir = TempDir::new().unwrap();
    let (tree_path, leaf_path) = index_paths(&dir);

    let err = EdgeIndex::build(&[], &tree_path, &leaf_path).unwrap_err();
    assert!(matches!(err, RoadSnapError::InvalidInput { .. }));
    // A failed build leaves no partial files behind.
    assert!(!tree_path.exists());
    assert!(!leaf_path.exists());
}

#[test]
fn test_open_missing_files_is_storage_error() {
    let dir = TempDir::new().unwrap();
    let (tree_path, leaf_path) = index_paths(&dir);
    let err = EdgeIndex::open(&tree_path, &leaf_path).unwrap_err();
    assert!(matches!(err, RoadSnapError::StorageUnavailable(_)));
}

#[test]
fn test_open_rejects_empty_tree() {
    let dir = TempDir::new().unwrap();
    let (tree_path, leaf_path) = index_paths(&dir);

    // A header promising zero nodes is corruption, not an empty result.
    std::fs::write(&tree_path, 0u32.to_le_bytes()).unwrap();
    std::fs::write(&leaf_path, 0u64.to_le_bytes()).unwrap();

    let err = EdgeIndex::open(&tree_path, &leaf_path).unwrap_err();
    assert!(matches!(err, RoadSnapError::Corrupt { .. }));
}

#[test]
fn test_open_rejects_truncated_body() {
    let dir = TempDir::new().unwrap();
    let (tree_path, leaf_path) = index_paths(&dir);

    let mut bytes = 5u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0u8; 13]);
    std::fs::write(&tree_path, bytes).unwrap();
    std::fs::write(&leaf_path, 0u64.to_le_bytes()).unwrap();

    let err = EdgeIndex::open(&tree_path, &leaf_path).unwrap_err();
    assert!(matches!(err, RoadSnapError::Corrupt { .. }));
}

#[test]
fn test_bidirected_pair_fuses() {
    // The same road in both directions: consecutive ids, mirrored
    // endpoints, equal weights.
    let a = Coordinate::new(500_000, 500_000);
    let b = Coordinate::new(500_000, 501_000);
    let edges = vec![
        RoadEdge::new(10, 5, 100, a, b),
        RoadEdge::new(11, 5, 100, b, a),
    ];
    let (_dir, index) = build_and_open(&edges);

    let phantom = index
        .find_phantom_node(&Coordinate::new(500_000, 500_500), 18)
        .unwrap()
        .unwrap();

    assert_eq!(phantom.edge_based_node_id, 10, "smaller id fronts the pair");
    assert!(phantom.is_bidirected());
    assert_eq!(phantom.location, Coordinate::new(500_000, 500_500));
    assert!((phantom.ratio - 0.5).abs() < 1e-9);
    // Ratio-scaled halves of the two 100-weights.
    assert_eq!(phantom.weight1, 50);
    assert_eq!(phantom.weight2, 50);
    assert_eq!(phantom.weight1 + phantom.weight2, 100);
    assert_eq!(phantom.name_id, 5);
}

#[test]
fn test_unidirected_edge_keeps_sentinel() {
    let a = Coordinate::new(500_000, 500_000);
    let b = Coordinate::new(500_000, 501_000);
    let edges = vec![RoadEdge::new(10, 5, 100, a, b)];
    let (_dir, index) = build_and_open(&edges);

    let phantom = index
        .find_phantom_node(&Coordinate::new(500_000, 500_500), 18)
        .unwrap()
        .unwrap();

    assert!(!phantom.is_bidirected());
    assert_eq!(phantom.weight2, i32::MAX);
    assert_eq!(phantom.weight1, 50, "weight 100 scaled by ratio 0.5");
}

#[test]
fn test_single_edge_tree_matches_everywhere() {
    let edges = vec![RoadEdge::new(
        0,
        0,
        10,
        Coordinate::new(5_000_000, 850_000),
        Coordinate::new(5_000_400, 850_400),
    )];
    let (_dir, index) = build_and_open(&edges);

    for coord in [
        Coordinate::new(5_000_000, 850_000),
        Coordinate::new(4_000_000, 700_000),
        Coordinate::new(6_000_000, 950_000),
    ] {
        let edge = index.nearest_edge(&coord, 18).unwrap().unwrap();
        assert_eq!(edge.id, 0);
    }
}

#[test]
fn test_degenerate_segment_point_distance() {
    let point = Coordinate::new(500_000, 500_000);
    let edges = vec![RoadEdge::new(3, 0, 100, point, point)];
    let (_dir, index) = build_and_open(&edges);

    // Off the point: ratio 0, location is the point itself.
    let phantom = index
        .find_phantom_node(&Coordinate::new(500_030, 500_040), 18)
        .unwrap()
        .unwrap();
    assert_eq!(phantom.ratio, 0.0);
    assert_eq!(phantom.location, point);

    // Exactly on the point: ratio 1 by the projection policy.
    let phantom = index.find_phantom_node(&point, 18).unwrap().unwrap();
    assert_eq!(phantom.ratio, 1.0);
    assert_eq!(phantom.location, point);
}

#[test]
fn test_tiny_component_zoom_boundary() {
    // A tiny-component edge right next to the query, a regular edge far
    // away.
    let near_tiny = RoadEdge::new(
        0,
        0,
        10,
        Coordinate::new(5_000_000, 850_000),
        Coordinate::new(5_000_000, 850_400),
    )
    .in_tiny_component();
    let far_regular = RoadEdge::new(
        1,
        0,
        10,
        Coordinate::new(5_020_000, 870_000),
        Coordinate::new(5_020_000, 870_400),
    );
    let (_dir, index) = build_and_open(&[near_tiny, far_regular]);

    let query = Coordinate::new(5_000_010, 850_200);

    // Suppressed at zoom 14 and below.
    let at_14 = index.nearest_edge(&query, 14).unwrap().unwrap();
    assert_eq!(at_14.id, 1);

    // Admitted from zoom 15 on.
    let at_15 = index.nearest_edge(&query, 15).unwrap().unwrap();
    assert_eq!(at_15.id, 0);
}

#[test]
fn test_all_candidates_filtered_returns_none() {
    let edges: Vec<RoadEdge> = (0..5)
        .map(|i| {
            RoadEdge::new(
                i,
                0,
                10,
                Coordinate::new(5_000_000 + i as i32 * 100, 850_000),
                Coordinate::new(5_000_000 + i as i32 * 100, 850_400),
            )
            .in_tiny_component()
        })
        .collect();
    let (_dir, index) = build_and_open(&edges);

    let query = Coordinate::new(5_000_000, 850_200);
    assert!(index.find_phantom_node(&query, 10).unwrap().is_none());
    // The same tree answers once the zoom admits tiny components.
    assert!(index.find_phantom_node(&query, 15).unwrap().is_some());
}

#[test]
fn test_ignored_edges_never_match() {
    let near_ignored = RoadEdge::new(
        0,
        0,
        10,
        Coordinate::new(5_000_000, 850_000),
        Coordinate::new(5_000_000, 850_400),
    )
    .ignored();
    let far_regular = RoadEdge::new(
        1,
        0,
        10,
        Coordinate::new(5_020_000, 870_000),
        Coordinate::new(5_020_000, 870_400),
    );
    let (_dir, index) = build_and_open(&[near_ignored, far_regular]);

    let found = index
        .nearest_edge(&Coordinate::new(5_000_010, 850_200), 18)
        .unwrap()
        .unwrap();
    assert_eq!(found.id, 1);
}

#[test]
fn test_query_rejects_bad_zoom() {
    let edges = random_edges(10, 3);
    let (_dir, index) = build_and_open(&edges);

    let err = index
        .find_phantom_node(&Coordinate::new(5_000_000, 850_000), 19)
        .unwrap_err();
    assert!(matches!(err, RoadSnapError::InvalidInput { .. }));
}

#[test]
fn test_integer_snap_to_query_axis() {
    // A diagonal segment whose projection foot truncates one unit below
    // the query latitude.
    let edges = vec![RoadEdge::new(
        0,
        0,
        10,
        Coordinate::new(0, 0),
        Coordinate::new(1_000, 1_000),
    )];
    let (_dir, index) = build_and_open(&edges);

    let query = Coordinate::new(500, 499);
    let phantom = index.find_phantom_node(&query, 18).unwrap().unwrap();
    // Foot is (499.5, 499.5) → truncated (499, 499) → latitude snapped
    // back onto the query.
    assert_eq!(phantom.location, Coordinate::new(500, 499));
}

#[test]
fn test_ratio_always_in_unit_interval() {
    let edges = random_edges(500, 99);
    let (_dir, index) = build_and_open(&edges);

    let mut rng = StdRng::seed_from_u64(100);
    for _ in 0..200 {
        let query = Coordinate::new(
            rng.gen_range(4_940_000..5_060_000),
            rng.gen_range(790_000..910_000),
        );
        let phantom = index.find_phantom_node(&query, 18).unwrap().unwrap();
        assert!((0.0..=1.0).contains(&phantom.ratio), "ratio {}", phantom.ratio);
    }
}

#[test]
fn test_query_matches_brute_force_over_multiple_pages() {
    // Four leaf pages worth of edges exercises interior-node pruning.
    let edges = random_edges(4_000, 41);
    let (_dir, index) = build_and_open(&edges);

    let brute_force = |query: &Coordinate| -> f64 {
        edges
            .iter()
            .map(|e| project_onto_segment(query, &e.start(), &e.end()).distance_sq)
            .fold(f64::MAX, f64::min)
    };

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let query = Coordinate::new(
            rng.gen_range(4_950_000..5_050_000),
            rng.gen_range(800_000..900_000),
        );

        let found = index.nearest_edge(&query, 18).unwrap().unwrap();
        let found_dist = project_onto_segment(&query, &found.start(), &found.end()).distance_sq;
        let best_dist = brute_force(&query);

        assert!(
            (found_dist - best_dist).abs() < f32::EPSILON as f64,
            "index found {found_dist}, brute force found {best_dist}"
        );
    }
}

#[test]
fn test_concurrent_queries_share_index() {
    let edges = random_edges(2_000, 55);
    let (_dir, index) = build_and_open(&edges);
    let index = std::sync::Arc::new(index);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let index = std::sync::Arc::clone(&index);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker);
                for _ in 0..100 {
                    let query = Coordinate::new(
                        rng.gen_range(4_950_000..5_050_000),
                        rng.gen_range(800_000..900_000),
                    );
                    let phantom = index.find_phantom_node(&query, 18).unwrap();
                    assert!(phantom.is_some());
                }
            });
        }
    });
}

#[test]
fn test_build_is_deterministic() {
    let edges = random_edges(1_500, 13);

    let dir_a = TempDir::new().unwrap();
    let (tree_a, leaf_a) = index_paths(&dir_a);
    EdgeIndex::build(&edges, &tree_a, &leaf_a).unwrap();

    let dir_b = TempDir::new().unwrap();
    let (tree_b, leaf_b) = index_paths(&dir_b);
    EdgeIndex::build(&edges, &tree_b, &leaf_b).unwrap();

    assert_eq!(
        std::fs::read(&tree_a).unwrap(),
        std::fs::read(&tree_b).unwrap()
    );
    assert_eq!(
        std::fs::read(&leaf_a).unwrap(),
        std::fs::read(&leaf_b).unwrap()
    );
}
