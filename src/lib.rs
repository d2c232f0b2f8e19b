//! # roadsnap
//!
//! Packed on-disk R-tree map-matching index for road-network routing
//! engines.
//!
//! This library answers one question fast: *given an arbitrary coordinate,
//! which road segment is nearest, and where on it?* The answer is a
//! [`PhantomNode`] — a synthetic routing endpoint on the projection point —
//! produced by a bulk-loaded static R-tree whose interior nodes live in
//! memory and whose leaf pages live on disk.
//!
//! This library provides:
//! - Hilbert-ordered bulk loading of millions of directed edges
//! - Best-first nearest-edge queries with MINDIST/MINMAXDIST pruning
//! - Bidirected-edge fusion (both directions of a road snap as one)
//! - Douglas–Peucker polyline simplification with zoom-indexed thresholds
//! - Lock-free concurrent queries via per-thread leaf readers
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel bulk-load steps with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use roadsnap::{Coordinate, EdgeIndex, RoadEdge};
//!
//! let edges = vec![RoadEdge::new(
//!     0,
//!     1,
//!     100,
//!     Coordinate::new(5_000_000, 850_000),
//!     Coordinate::new(5_000_000, 851_000),
//! )];
//!
//! let dir = std::env::temp_dir();
//! let tree_path = dir.join("quickstart.ramIndex");
//! let leaf_path = dir.join("quickstart.fileIndex");
//!
//! EdgeIndex::build(&edges, &tree_path, &leaf_path)?;
//! let index = EdgeIndex::open(&tree_path, &leaf_path)?;
//!
//! let phantom = index.find_phantom_node(&Coordinate::new(5_000_050, 850_400), 18)?;
//! assert!(phantom.is_some());
//! # Ok::<(), roadsnap::RoadSnapError>(())
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, RoadSnapError};

// Geographic primitives (distance, projection, Mercator flattening)
pub mod geo_utils;

// Hilbert curve encoding for bulk-load ordering
pub mod hilbert;

// The packed R-tree: build, open, nearest-edge queries
pub mod index;
pub use index::{EdgeIndex, Mbr, BRANCH_FACTOR, LEAF_CAPACITY, MAX_ZOOM};

// Polyline simplification
pub mod simplify;
pub use simplify::{simplify, PolylineVertex, DOUGLAS_PEUCKER_THRESHOLDS};

// Road-metadata parsing helpers for the extraction stage
pub mod extract;

// ============================================================================
// Core Types
// ============================================================================

/// A fixed-precision coordinate: latitude and longitude in units of 10⁻⁵
/// degrees.
///
/// # Example
/// ```
/// use roadsnap::Coordinate;
/// let berlin = Coordinate::from_degrees(52.524371, 13.410533);
/// assert_eq!(berlin, Coordinate::new(5_252_437, 1_341_053));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: i32,
    pub lon: i32,
}

impl Coordinate {
    /// Create a coordinate from fixed-precision components.
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Create a coordinate from floating-point degrees, truncating to
    /// fixed precision.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: (lat * geo_utils::COORDINATE_PRECISION) as i32,
            lon: (lon * geo_utils::COORDINATE_PRECISION) as i32,
        }
    }
}

/// A directed road segment as stored in the index leaves.
///
/// Edges come in from the extraction stage with stable identifiers; the
/// two directions of one undirected road carry consecutive ids, which is
/// what lets the query fuse them back together when they tie for nearest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadEdge {
    /// Segment identifier, stable across extraction runs.
    pub id: u32,
    /// Street-name identifier resolved by the host.
    pub name_id: u32,
    /// Positive traversal cost.
    pub weight: u32,
    pub lat1: i32,
    pub lon1: i32,
    pub lat2: i32,
    pub lon2: i32,
    /// Edge sits in a connected component too small to route from at
    /// coarse zoom.
    pub belongs_to_tiny_component: bool,
    /// Edge is never a match candidate.
    pub is_ignored: bool,
}

impl RoadEdge {
    /// Create a plain matchable edge.
    pub fn new(id: u32, name_id: u32, weight: u32, start: Coordinate, end: Coordinate) -> Self {
        Self {
            id,
            name_id,
            weight,
            lat1: start.lat,
            lon1: start.lon,
            lat2: end.lat,
            lon2: end.lon,
            belongs_to_tiny_component: false,
            is_ignored: false,
        }
    }

    /// Mark this edge as part of a tiny component.
    pub fn in_tiny_component(mut self) -> Self {
        self.belongs_to_tiny_component = true;
        self
    }

    /// Mark this edge as ignored.
    pub fn ignored(mut self) -> Self {
        self.is_ignored = true;
        self
    }

    /// First endpoint.
    pub fn start(&self) -> Coordinate {
        Coordinate::new(self.lat1, self.lon1)
    }

    /// Second endpoint.
    pub fn end(&self) -> Coordinate {
        Coordinate::new(self.lat2, self.lon2)
    }

    /// Component-wise midpoint of the endpoints.
    pub fn centroid(&self) -> Coordinate {
        Coordinate::new((self.lat1 + self.lat2) / 2, (self.lon1 + self.lon2) / 2)
    }
}

/// A synthetic routing endpoint: the projection of a query coordinate onto
/// the nearest road segment.
///
/// For a bidirected road both directions are folded into one phantom:
/// `edge_based_node_id` is the smaller id of the pair and `weight1` /
/// `weight2` carry the ratio-scaled costs of the two directions. For a
/// one-way segment `weight2` is the [`i32::MAX`] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhantomNode {
    pub edge_based_node_id: u32,
    pub name_id: u32,
    pub weight1: i32,
    pub weight2: i32,
    /// The projection point on the segment.
    pub location: Coordinate,
    /// Position of the projection along the segment, 0 at the first
    /// endpoint, 1 at the second.
    pub ratio: f64,
}

impl PhantomNode {
    /// Whether both directions of the underlying road were fused into this
    /// phantom.
    pub fn is_bidirected(&self) -> bool {
        self.weight2 != i32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_from_degrees_truncates() {
        let c = Coordinate::from_degrees(50.123456, 8.987654);
        assert_eq!(c, Coordinate::new(5_012_345, 898_765));
    }

    #[test]
    fn test_edge_accessors() {
        let edge = RoadEdge::new(
            7,
            3,
            60,
            Coordinate::new(100, 200),
            Coordinate::new(300, 600),
        );
        assert_eq!(edge.start(), Coordinate::new(100, 200));
        assert_eq!(edge.end(), Coordinate::new(300, 600));
        assert_eq!(edge.centroid(), Coordinate::new(200, 400));
        assert!(!edge.belongs_to_tiny_component);
        assert!(!edge.is_ignored);

        let flagged = edge.in_tiny_component().ignored();
        assert!(flagged.belongs_to_tiny_component);
        assert!(flagged.is_ignored);
    }

    #[test]
    fn test_core_types_serde_round_trip() {
        let edge = RoadEdge::new(
            42,
            9,
            250,
            Coordinate::new(5_000_000, 850_000),
            Coordinate::new(5_000_400, 850_300),
        )
        .in_tiny_component();

        let json = serde_json::to_string(&edge).unwrap();
        let back: RoadEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(edge, back);
    }

    #[test]
    fn test_phantom_bidirected_sentinel() {
        let mut phantom = PhantomNode {
            edge_based_node_id: 10,
            name_id: 0,
            weight1: 50,
            weight2: i32::MAX,
            location: Coordinate::new(0, 0),
            ratio: 0.5,
        };
        assert!(!phantom.is_bidirected());
        phantom.weight2 = 50;
        assert!(phantom.is_bidirected());
    }
}
