//! # Packed edge index
//!
//! A static R-tree over directed road segments: interior nodes live in
//! memory, leaf pages live on disk, and the tree is bulk-loaded once and
//! read-only afterwards.
//!
//! The index is a file pair. The *tree file* holds the interior-node array
//! and is read fully at [`EdgeIndex::open`]; the *leaf file* holds
//! fixed-size pages of edge records and is read page-wise during queries
//! through a per-thread positioned handle, so concurrent queries never
//! synchronise on the read path.
//!
//! The main query, [`EdgeIndex::find_phantom_node`], snaps an arbitrary
//! coordinate to the nearest stored edge and returns the projection as a
//! [`PhantomNode`] for the routing layer.

pub mod mbr;

mod build;
mod storage;

pub use mbr::Mbr;
pub use storage::{BRANCH_FACTOR, LEAF_CAPACITY};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use log::debug;

use crate::error::{Result, RoadSnapError};
use crate::geo_utils::{approximate_distance, project_onto_segment};
use crate::{Coordinate, PhantomNode, RoadEdge};

use storage::{read_tree_file, LeafStore, TreeNode};

/// Highest zoom level understood by queries and the simplifier.
pub const MAX_ZOOM: u32 = 18;

/// Tiny-component edges are suppressed at or below this zoom level.
const TINY_COMPONENT_MAX_ZOOM: u32 = 14;

/// Tolerance for treating two squared candidate distances as a tie.
const DISTANCE_EPSILON: f64 = f32::EPSILON as f64;

/// Heap entry for the best-first traversal, ordered so the smallest
/// `min_dist` is popped first.
struct QueryCandidate {
    node_index: u32,
    min_dist: f64,
}

impl PartialEq for QueryCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.min_dist == other.min_dist
    }
}

impl Eq for QueryCandidate {}

impl PartialOrd for QueryCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the nearest first.
        // Distances are never NaN.
        other
            .min_dist
            .partial_cmp(&self.min_dist)
            .unwrap_or(Ordering::Equal)
    }
}

/// Winning candidate of a nearest-edge search, before phantom assembly.
struct NearestMatch {
    /// The strictly-nearest edge record as stored.
    edge: RoadEdge,
    /// Phantom id: after bidirected fusion, the smaller of the pair.
    node_id: u32,
    name_id: u32,
    weight1: i32,
    weight2: i32,
    location: Coordinate,
    start: Coordinate,
    end: Coordinate,
}

/// Read-only handle over a built index file pair.
#[derive(Debug)]
pub struct EdgeIndex {
    search_tree: Vec<TreeNode>,
    leaves: LeafStore,
}

impl EdgeIndex {
    /// Bulk-load `edges` into a new index file pair.
    ///
    /// Deterministic for a given input order. Both files are written to
    /// temporaries and atomically renamed, so a failed build leaves
    /// nothing behind. Fails with `InvalidInput` on an empty edge list and
    /// `StorageUnavailable` on I/O trouble.
    pub fn build(
        edges: &[RoadEdge],
        tree_path: impl AsRef<Path>,
        leaf_path: impl AsRef<Path>,
    ) -> Result<()> {
        build::build_index(edges, tree_path.as_ref(), leaf_path.as_ref())
    }

    /// Open an index built by [`EdgeIndex::build`].
    ///
    /// Loads the interior-node array into memory and validates it against
    /// the file header; the leaf file stays on disk and is only probed for
    /// its element count.
    pub fn open(tree_path: impl AsRef<Path>, leaf_path: impl AsRef<Path>) -> Result<Self> {
        let search_tree = read_tree_file(tree_path.as_ref())?;
        let leaves = LeafStore::open(leaf_path.as_ref())?;

        // Interior references must resolve inside the array; a dangling
        // one would otherwise take down the first query that walks it.
        let tree_size = search_tree.len() as u32;
        for (index, node) in search_tree.iter().enumerate() {
            if node.child_is_on_disk {
                continue;
            }
            for &child in &node.children[..node.child_count as usize] {
                if child >= tree_size {
                    return Err(RoadSnapError::corrupt(format!(
                        "node {index} references child {child} outside the {tree_size}-node tree"
                    )));
                }
            }
        }

        debug!(
            "opened edge index: {} interior nodes, {} elements",
            search_tree.len(),
            leaves.element_count()
        );
        Ok(Self {
            search_tree,
            leaves,
        })
    }

    /// Number of edges stored in the index.
    pub fn len(&self) -> u64 {
        self.leaves.element_count()
    }

    /// Whether the index stores no edges.
    pub fn is_empty(&self) -> bool {
        self.leaves.element_count() == 0
    }

    /// Bounding rectangle of the whole indexed network.
    pub fn root_mbr(&self) -> &Mbr {
        &self.search_tree[0].mbr
    }

    /// Snap `coord` to the nearest matchable edge and return the
    /// projection as a phantom node.
    ///
    /// Edges flagged as ignored are never considered; edges in tiny
    /// components are skipped at zoom levels 14 and below. When the two
    /// directions of one road tie for nearest (consecutive ids, same
    /// endpoint pair), they fuse into a single bidirected phantom whose
    /// `weight1`/`weight2` are split by the projection ratio.
    ///
    /// Returns `Ok(None)` when every candidate was filtered out — that is
    /// an answer, not an error. Leaf I/O failures surface as
    /// [`RoadSnapError::StorageUnavailable`].
    pub fn find_phantom_node(
        &self,
        coord: &Coordinate,
        zoom: u32,
    ) -> Result<Option<PhantomNode>> {
        let Some(mut found) = self.search_nearest(coord, zoom)? else {
            return Ok(None);
        };

        let along = approximate_distance(&found.start, &found.location);
        let length = approximate_distance(&found.start, &found.end);
        let ratio = {
            let r = along / length;
            if r.is_nan() {
                // Degenerate segment: both endpoints coincide, so the
                // projection policy decides.
                if *coord == found.end {
                    1.0
                } else {
                    0.0
                }
            } else {
                r.min(1.0)
            }
        };

        found.weight1 = (found.weight1 as f64 * ratio) as i32;
        if found.weight2 != i32::MAX {
            found.weight2 = (found.weight2 as f64 * (1.0 - ratio)) as i32;
        }

        // Undo one-unit truncation wobble so a query sitting on the
        // segment maps back onto itself exactly.
        let mut location = found.location;
        if coord.lon.abs_diff(location.lon) == 1 {
            location.lon = coord.lon;
        }
        if coord.lat.abs_diff(location.lat) == 1 {
            location.lat = coord.lat;
        }

        Ok(Some(PhantomNode {
            edge_based_node_id: found.node_id,
            name_id: found.name_id,
            weight1: found.weight1,
            weight2: found.weight2,
            location,
            ratio,
        }))
    }

    /// Return the nearest matchable edge record itself, without phantom
    /// assembly. Same traversal and filters as
    /// [`EdgeIndex::find_phantom_node`].
    pub fn nearest_edge(&self, coord: &Coordinate, zoom: u32) -> Result<Option<RoadEdge>> {
        Ok(self.search_nearest(coord, zoom)?.map(|found| found.edge))
    }

    /// Best-first branch-and-bound over the tree.
    ///
    /// Interior nodes are expanded in MINDIST order; subtrees are pruned
    /// against the best per-edge distance seen so far and against the
    /// smallest MINMAXDIST upper bound (a rectangle whose lower bound
    /// exceeds either cannot hold the winner).
    fn search_nearest(&self, coord: &Coordinate, zoom: u32) -> Result<Option<NearestMatch>> {
        if zoom > MAX_ZOOM {
            return Err(RoadSnapError::invalid_input(format!(
                "zoom level {zoom} outside the supported range 0..={MAX_ZOOM}"
            )));
        }
        let ignore_tiny_components = zoom <= TINY_COMPONENT_MAX_ZOOM;

        let mut min_dist = f64::MAX;
        let mut min_max_dist = f64::MAX;
        let mut best: Option<NearestMatch> = None;

        let mut explored_nodes = 0u32;
        let mut leaf_loads = 0u32;

        let mut traversal_queue = BinaryHeap::new();
        traversal_queue.push(QueryCandidate {
            node_index: 0,
            min_dist: self.search_tree[0].mbr.min_dist(coord),
        });

        while let Some(candidate) = traversal_queue.pop() {
            explored_nodes += 1;
            if candidate.min_dist >= min_max_dist || candidate.min_dist >= min_dist {
                continue;
            }

            let node = &self.search_tree[candidate.node_index as usize];
            if node.child_is_on_disk {
                let page = self.leaves.read_page(node.children[0])?;
                leaf_loads += 1;

                for edge in &page {
                    if edge.is_ignored {
                        continue;
                    }
                    if ignore_tiny_components && edge.belongs_to_tiny_component {
                        continue;
                    }

                    let projection = project_onto_segment(coord, &edge.start(), &edge.end());
                    let improves = projection.distance_sq < min_dist
                        && !distances_tie(projection.distance_sq, min_dist);

                    if improves {
                        min_dist = projection.distance_sq;
                        best = Some(NearestMatch {
                            edge: *edge,
                            node_id: edge.id,
                            name_id: edge.name_id,
                            weight1: edge.weight as i32,
                            weight2: i32::MAX,
                            location: projection.nearest,
                            start: edge.start(),
                            end: edge.end(),
                        });
                    } else if let Some(found) = best.as_mut() {
                        // The opposite direction of the same road: one id
                        // apart and the same endpoint pair in either
                        // orientation. Fuse into a bidirected result, with
                        // the smaller id in front.
                        if distances_tie(projection.distance_sq, min_dist)
                            && edge.id.abs_diff(found.node_id) == 1
                            && endpoints_equivalent(
                                &found.start,
                                &edge.start(),
                                &edge.end(),
                                &found.end,
                            )
                        {
                            found.weight2 = edge.weight as i32;
                            if edge.id < found.node_id {
                                found.node_id = edge.id;
                                std::mem::swap(&mut found.weight1, &mut found.weight2);
                                std::mem::swap(&mut found.start, &mut found.end);
                            }
                        }
                    }
                }
            } else {
                for &child_index in &node.children[..node.child_count as usize] {
                    let child_mbr = &self.search_tree[child_index as usize].mbr;
                    let child_min_dist = child_mbr.min_dist(coord);
                    let child_min_max_dist = child_mbr.min_max_dist(coord);

                    if child_min_max_dist < min_max_dist {
                        min_max_dist = child_min_max_dist;
                    }
                    if child_min_dist > min_max_dist {
                        continue;
                    }
                    if child_min_dist > min_dist {
                        continue;
                    }
                    traversal_queue.push(QueryCandidate {
                        node_index: child_index,
                        min_dist: child_min_dist,
                    });
                }
            }
        }

        debug!(
            "nearest-edge search explored {} nodes with {} leaf loads",
            explored_nodes, leaf_loads
        );
        Ok(best)
    }

    /// Verify that every interior node's rectangle is exactly the union of
    /// its children (edge endpoints for leaf parents). Reads every leaf
    /// page; intended for post-build checks and tests, not the hot path.
    pub fn validate(&self) -> Result<()> {
        for (index, node) in self.search_tree.iter().enumerate() {
            let mut expected = Mbr::new();
            if node.child_is_on_disk {
                let page = self.leaves.read_page(node.children[0])?;
                for edge in &page {
                    expected.extend_with_edge(edge);
                }
            } else {
                for &child in &node.children[..node.child_count as usize] {
                    expected.expand(&self.search_tree[child as usize].mbr);
                }
            }
            if expected != node.mbr {
                return Err(RoadSnapError::corrupt(format!(
                    "node {index} rectangle does not match the union of its children"
                )));
            }
        }
        Ok(())
    }
}

fn distances_tie(a: f64, b: f64) -> bool {
    (a - b).abs() < DISTANCE_EPSILON
}

/// Whether `(a, d)` and `(b, c)` describe the same undirected endpoint
/// pair in any orientation.
fn endpoints_equivalent(
    a: &Coordinate,
    b: &Coordinate,
    c: &Coordinate,
    d: &Coordinate,
) -> bool {
    (a == b && c == d) || (a == c && b == d) || (a == d && b == c)
}
