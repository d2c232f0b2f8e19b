//! Bulk loader: packs a sorted edge list into on-disk leaf pages and an
//! in-memory interior-node array, then serialises both.
//!
//! Classic packed construction: order all edges along a Hilbert curve,
//! fill leaves in that order, then repeatedly group nodes into parents of
//! up to [`BRANCH_FACTOR`](super::BRANCH_FACTOR) until a single root
//! remains. The finished array is reversed so the root sits at index 0,
//! and child references are renumbered to match.
//!
//! Both files are written to temporaries next to their destinations and
//! renamed into place only after everything succeeded, so an aborted build
//! leaves no partial index behind.

use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::info;
use tempfile::NamedTempFile;

use crate::error::{Result, RoadSnapError};
use crate::geo_utils::{lat2y, COORDINATE_PRECISION};
use crate::hilbert::hilbert_key;
use crate::index::storage::{
    write_leaf_page, write_tree_file, TreeNode, BRANCH_FACTOR, LEAF_CAPACITY,
};
use crate::{Coordinate, RoadEdge};

/// Pairs an input position with its Hilbert sort key.
#[derive(Debug, Clone, Copy)]
struct WrappedEdge {
    array_index: u32,
    hilbert_key: u64,
}

fn wrap_edge(array_index: usize, edge: &RoadEdge) -> WrappedEdge {
    // Sort anchor: the centroid with latitude flattened to Mercator y, so
    // curve locality matches projected proximity.
    let centroid = edge.centroid();
    let flattened = Coordinate::new(
        (COORDINATE_PRECISION * lat2y(centroid.lat as f64 / COORDINATE_PRECISION)) as i32,
        centroid.lon,
    );
    WrappedEdge {
        array_index: array_index as u32,
        hilbert_key: hilbert_key(&flattened),
    }
}

/// Build the index file pair from `edges`.
pub(crate) fn build_index(edges: &[RoadEdge], tree_path: &Path, leaf_path: &Path) -> Result<()> {
    if edges.is_empty() {
        return Err(RoadSnapError::invalid_input(
            "cannot build an index over an empty edge list",
        ));
    }
    if edges.len() as u64 > u32::MAX as u64 {
        return Err(RoadSnapError::invalid_input(
            "edge list exceeds the 32-bit addressing limit of the index format",
        ));
    }

    info!("constructing r-tree over {} edges", edges.len());

    #[cfg(feature = "parallel")]
    let mut wrappers: Vec<WrappedEdge> = {
        use rayon::prelude::*;
        edges
            .par_iter()
            .enumerate()
            .map(|(i, edge)| wrap_edge(i, edge))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let mut wrappers: Vec<WrappedEdge> = edges
        .iter()
        .enumerate()
        .map(|(i, edge)| wrap_edge(i, edge))
        .collect();

    // Key ties resolve by input position so the layout is deterministic.
    wrappers.sort_unstable_by_key(|w| (w.hilbert_key, w.array_index));

    // Stream leaf pages to disk in curve order, keeping one parent node
    // per page in memory.
    let mut leaf_file = NamedTempFile::new_in(parent_dir(leaf_path))?;
    let mut leaf_writer = BufWriter::new(leaf_file.as_file_mut());
    leaf_writer.write_u64::<LittleEndian>(edges.len() as u64)?;

    let mut current_level: Vec<TreeNode> = Vec::new();
    let mut page_edges: Vec<RoadEdge> = Vec::with_capacity(LEAF_CAPACITY);
    for chunk in wrappers.chunks(LEAF_CAPACITY) {
        page_edges.clear();
        page_edges.extend(chunk.iter().map(|w| edges[w.array_index as usize]));

        let mut parent = TreeNode::new();
        for edge in &page_edges {
            parent.mbr.extend_with_edge(edge);
        }
        parent.child_is_on_disk = true;
        parent.children[0] = current_level.len() as u32;

        write_leaf_page(&mut leaf_writer, &page_edges)?;
        current_level.push(parent);
    }
    leaf_writer.flush()?;
    drop(leaf_writer);

    let leaf_page_count = current_level.len();

    // Group the current level into parents of up to BRANCH_FACTOR until a
    // single root remains; grouped children move into the flat array.
    let mut search_tree: Vec<TreeNode> = Vec::new();
    while current_level.len() > 1 {
        let mut next_level: Vec<TreeNode> = Vec::new();
        for packet in current_level.chunks(BRANCH_FACTOR) {
            let mut parent = TreeNode::new();
            for child in packet {
                parent.children[parent.child_count as usize] = search_tree.len() as u32;
                parent.mbr.expand(&child.mbr);
                parent.child_count += 1;
                search_tree.push(child.clone());
            }
            next_level.push(parent);
        }
        current_level = next_level;
    }
    // The last remaining node is the root.
    search_tree.extend(current_level);

    // Put the root at index 0 and renumber child references accordingly.
    search_tree.reverse();
    let tree_size = search_tree.len() as u32;
    renumber_children(&mut search_tree, tree_size);

    let mut tree_file = NamedTempFile::new_in(parent_dir(tree_path))?;
    let mut tree_writer = BufWriter::new(tree_file.as_file_mut());
    write_tree_file(&mut tree_writer, &search_tree)?;
    tree_writer.flush()?;
    drop(tree_writer);

    // Everything is on disk; move both files into place. If the second
    // rename fails the first is rolled back, so callers never see half an
    // index.
    leaf_file.persist(leaf_path).map_err(|e| e.error)?;
    if let Err(e) = tree_file.persist(tree_path) {
        let _ = std::fs::remove_file(leaf_path);
        return Err(e.error.into());
    }

    info!(
        "finished r-tree construction: {} interior nodes, {} leaf pages",
        tree_size, leaf_page_count
    );
    Ok(())
}

fn renumber_children(search_tree: &mut [TreeNode], tree_size: u32) {
    let renumber = |node: &mut TreeNode| {
        // Leaf parents have child_count 0, so their leaf-page reference in
        // children[0] is left untouched.
        for slot in &mut node.children[..node.child_count as usize] {
            *slot = tree_size - *slot - 1;
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        search_tree.par_iter_mut().for_each(renumber);
    }
    #[cfg(not(feature = "parallel"))]
    search_tree.iter_mut().for_each(renumber);
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
