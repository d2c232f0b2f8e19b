//! Byte-exact on-disk layout of the index file pair and the per-thread
//! positioned leaf reader.
//!
//! Both files are little-endian and written field-by-field, never by
//! copying in-memory structs, so the layout is identical across platforms
//! and compiler versions:
//!
//! - *Tree file*: `u32 tree_size`, then `tree_size` interior-node records
//!   of [`TREE_NODE_BYTES`] each (MBR as four `i32`, a packed word holding
//!   the child count and the leaf flag, then [`BRANCH_FACTOR`] child slots).
//! - *Leaf file*: `u64 element_count`, then dense leaf pages of
//!   [`LEAF_PAGE_BYTES`] each (`u32 object_count` plus [`LEAF_CAPACITY`]
//!   32-byte edge records; unused slots are zero-filled).
//!
//! Changing [`LEAF_CAPACITY`] or [`BRANCH_FACTOR`] changes the record
//! sizes and therefore breaks compatibility with existing index files.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, RoadSnapError};
use crate::index::mbr::Mbr;
use crate::RoadEdge;

/// Edges stored per on-disk leaf page. Fixed by the file format.
pub const LEAF_CAPACITY: usize = 1170;

/// Maximum children per interior node. Fixed by the file format.
pub const BRANCH_FACTOR: usize = 50;

/// One serialised edge record.
pub(crate) const EDGE_RECORD_BYTES: usize = 32;

/// One serialised leaf page: object count plus a full slot array.
pub(crate) const LEAF_PAGE_BYTES: usize = 4 + LEAF_CAPACITY * EDGE_RECORD_BYTES;

/// One serialised interior node.
pub(crate) const TREE_NODE_BYTES: usize = 16 + 4 + BRANCH_FACTOR * 4;

const LEAF_HEADER_BYTES: u64 = 8;

const FLAG_TINY_COMPONENT: u32 = 1 << 0;
const FLAG_IGNORED: u32 = 1 << 1;

/// In-memory interior node of the search tree.
///
/// Leaf parents keep `child_count = 0` and the leaf-page index in
/// `children[0]`; interior parents reference other tree nodes through
/// `children[..child_count]`.
#[derive(Debug, Clone)]
pub(crate) struct TreeNode {
    pub mbr: Mbr,
    pub child_count: u32,
    pub child_is_on_disk: bool,
    pub children: [u32; BRANCH_FACTOR],
}

impl TreeNode {
    pub fn new() -> Self {
        Self {
            mbr: Mbr::new(),
            child_count: 0,
            child_is_on_disk: false,
            children: [0; BRANCH_FACTOR],
        }
    }

    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.mbr.min_lon)?;
        writer.write_i32::<LittleEndian>(self.mbr.max_lon)?;
        writer.write_i32::<LittleEndian>(self.mbr.min_lat)?;
        writer.write_i32::<LittleEndian>(self.mbr.max_lat)?;

        let packed = self.child_count | (u32::from(self.child_is_on_disk) << 31);
        writer.write_u32::<LittleEndian>(packed)?;
        for child in &self.children {
            writer.write_u32::<LittleEndian>(*child)?;
        }
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let min_lon = reader.read_i32::<LittleEndian>()?;
        let max_lon = reader.read_i32::<LittleEndian>()?;
        let min_lat = reader.read_i32::<LittleEndian>()?;
        let max_lat = reader.read_i32::<LittleEndian>()?;

        let packed = reader.read_u32::<LittleEndian>()?;
        let child_count = packed & 0x7FFF_FFFF;
        let child_is_on_disk = packed >> 31 == 1;
        if child_count as usize > BRANCH_FACTOR {
            return Err(RoadSnapError::corrupt(format!(
                "tree node claims {child_count} children, limit is {BRANCH_FACTOR}"
            )));
        }

        let mut children = [0u32; BRANCH_FACTOR];
        for slot in &mut children {
            *slot = reader.read_u32::<LittleEndian>()?;
        }

        Ok(Self {
            mbr: Mbr {
                min_lon,
                max_lon,
                min_lat,
                max_lat,
            },
            child_count,
            child_is_on_disk,
            children,
        })
    }
}

fn write_edge<W: Write>(writer: &mut W, edge: &RoadEdge) -> io::Result<()> {
    writer.write_i32::<LittleEndian>(edge.lat1)?;
    writer.write_i32::<LittleEndian>(edge.lon1)?;
    writer.write_i32::<LittleEndian>(edge.lat2)?;
    writer.write_i32::<LittleEndian>(edge.lon2)?;
    writer.write_u32::<LittleEndian>(edge.id)?;
    writer.write_u32::<LittleEndian>(edge.name_id)?;
    writer.write_u32::<LittleEndian>(edge.weight)?;

    let mut flags = 0u32;
    if edge.belongs_to_tiny_component {
        flags |= FLAG_TINY_COMPONENT;
    }
    if edge.is_ignored {
        flags |= FLAG_IGNORED;
    }
    writer.write_u32::<LittleEndian>(flags)
}

fn read_edge<R: Read>(reader: &mut R) -> io::Result<RoadEdge> {
    let lat1 = reader.read_i32::<LittleEndian>()?;
    let lon1 = reader.read_i32::<LittleEndian>()?;
    let lat2 = reader.read_i32::<LittleEndian>()?;
    let lon2 = reader.read_i32::<LittleEndian>()?;
    let id = reader.read_u32::<LittleEndian>()?;
    let name_id = reader.read_u32::<LittleEndian>()?;
    let weight = reader.read_u32::<LittleEndian>()?;
    let flags = reader.read_u32::<LittleEndian>()?;

    Ok(RoadEdge {
        id,
        name_id,
        weight,
        lat1,
        lon1,
        lat2,
        lon2,
        belongs_to_tiny_component: flags & FLAG_TINY_COMPONENT != 0,
        is_ignored: flags & FLAG_IGNORED != 0,
    })
}

/// Serialise the interior-node array as a tree file.
pub(crate) fn write_tree_file<W: Write>(writer: &mut W, nodes: &[TreeNode]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(nodes.len() as u32)?;
    for node in nodes {
        node.write(writer)?;
    }
    Ok(())
}

/// Load and validate the interior-node array from a tree file.
pub(crate) fn read_tree_file(path: &Path) -> Result<Vec<TreeNode>> {
    let file = File::open(path)?;
    let body_len = file.metadata()?.len().saturating_sub(4);
    let mut reader = io::BufReader::new(file);

    let tree_size = reader.read_u32::<LittleEndian>()?;
    if tree_size == 0 {
        return Err(RoadSnapError::corrupt("tree file contains no nodes"));
    }
    if body_len != tree_size as u64 * TREE_NODE_BYTES as u64 {
        return Err(RoadSnapError::corrupt(format!(
            "tree file body is {body_len} bytes, header promises {tree_size} nodes"
        )));
    }

    let mut nodes = Vec::with_capacity(tree_size as usize);
    for _ in 0..tree_size {
        nodes.push(TreeNode::read(&mut reader)?);
    }
    Ok(nodes)
}

/// Serialise one leaf page: object count, the stored edges, zero padding
/// for the unused slots.
pub(crate) fn write_leaf_page<W: Write>(writer: &mut W, edges: &[RoadEdge]) -> io::Result<()> {
    debug_assert!(edges.len() <= LEAF_CAPACITY);

    writer.write_u32::<LittleEndian>(edges.len() as u32)?;
    for edge in edges {
        write_edge(writer, edge)?;
    }

    let empty = [0u8; EDGE_RECORD_BYTES];
    for _ in edges.len()..LEAF_CAPACITY {
        writer.write_all(&empty)?;
    }
    Ok(())
}

fn decode_leaf_page(buffer: &[u8]) -> Result<Vec<RoadEdge>> {
    let mut reader = buffer;
    let object_count = reader.read_u32::<LittleEndian>()?;
    if object_count as usize > LEAF_CAPACITY {
        return Err(RoadSnapError::corrupt(format!(
            "leaf page claims {object_count} objects, capacity is {LEAF_CAPACITY}"
        )));
    }

    let mut edges = Vec::with_capacity(object_count as usize);
    for _ in 0..object_count {
        edges.push(read_edge(&mut reader)?);
    }
    Ok(edges)
}

thread_local! {
    // One private read handle per leaf file per worker thread, opened
    // lazily and dropped when the thread exits. The read path takes no
    // locks.
    static LEAF_HANDLES: RefCell<HashMap<PathBuf, File>> = RefCell::new(HashMap::new());
}

/// Page-addressed access to the leaf file.
#[derive(Debug)]
pub(crate) struct LeafStore {
    path: PathBuf,
    element_count: u64,
}

impl LeafStore {
    /// Open the leaf file, reading the element-count header once.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let element_count = file.read_u64::<LittleEndian>()?;
        Ok(Self {
            path: path.to_path_buf(),
            element_count,
        })
    }

    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    /// Read leaf page `page_index` through this thread's private handle.
    ///
    /// One positioned read per call. A failed handle is discarded so the
    /// next query on this thread reopens the file; the failure itself is
    /// surfaced, never retried.
    pub fn read_page(&self, page_index: u32) -> Result<Vec<RoadEdge>> {
        LEAF_HANDLES.with(|handles| {
            let mut handles = handles.borrow_mut();
            let file = match handles.entry(self.path.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(File::open(&self.path)?),
            };

            let offset = LEAF_HEADER_BYTES + page_index as u64 * LEAF_PAGE_BYTES as u64;
            let mut buffer = vec![0u8; LEAF_PAGE_BYTES];
            let read = file
                .seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut buffer));
            if let Err(err) = read {
                handles.remove(&self.path);
                return Err(err.into());
            }

            decode_leaf_page(&buffer)
        })
    }
}
