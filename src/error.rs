//! Unified error handling for the map-matching index.
//!
//! All fallible operations in this crate return [`Result`]. Build and open
//! failures distinguish bad caller input, I/O trouble, and on-disk
//! corruption so hosts can decide between retrying, rebuilding, and
//! surfacing a configuration error.

use std::io;
use thiserror::Error;

/// Errors surfaced by index construction, loading, queries, and the
/// polyline simplifier.
#[derive(Debug, Error)]
pub enum RoadSnapError {
    /// The caller handed us something we cannot work with: an empty edge
    /// list at build time, a polyline shorter than two vertices, an
    /// unsupported zoom level, or unmarked polyline endpoints.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A read or write against the tree or leaf file failed. Build-path
    /// failures abort construction without leaving partial files; query-path
    /// failures leave the index usable from other workers.
    #[error("index storage unavailable: {0}")]
    StorageUnavailable(#[from] io::Error),

    /// The on-disk index is inconsistent: header disagrees with the body
    /// length, a node's child count is out of range, or a leaf page claims
    /// more objects than fit.
    #[error("corrupt index: {reason}")]
    Corrupt { reason: String },
}

impl RoadSnapError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        RoadSnapError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        RoadSnapError::Corrupt {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RoadSnapError>;
