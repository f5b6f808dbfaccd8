//! Error types for kshetra-map.

use std::path::PathBuf;
use thiserror::Error;

/// Map error type.
///
/// There is no retry or rollback inside the crate: storage errors surface to
/// the caller (offline mode) or terminate the background worker (online
/// mode), and a terminated worker is fatal to cell streaming.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid cell file {}: {reason}", path.display())]
    InvalidCellFile {
        /// Path of the offending file.
        path: PathBuf,
        /// What failed while decoding it.
        reason: String,
    },

    #[error("point cloud is missing the '{0}' descriptor")]
    MissingDescriptor(&'static str),

    #[error("pose dimension {pose_dim} does not match map dimension {map_dim}")]
    DimensionMismatch {
        /// Dimension of the offending pose (2 or 3).
        pose_dim: usize,
        /// Dimension the map was configured with.
        map_dim: usize,
    },
}

pub type Result<T> = std::result::Result<T, MapError>;
