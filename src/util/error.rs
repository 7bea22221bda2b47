//! Error types for slotwatch.

use crate::collab::CaptureError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for slotwatch operations.
pub type SlotWatchResult<T> = std::result::Result<T, SlotWatchError>;

/// Errors that can occur in the reference store, the matcher and at startup.
#[derive(Debug, Error)]
pub enum SlotWatchError {
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the image width.
    #[error("stride {stride} is smaller than width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer does not hold enough elements.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The template cannot be correlated against (e.g. it is flat).
    #[error("degenerate template: {reason}")]
    DegenerateTemplate { reason: &'static str },
    /// A filesystem operation failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The persisted cache file could not be parsed or has an unknown layout.
    #[error("cache file {} is malformed: {reason}", path.display())]
    CacheFormat { path: PathBuf, reason: String },
    /// Compressed bytes of a reference could not be inflated.
    #[error("reference '{name}' failed to decompress: {source}")]
    Decompress {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// Compressing bytes failed.
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),
    /// Image bytes could not be decoded or encoded.
    #[error("image codec error for '{name}': {reason}")]
    Decode { name: String, reason: String },
    /// Invalid configuration; fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The capture source could not grab a region.
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    /// A background thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SlotWatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
