//! Error types for mediasqueeze-frames.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while indexing or reassembling frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single frame could not be decoded. Recovered locally by dropping the frame.
    #[error("failed to decode frame {ordinal} ({}): {message}", path.display())]
    Decode {
        ordinal: u64,
        path: PathBuf,
        message: String,
    },

    /// A timeline slot could not be written or linked.
    #[error("failed to materialize slot {slot} at {}: {source}", target.display())]
    Materialization {
        slot: usize,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// There were no unique frames to build a timeline from.
    #[error("cannot plan a timeline without any unique frames")]
    EmptyTimeline,

    /// Timeline inputs violate ordering or rate constraints.
    #[error("invalid timeline: {0}")]
    InvalidTimeline(String),

    /// The frames metadata file is missing or inconsistent.
    #[error("invalid frames metadata: {0}")]
    Metadata(String),

    /// A packed frames file could not be decoded or written back out.
    #[error("failed to unpack {}: {message}", path.display())]
    Unpack { path: PathBuf, message: String },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid timeline error.
    pub fn invalid_timeline(message: impl Into<String>) -> Self {
        Self::InvalidTimeline(message.into())
    }

    /// Create a metadata error.
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }
}
