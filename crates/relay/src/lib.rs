//! Streaming relay with per-chunk progress accounting.
//!
//! Copies a single-pass byte source into a storage [`AssetWriter`] in
//! bounded chunks. After the writer acknowledges each chunk, the running
//! byte count is turned into a [`ProgressSample`] and handed to a
//! [`ProgressObserver`] on the same task as the copy loop.

mod progress;
mod relay;
mod writer;

pub use progress::{ProgressObserver, ProgressSample};
pub use relay::Relay;
pub use writer::{AssetId, AssetWriter, SinkError, WriterFuture};

/// Default chunk size: 256 KiB.
///
/// Bounds the memory held per transfer regardless of the asset size.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// The side of the relay that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Sink,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Sink => f.write_str("sink"),
        }
    }
}

/// Errors produced by the relay.
///
/// Every variant carries the number of bytes the sink had already accepted.
/// Those bytes are not rolled back.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("source read failed after {bytes} bytes: {source}")]
    Source {
        bytes: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("sink write failed after {bytes} bytes: {source}")]
    Sink {
        bytes: u64,
        #[source]
        source: SinkError,
    },

    #[error("relay cancelled after {bytes} bytes")]
    Cancelled { bytes: u64 },
}

impl RelayError {
    /// Returns which side failed, or `None` for cancellation.
    pub fn side(&self) -> Option<Side> {
        match self {
            RelayError::Source { .. } => Some(Side::Source),
            RelayError::Sink { .. } => Some(Side::Sink),
            RelayError::Cancelled { .. } => None,
        }
    }

    /// Bytes the sink accepted before the relay stopped.
    pub fn bytes_forwarded(&self) -> u64 {
        match self {
            RelayError::Source { bytes, .. }
            | RelayError::Sink { bytes, .. }
            | RelayError::Cancelled { bytes } => *bytes,
        }
    }
}
