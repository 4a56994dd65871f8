//! Write capability handed to the relay by a storage sink.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

/// A boxed future returned by [`AssetWriter`] methods.
pub type WriterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SinkError>> + Send + 'a>>;

/// Opaque identifier the storage backend assigned to a finished upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by a storage sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("write timed out")]
    Timeout,

    #[error("upload closed before completion")]
    Closed,
}

/// An open upload on the storage backend.
///
/// Obtained from a sink for one named asset of known length. The relay
/// calls [`write_chunk`](Self::write_chunk) once per chunk, in order, and
/// [`finish`](Self::finish) exactly once after the last chunk.
pub trait AssetWriter: Send {
    /// Hands one chunk to the destination.
    ///
    /// Resolves once the destination has accepted the chunk; the relay does
    /// not read further until then.
    fn write_chunk(&mut self, chunk: Bytes) -> WriterFuture<'_, ()>;

    /// Finalizes the upload and returns the identifier assigned to it.
    fn finish(self: Box<Self>) -> WriterFuture<'static, AssetId>;
}
