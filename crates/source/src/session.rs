//! Capability interfaces for the peer-to-peer transport.
//!
//! A [`TransferSource`] turns a descriptor into a [`TransportSession`] once
//! the transport has fetched the content metadata. The session lists the
//! candidate files and opens one of them as a byte stream. Sessions hold
//! network state and must be released; [`SessionGuard`] makes that happen
//! exactly once on every exit path.

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;
use tracing::debug;

use crate::ResolutionError;
use crate::descriptor::TransferDescriptor;

/// A boxed future returned by transport capability methods.
pub type SourceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ResolutionError>> + Send + 'a>>;

/// A single-pass readable byte stream.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// A file listed in the transport metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Path inside the content, `/`-separated.
    pub path: String,
    pub length: u64,
}

impl CandidateFile {
    pub fn new(path: impl Into<String>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
        }
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Entry point of the transport: resolves descriptors to sessions.
pub trait TransferSource: Send + Sync {
    /// Starts fetching `descriptor` and resolves once metadata is available.
    fn connect<'a>(
        &'a self,
        descriptor: &'a TransferDescriptor,
    ) -> SourceFuture<'a, Box<dyn TransportSession>>;
}

/// A live transport session for one descriptor.
pub trait TransportSession: Send {
    /// Content name reported by the transport.
    fn name(&self) -> &str;

    /// Files exposed by the content, in transport order.
    fn files(&self) -> &[CandidateFile];

    /// Opens the file at `index` in [`files`](Self::files) for reading.
    fn open_file(&mut self, index: usize) -> SourceFuture<'_, ByteStream>;

    /// Tears down the session. Called exactly once by [`SessionGuard`].
    fn release(&mut self);
}

/// Owns a [`TransportSession`] and releases it when dropped.
pub struct SessionGuard {
    session: Box<dyn TransportSession>,
    released: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn TransportSession>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    pub fn session(&self) -> &dyn TransportSession {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> &mut dyn TransportSession {
        self.session.as_mut()
    }

    /// Releases the session now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.session.release();
            debug!(name = %self.session.name(), "transport session released");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("name", &self.session.name())
            .field("released", &self.released)
            .finish()
    }
}
