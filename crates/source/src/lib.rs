//! Transfer resolution: from a magnet-style descriptor to one readable media asset.
//!
//! The peer-to-peer transport itself is an external collaborator reached
//! through [`TransferSource`] / [`TransportSession`]. This crate owns the
//! selection policy (first file on the media allow-list) and the scoped
//! release of the transport session.

pub mod descriptor;
pub mod resolve;
pub mod seed_dir;
pub mod session;

pub use descriptor::{TransferDescriptor, ValidationError};
pub use resolve::{MediaFilter, ResolvedAsset, Resolver};
pub use seed_dir::SeedDirSource;
pub use session::{
    ByteStream, CandidateFile, SessionGuard, SourceFuture, TransferSource, TransportSession,
};

use std::time::Duration;

/// Default time to wait for transport metadata.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors produced while resolving a descriptor to an asset.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("No supported video file found in torrent")]
    NoSupportedAsset,

    #[error("torrent client error: {0}")]
    Transport(String),

    #[error("timed out waiting for torrent metadata")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
