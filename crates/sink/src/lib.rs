//! Storage sinks.
//!
//! A [`TransferSink`] opens an upload for one named asset of known length
//! and hands back the relay's write capability
//! ([`AssetWriter`](magnetdrive_relay::AssetWriter)). The storage provider's
//! own upload protocol stays behind this interface.

pub mod directory;
pub mod http;
pub mod naming;

pub use directory::DirectorySink;
pub use http::HttpSink;
pub use naming::NamingPolicy;

use magnetdrive_auth::Credential;
use magnetdrive_relay::{AssetWriter, WriterFuture};

/// Destination for relayed assets.
pub trait TransferSink: Send + Sync {
    /// Opens an upload of `total_bytes` bytes stored under `name`.
    fn begin<'a>(
        &'a self,
        credential: &'a Credential,
        name: &'a str,
        total_bytes: u64,
    ) -> WriterFuture<'a, Box<dyn AssetWriter>>;
}
