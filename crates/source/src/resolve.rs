//! Selection of the media asset to relay.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::ResolutionError;
use crate::descriptor::TransferDescriptor;
use crate::session::{ByteStream, CandidateFile, SessionGuard, TransferSource};

/// Extensions accepted when none are configured.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm"];

/// Allow-list of media file extensions, matched ASCII case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFilter {
    extensions: Vec<String>,
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIA_EXTENSIONS.iter().copied())
    }
}

impl MediaFilter {
    /// Builds a filter; leading dots are ignored (`".mp4"` == `"mp4"`).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn matches(&self, name: &str) -> bool {
        let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Index of the first file on the allow-list.
    pub fn select(&self, files: &[CandidateFile]) -> Option<usize> {
        files.iter().position(|file| self.matches(file.file_name()))
    }
}

/// The file chosen for upload, with the session that serves it.
///
/// Dropping the asset closes the stream and then releases the session.
pub struct ResolvedAsset {
    pub name: String,
    pub total_bytes: u64,
    pub stream: ByteStream,
    pub session: SessionGuard,
}

impl std::fmt::Debug for ResolvedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAsset")
            .field("name", &self.name)
            .field("total_bytes", &self.total_bytes)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Resolves descriptors through a [`TransferSource`].
pub struct Resolver {
    source: Arc<dyn TransferSource>,
    filter: MediaFilter,
    metadata_timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(source: Arc<dyn TransferSource>, filter: MediaFilter) -> Self {
        Self {
            source,
            filter,
            metadata_timeout: Some(crate::DEFAULT_METADATA_TIMEOUT),
        }
    }

    /// Bounds the wait for transport metadata. `None` waits indefinitely.
    pub fn with_metadata_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn filter(&self) -> &MediaFilter {
        &self.filter
    }

    /// Connects to the transport and opens the first allow-listed file.
    ///
    /// On failure the session, if one was obtained, is released before
    /// returning. On success it is owned by the returned asset.
    pub async fn resolve(
        &self,
        descriptor: &TransferDescriptor,
    ) -> Result<ResolvedAsset, ResolutionError> {
        let connect = self.source.connect(descriptor);
        let session = match self.metadata_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ResolutionError::Timeout)??,
            None => connect.await?,
        };
        let mut guard = SessionGuard::new(session);

        info!(
            torrent = %guard.session().name(),
            files = guard.session().files().len(),
            "metadata fetched"
        );

        let Some(index) = self.filter.select(guard.session().files()) else {
            warn!(
                torrent = %guard.session().name(),
                allowed = ?self.filter.extensions(),
                "no supported media file"
            );
            return Err(ResolutionError::NoSupportedAsset);
        };

        let file = guard.session().files()[index].clone();
        let stream = guard.session_mut().open_file(index).await?;

        info!(path = %file.path, bytes = file.length, "media file selected");

        Ok(ResolvedAsset {
            name: file.file_name().to_string(),
            total_bytes: file.length,
            stream,
            session: guard,
        })
    }
}
