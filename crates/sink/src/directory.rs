//! Sink writing assets into a local directory.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use magnetdrive_auth::Credential;
use magnetdrive_relay::{AssetId, AssetWriter, SinkError, WriterFuture};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::TransferSink;

/// Stores each asset as `<root>/<name>`; the returned id is a fresh uuid.
///
/// Existing files are never overwritten. The credential is not consulted.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn open(&self, name: &str, total_bytes: u64) -> Result<Box<dyn AssetWriter>, SinkError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), bytes = total_bytes, "directory upload opened");
        Ok(Box::new(FileUpload {
            file,
            path,
            written: 0,
        }))
    }
}

impl TransferSink for DirectorySink {
    fn begin<'a>(
        &'a self,
        _credential: &'a Credential,
        name: &'a str,
        total_bytes: u64,
    ) -> WriterFuture<'a, Box<dyn AssetWriter>> {
        Box::pin(self.open(name, total_bytes))
    }
}

struct FileUpload {
    file: File,
    path: PathBuf,
    written: u64,
}

impl AssetWriter for FileUpload {
    fn write_chunk(&mut self, chunk: Bytes) -> WriterFuture<'_, ()> {
        Box::pin(async move {
            self.file.write_all(&chunk).await?;
            self.written += chunk.len() as u64;
            Ok(())
        })
    }

    fn finish(self: Box<Self>) -> WriterFuture<'static, AssetId> {
        Box::pin(async move {
            let mut upload = *self;
            upload.file.flush().await?;
            upload.file.sync_all().await?;

            let id = AssetId::new(uuid::Uuid::new_v4().to_string());
            info!(
                id = %id,
                path = %upload.path.display(),
                bytes = upload.written,
                "asset stored"
            );
            Ok(id)
        })
    }
}
