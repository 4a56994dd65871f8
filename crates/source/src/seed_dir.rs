//! Transport backed by a local directory of already-fetched content.
//!
//! Content for info hash `H` lives under `<root>/H/`. Every regular file
//! below that directory is a candidate, listed in path order. Useful for
//! operating against a download directory maintained by an external
//! BitTorrent client, and for tests.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ResolutionError;
use crate::descriptor::TransferDescriptor;
use crate::session::{ByteStream, CandidateFile, SourceFuture, TransferSource, TransportSession};

/// A [`TransferSource`] reading from `<root>/<info hash>/`.
#[derive(Debug, Clone)]
pub struct SeedDirSource {
    root: PathBuf,
}

impl SeedDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn open_session(
        &self,
        descriptor: &TransferDescriptor,
    ) -> Result<Box<dyn TransportSession>, ResolutionError> {
        let hash = descriptor.info_hash().ok_or_else(|| {
            ResolutionError::Transport("descriptor is not a magnet link with a btih hash".into())
        })?;

        let dir = self.root.join(&hash);
        let is_dir = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ResolutionError::Transport(format!(
                "no content available for info hash {hash}"
            )));
        }

        let files = list_files(&dir).await?;
        let name = descriptor.display_name().unwrap_or(hash);
        debug!(name = %name, dir = %dir.display(), files = files.len(), "seed directory opened");

        Ok(Box::new(SeedSession {
            name,
            dir,
            files,
        }))
    }
}

impl TransferSource for SeedDirSource {
    fn connect<'a>(
        &'a self,
        descriptor: &'a TransferDescriptor,
    ) -> SourceFuture<'a, Box<dyn TransportSession>> {
        Box::pin(self.open_session(descriptor))
    }
}

struct SeedSession {
    name: String,
    dir: PathBuf,
    files: Vec<CandidateFile>,
}

impl TransportSession for SeedSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn files(&self) -> &[CandidateFile] {
        &self.files
    }

    fn open_file(&mut self, index: usize) -> SourceFuture<'_, ByteStream> {
        let path = self
            .files
            .get(index)
            .map(|file| self.dir.join(&file.path));
        Box::pin(async move {
            let path = path.ok_or_else(|| {
                ResolutionError::Transport(format!("file index {index} out of range"))
            })?;
            let file = tokio::fs::File::open(&path).await?;
            Ok(Box::new(file) as ByteStream)
        })
    }

    fn release(&mut self) {
        // Files are closed by their own handles; nothing else is held open.
        debug!(dir = %self.dir.display(), "seed session closed");
    }
}

/// Lists regular files below `dir` as `/`-separated relative paths, sorted.
async fn list_files(dir: &Path) -> Result<Vec<CandidateFile>, ResolutionError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let length = entry.metadata().await?.len();
                let Ok(relative) = path.strip_prefix(dir) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(CandidateFile::new(relative, length));
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
