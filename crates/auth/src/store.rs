//! Durable credential file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::AuthError;
use crate::credential::Credential;

/// JSON credential file at a fixed path.
///
/// Single-tenant: one credential per path, shared by every request.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored credential.
    ///
    /// Returns `Ok(None)` if nothing has been stored yet; a file that
    /// exists but does not hold a usable credential is an error.
    pub async fn load(&self) -> Result<Option<Credential>, AuthError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_str(&content)?;
        credential.validate()?;
        Ok(Some(credential))
    }

    /// Writes `credential`, replacing any previous one.
    ///
    /// The new content is written to a sibling temp file and renamed into
    /// place, so a failed write leaves the previous file intact.
    pub async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(credential)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, content).await?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
