//! Validated transfer descriptors.

use std::fmt;

/// Rejected request input. Raised before any resource is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Magnet URL is required")]
    MissingDescriptor,
}

/// An opaque locator for the content to fetch, e.g. a magnet URI.
///
/// Guaranteed non-empty and free of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor(String);

impl TransferDescriptor {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingDescriptor);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased BitTorrent info hash from a `magnet:?xt=urn:btih:<hash>` URI.
    ///
    /// Returns `None` for anything else, including hashes with characters
    /// outside `[0-9A-Za-z]`.
    pub fn info_hash(&self) -> Option<String> {
        self.magnet_param("xt")
            .and_then(|xt| {
                let hash = xt.strip_prefix("urn:btih:")?;
                Some(hash.to_string())
            })
            .filter(|hash| !hash.is_empty() && hash.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|hash| hash.to_ascii_lowercase())
    }

    /// The `dn` (display name) parameter of a magnet URI, if present.
    pub fn display_name(&self) -> Option<String> {
        self.magnet_param("dn").filter(|name| !name.is_empty())
    }

    fn magnet_param(&self, key: &str) -> Option<String> {
        let url = url::Url::parse(&self.0).ok()?;
        if url.scheme() != "magnet" {
            return None;
        }
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

impl fmt::Display for TransferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
