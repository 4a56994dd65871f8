//! Destination naming.

use serde::{Deserialize, Serialize};

/// How the stored object is named from the source asset name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingPolicy {
    /// `movie.mkv` becomes `movie-<8 hex>.mkv`.
    #[default]
    Unique,
    /// The asset name as-is. Repeated uploads of the same content collide.
    Source,
}

impl NamingPolicy {
    pub fn destination_name(&self, asset_name: &str) -> String {
        let name = sanitize(asset_name);
        match self {
            NamingPolicy::Source => name,
            NamingPolicy::Unique => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                let suffix = &id[..8];
                match name.rsplit_once('.') {
                    Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
                    _ => format!("{name}-{suffix}"),
                }
            }
        }
    }
}

/// Replaces path separators and control characters.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "asset".into()
    } else {
        cleaned
    }
}
