//! Server configuration.
//!
//! Read from `magnetdrive.toml` in the working directory, or from the file
//! named by `MAGNETDRIVE_CONFIG`. Every field has a default, so a missing
//! file runs the server with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use magnetdrive_auth::{DEFAULT_CREDENTIALS_PATH, DEFAULT_SCOPE, DEFAULT_TOKEN_PATH};
use magnetdrive_relay::DEFAULT_CHUNK_SIZE;
use magnetdrive_sink::NamingPolicy;
use magnetdrive_source::resolve::DEFAULT_MEDIA_EXTENSIONS;
use serde::{Deserialize, Serialize};

const CONFIG_ENV: &str = "MAGNETDRIVE_CONFIG";
const CONFIG_FILE: &str = "magnetdrive.toml";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Persisted user credential.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Operator-provisioned app credentials (read-only).
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Directory holding fetched torrent content, one subdirectory per info hash.
    #[serde(default = "default_seed_dir")]
    pub seed_dir: PathBuf,

    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Seconds to wait for torrent metadata (0 = no limit).
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// Seconds allowed for each chunk read or write (0 = no limit).
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Seconds the operator has to finish authorization (0 = no limit).
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,

    #[serde(default)]
    pub naming: NamingPolicy,

    #[serde(default)]
    pub sink: SinkConfig,
}

/// Where uploads go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Directory { path: PathBuf },
    Http { url: String },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Directory {
            path: PathBuf::from("uploads"),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_token_path() -> PathBuf {
    DEFAULT_TOKEN_PATH.into()
}

fn default_credentials_path() -> PathBuf {
    DEFAULT_CREDENTIALS_PATH.into()
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.into()]
}

fn default_seed_dir() -> PathBuf {
    "seeds".into()
}

fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_resolve_timeout() -> u64 {
    120
}

fn default_io_timeout() -> u64 {
    60
}

fn default_auth_timeout() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            token_path: default_token_path(),
            credentials_path: default_credentials_path(),
            scopes: default_scopes(),
            seed_dir: default_seed_dir(),
            media_extensions: default_media_extensions(),
            chunk_size: default_chunk_size(),
            resolve_timeout_secs: default_resolve_timeout(),
            io_timeout_secs: default_io_timeout(),
            auth_timeout_secs: default_auth_timeout(),
            naming: NamingPolicy::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration file, falling back to defaults if absent.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        seconds(self.resolve_timeout_secs)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        seconds(self.io_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Option<Duration> {
        seconds(self.auth_timeout_secs)
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}
