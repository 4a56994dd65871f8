use std::time::Duration;

use magnetdrive_relay::{AssetId, DEFAULT_CHUNK_SIZE, ProgressSample};
use magnetdrive_sink::NamingPolicy;

/// Updates pushed to the waiting client, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// The media file was selected; the upload is about to start.
    Resolved { name: String, total_bytes: u64 },
    Progress(ProgressSample),
    Completed { asset_id: AssetId },
    Failed { message: String },
}

impl TransferEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferEvent::Completed { .. } | TransferEvent::Failed { .. }
        )
    }
}

/// Per-transfer knobs shared by every request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    /// Bound on each source read and sink write.
    pub io_timeout: Option<Duration>,
    pub naming: NamingPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: Some(Duration::from_secs(60)),
            naming: NamingPolicy::Unique,
        }
    }
}
