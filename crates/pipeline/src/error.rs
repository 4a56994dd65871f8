use magnetdrive_auth::AuthError;
use magnetdrive_relay::{RelayError, SinkError};
use magnetdrive_source::{ResolutionError, ValidationError};

/// Any failure of a transfer request.
///
/// The display text is what the client sees in the terminal failure event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("upload failed: {0}")]
    Sink(#[from] SinkError),

    #[error("upload failed: {0}")]
    Relay(#[from] RelayError),

    #[error("transfer cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::Relay(RelayError::Cancelled { .. })
        )
    }
}
