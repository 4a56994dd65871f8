//! Request orchestration.
//!
//! One [`TransferPipeline`] serves every request. Each call to
//! [`TransferPipeline::run`] resolves the descriptor, obtains a credential,
//! opens the sink and relays the stream, reporting through a
//! [`TransferEvent`] channel that always ends with exactly one terminal
//! event.

mod error;
mod pipeline;
mod types;

pub use error::PipelineError;
pub use pipeline::TransferPipeline;
pub use types::{PipelineSettings, TransferEvent};
