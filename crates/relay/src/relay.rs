use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::progress::{ProgressObserver, ProgressSample};
use crate::writer::{AssetId, AssetWriter, SinkError};
use crate::{DEFAULT_CHUNK_SIZE, RelayError};

/// Copies a byte source into an [`AssetWriter`], reporting progress per chunk.
///
/// The relay never retries and never rolls back: the first source or sink
/// failure ends the copy.
#[derive(Debug, Clone)]
pub struct Relay {
    chunk_size: usize,
    io_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Relay {
    /// Creates a relay that stops when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: None,
            cancel,
        }
    }

    /// Sets the maximum chunk size. `0` selects [`DEFAULT_CHUNK_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        self
    }

    /// Bounds every single source read and sink write.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Runs the copy to completion.
    ///
    /// `total_bytes` must match what `source` yields. A stream that ends
    /// early or runs past the declared length is a source failure, and
    /// excess bytes never reach the writer.
    pub async fn run<R, O>(
        &self,
        mut source: R,
        total_bytes: u64,
        mut writer: Box<dyn AssetWriter>,
        observer: &mut O,
    ) -> Result<AssetId, RelayError>
    where
        R: AsyncRead + Unpin + Send,
        O: ProgressObserver + ?Sized,
    {
        let started = Instant::now();
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        let mut transferred: u64 = 0;

        debug!(total_bytes, chunk_size = self.chunk_size, "relay started");

        loop {
            let n = self.read_chunk(&mut source, &mut buf, transferred).await?;
            if n == 0 {
                break;
            }

            let next = transferred + n as u64;
            if next > total_bytes {
                return Err(RelayError::Source {
                    bytes: transferred,
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("stream yielded more than the declared {total_bytes} bytes"),
                    ),
                });
            }

            // Hands the filled bytes over; `buf` keeps only spare capacity.
            let chunk = buf.split().freeze();
            self.guard_sink(writer.write_chunk(chunk), transferred)
                .await?;

            transferred = next;
            observer.on_progress(ProgressSample::new(transferred, total_bytes));
        }

        if transferred < total_bytes {
            return Err(RelayError::Source {
                bytes: transferred,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {transferred} of {total_bytes} bytes"),
                ),
            });
        }

        if total_bytes == 0 {
            observer.on_progress(ProgressSample::new(0, 0));
        }

        let id = self.guard_sink(writer.finish(), transferred).await?;

        let elapsed = started.elapsed();
        info!(
            bytes = transferred,
            elapsed_ms = elapsed.as_millis() as u64,
            id = %id,
            "relay complete"
        );
        Ok(id)
    }

    async fn read_chunk<R>(
        &self,
        source: &mut R,
        buf: &mut BytesMut,
        transferred: u64,
    ) -> Result<usize, RelayError>
    where
        R: AsyncRead + Unpin + Send,
    {
        buf.reserve(self.chunk_size);
        let mut limited = source.take(self.chunk_size as u64);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled { bytes: transferred }),
            result = with_timeout(self.io_timeout, limited.read_buf(buf)) => match result {
                Some(Ok(n)) => Ok(n),
                Some(Err(e)) => Err(RelayError::Source { bytes: transferred, source: e }),
                None => Err(RelayError::Source {
                    bytes: transferred,
                    source: io::Error::new(io::ErrorKind::TimedOut, "source read timed out"),
                }),
            },
        }
    }

    async fn guard_sink<T, F>(&self, op: F, transferred: u64) -> Result<T, RelayError>
    where
        F: Future<Output = Result<T, SinkError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled { bytes: transferred }),
            result = with_timeout(self.io_timeout, op) => match result {
                Some(Ok(value)) => Ok(value),
                Some(Err(e)) => Err(RelayError::Sink { bytes: transferred, source: e }),
                None => Err(RelayError::Sink { bytes: transferred, source: SinkError::Timeout }),
            },
        }
    }
}

/// Awaits `fut`, giving up after `limit` if one is set.
async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
