use std::future::Future;
use std::sync::Arc;

use magnetdrive_auth::CredentialProvider;
use magnetdrive_relay::{AssetId, ProgressSample, Relay};
use magnetdrive_sink::TransferSink;
use magnetdrive_source::{ResolvedAsset, Resolver, TransferDescriptor};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::types::{PipelineSettings, TransferEvent};

/// Orchestrates one transfer per call to [`run`](Self::run).
///
/// Requests share nothing but the collaborators held here; the credential
/// provider is the only one with state of its own.
pub struct TransferPipeline {
    resolver: Resolver,
    auth: Arc<dyn CredentialProvider>,
    sink: Arc<dyn TransferSink>,
    settings: PipelineSettings,
}

impl TransferPipeline {
    pub fn new(
        resolver: Resolver,
        auth: Arc<dyn CredentialProvider>,
        sink: Arc<dyn TransferSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver,
            auth,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Validates a submitted descriptor before any work starts.
    pub fn prepare(raw: Option<&str>) -> Result<TransferDescriptor, PipelineError> {
        Ok(TransferDescriptor::parse(raw.unwrap_or_default())?)
    }

    /// Runs the transfer, reporting through `events`.
    ///
    /// Exactly one terminal event ([`TransferEvent::Completed`] or
    /// [`TransferEvent::Failed`]) is sent before returning. Dropping the
    /// receiving end of `events` cancels the transfer, as does `cancel`.
    pub async fn run(
        &self,
        descriptor: TransferDescriptor,
        events: UnboundedSender<TransferEvent>,
        cancel: CancellationToken,
    ) -> Result<AssetId, PipelineError> {
        let work = self.execute(&descriptor, &events, &cancel);
        tokio::pin!(work);

        let result = tokio::select! {
            biased;
            result = &mut work => result,
            _ = events.closed() => {
                info!(descriptor = %descriptor.as_str(), "client disconnected, cancelling transfer");
                cancel.cancel();
                work.await
            }
        };

        let terminal = match &result {
            Ok(asset_id) => TransferEvent::Completed {
                asset_id: asset_id.clone(),
            },
            Err(e) => {
                if let PipelineError::Relay(relay) = e
                    && relay.bytes_forwarded() > 0
                {
                    warn!(
                        bytes = relay.bytes_forwarded(),
                        side = ?relay.side(),
                        "transfer stopped, partial upload left at destination"
                    );
                }
                warn!(error = %e, "transfer failed");
                TransferEvent::Failed {
                    message: e.to_string(),
                }
            }
        };
        // The client may already be gone.
        let _ = events.send(terminal);

        result
    }

    async fn execute(
        &self,
        descriptor: &TransferDescriptor,
        events: &UnboundedSender<TransferEvent>,
        cancel: &CancellationToken,
    ) -> Result<AssetId, PipelineError> {
        let ResolvedAsset {
            name,
            total_bytes,
            stream,
            session,
        } = until_cancelled(cancel, self.resolver.resolve(descriptor)).await??;

        // The session guard is held until the relay is done; any early return
        // below drops it, which releases the session.
        let credential = until_cancelled(cancel, self.auth.authorize()).await??;

        let destination = self.settings.naming.destination_name(&name);
        let writer = until_cancelled(
            cancel,
            self.sink.begin(&credential, &destination, total_bytes),
        )
        .await??;

        info!(name = %name, destination = %destination, bytes = total_bytes, "uploading stream");
        let _ = events.send(TransferEvent::Resolved {
            name: name.clone(),
            total_bytes,
        });

        let relay = Relay::new(cancel.clone())
            .with_chunk_size(self.settings.chunk_size)
            .with_io_timeout(self.settings.io_timeout);
        let mut observer = |sample: ProgressSample| {
            let _ = events.send(TransferEvent::Progress(sample));
        };
        let result = relay.run(stream, total_bytes, writer, &mut observer).await;

        session.release();
        let asset_id = result?;
        info!(name = %name, id = %asset_id, "upload complete");
        Ok(asset_id)
    }
}

async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = fut => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use magnetdrive_auth::{AuthError, AuthFuture, Credential};
    use magnetdrive_relay::{AssetWriter, SinkError, WriterFuture};
    use magnetdrive_sink::NamingPolicy;
    use magnetdrive_source::{
        ByteStream, CandidateFile, MediaFilter, ResolutionError, SourceFuture, TransferSource,
        TransportSession,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;

    // --- source ---

    #[derive(Default)]
    struct SourceProbe {
        connects: AtomicUsize,
        releases: AtomicUsize,
    }

    struct MockSource {
        files: Vec<CandidateFile>,
        stall: bool,
        probe: Arc<SourceProbe>,
    }

    struct MockSession {
        files: Vec<CandidateFile>,
        stall: bool,
        peer: Option<DuplexStream>,
        probe: Arc<SourceProbe>,
    }

    impl TransferSource for MockSource {
        fn connect<'a>(
            &'a self,
            _descriptor: &'a TransferDescriptor,
        ) -> SourceFuture<'a, Box<dyn TransportSession>> {
            Box::pin(async move {
                self.probe.connects.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockSession {
                    files: self.files.clone(),
                    stall: self.stall,
                    peer: None,
                    probe: Arc::clone(&self.probe),
                }) as Box<dyn TransportSession>)
            })
        }
    }

    impl TransportSession for MockSession {
        fn name(&self) -> &str {
            "mock"
        }

        fn files(&self) -> &[CandidateFile] {
            &self.files
        }

        fn open_file(&mut self, index: usize) -> SourceFuture<'_, ByteStream> {
            let len = self.files[index].length as usize;
            Box::pin(async move {
                if self.stall {
                    // Keep the writing half so reads pend instead of hitting EOF.
                    let (reader, writer) = tokio::io::duplex(64);
                    self.peer = Some(writer);
                    return Ok(Box::new(reader) as ByteStream);
                }
                Ok(Box::new(std::io::Cursor::new(vec![7u8; len])) as ByteStream)
            })
        }

        fn release(&mut self) {
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    // --- auth ---

    struct MockAuth {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CredentialProvider for MockAuth {
        fn authorize(&self) -> AuthFuture<'_, Credential> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(AuthError::Flow("operator declined".into()));
                }
                Ok(Credential {
                    kind: "authorized_user".into(),
                    client_id: "cid".into(),
                    client_secret: "sec".into(),
                    access_token: "at".into(),
                    refresh_token: None,
                })
            })
        }
    }

    // --- sink ---

    #[derive(Default)]
    struct SinkProbe {
        begins: Mutex<Vec<(String, u64)>>,
        received: Mutex<Vec<u8>>,
    }

    struct MockSink {
        fail_after: Option<u64>,
        probe: Arc<SinkProbe>,
    }

    struct MockWriter {
        fail_after: Option<u64>,
        written: u64,
        probe: Arc<SinkProbe>,
    }

    impl TransferSink for MockSink {
        fn begin<'a>(
            &'a self,
            _credential: &'a Credential,
            name: &'a str,
            total_bytes: u64,
        ) -> WriterFuture<'a, Box<dyn AssetWriter>> {
            Box::pin(async move {
                self.probe
                    .begins
                    .lock()
                    .unwrap()
                    .push((name.to_string(), total_bytes));
                Ok(Box::new(MockWriter {
                    fail_after: self.fail_after,
                    written: 0,
                    probe: Arc::clone(&self.probe),
                }) as Box<dyn AssetWriter>)
            })
        }
    }

    impl AssetWriter for MockWriter {
        fn write_chunk(&mut self, chunk: Bytes) -> WriterFuture<'_, ()> {
            Box::pin(async move {
                if self.fail_after.is_some_and(|limit| self.written >= limit) {
                    return Err(SinkError::Rejected {
                        status: 507,
                        body: "storage full".into(),
                    });
                }
                self.written += chunk.len() as u64;
                self.probe.received.lock().unwrap().extend_from_slice(&chunk);
                Ok(())
            })
        }

        fn finish(self: Box<Self>) -> WriterFuture<'static, AssetId> {
            Box::pin(async move { Ok(AssetId::new("asset-1")) })
        }
    }

    // --- harness ---

    struct Harness {
        pipeline: TransferPipeline,
        source: Arc<SourceProbe>,
        auth: Arc<MockAuth>,
        sink: Arc<SinkProbe>,
    }

    struct Setup {
        files: Vec<(&'static str, u64)>,
        stall: bool,
        auth_fails: bool,
        sink_fail_after: Option<u64>,
    }

    impl Setup {
        fn files(files: &[(&'static str, u64)]) -> Self {
            Self {
                files: files.to_vec(),
                stall: false,
                auth_fails: false,
                sink_fail_after: None,
            }
        }

        fn build(self) -> Harness {
            let source_probe = Arc::new(SourceProbe::default());
            let source = MockSource {
                files: self
                    .files
                    .iter()
                    .map(|(path, len)| CandidateFile::new(*path, *len))
                    .collect(),
                stall: self.stall,
                probe: Arc::clone(&source_probe),
            };
            let auth = Arc::new(MockAuth {
                calls: AtomicUsize::new(0),
                fail: self.auth_fails,
            });
            let sink_probe = Arc::new(SinkProbe::default());
            let sink = MockSink {
                fail_after: self.sink_fail_after,
                probe: Arc::clone(&sink_probe),
            };

            let settings = PipelineSettings {
                chunk_size: 250_000,
                io_timeout: None,
                naming: NamingPolicy::Source,
            };
            let pipeline = TransferPipeline::new(
                Resolver::new(Arc::new(source), MediaFilter::default()),
                Arc::clone(&auth) as Arc<dyn CredentialProvider>,
                Arc::new(sink),
                settings,
            );

            Harness {
                pipeline,
                source: source_probe,
                auth,
                sink: sink_probe,
            }
        }
    }

    fn descriptor() -> TransferDescriptor {
        TransferDescriptor::parse("magnet:?xt=urn:btih:abcdef&dn=Movie").unwrap()
    }

    async fn run(harness: &Harness) -> (Result<AssetId, PipelineError>, Vec<TransferEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = harness
            .pipeline
            .run(descriptor(), tx, CancellationToken::new())
            .await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    fn percentages(events: &[TransferEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress(sample) => Some(sample.percentage()),
                _ => None,
            })
            .collect()
    }

    fn assert_single_terminal(events: &[TransferEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "events: {events:?}");
        assert!(events.last().is_some_and(TransferEvent::is_terminal));
    }

    #[tokio::test]
    async fn million_bytes_in_four_chunks() {
        let harness = Setup::files(&[("Movie/notes.txt", 3), ("Movie/movie.mp4", 1_000_000)]).build();

        let (result, events) = run(&harness).await;

        assert_eq!(result.unwrap().as_str(), "asset-1");
        assert_eq!(
            events.first(),
            Some(&TransferEvent::Resolved {
                name: "movie.mp4".into(),
                total_bytes: 1_000_000,
            })
        );
        assert_eq!(percentages(&events), [25.0, 50.0, 75.0, 100.0]);
        assert_eq!(
            events.last(),
            Some(&TransferEvent::Completed {
                asset_id: AssetId::new("asset-1"),
            })
        );
        assert_single_terminal(&events);

        assert_eq!(
            *harness.sink.begins.lock().unwrap(),
            [("movie.mp4".to_string(), 1_000_000)]
        );
        assert_eq!(harness.sink.received.lock().unwrap().len(), 1_000_000);
        assert_eq!(harness.source.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_file_completes_at_100() {
        let harness = Setup::files(&[("empty.webm", 0)]).build();

        let (result, events) = run(&harness).await;

        assert!(result.is_ok());
        assert_eq!(percentages(&events), [100.0]);
        assert_single_terminal(&events);
    }

    #[tokio::test]
    async fn no_matching_file_fails_and_releases_once() {
        let harness = Setup::files(&[("readme.txt", 10), ("cover.jpg", 20)]).build();

        let (result, events) = run(&harness).await;

        assert!(matches!(
            result,
            Err(PipelineError::Resolution(ResolutionError::NoSupportedAsset))
        ));
        assert_eq!(
            events,
            [TransferEvent::Failed {
                message: "No supported video file found in torrent".into(),
            }]
        );
        assert_eq!(harness.source.releases.load(Ordering::SeqCst), 1);
        assert_eq!(harness.auth.calls.load(Ordering::SeqCst), 0);
        assert!(harness.sink.begins.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_failure_releases_session() {
        let mut setup = Setup::files(&[("movie.mkv", 100)]);
        setup.auth_fails = true;
        let harness = setup.build();

        let (result, events) = run(&harness).await;

        assert!(matches!(result, Err(PipelineError::Auth(_))));
        match events.as_slice() {
            [TransferEvent::Failed { message }] => {
                assert!(message.starts_with("authorization failed:"), "{message}");
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(harness.source.releases.load(Ordering::SeqCst), 1);
        assert!(harness.sink.begins.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_stops_progress() {
        let mut setup = Setup::files(&[("movie.mp4", 1_000_000)]);
        setup.sink_fail_after = Some(500_000);
        let harness = setup.build();

        let (result, events) = run(&harness).await;

        match result {
            Err(PipelineError::Relay(relay)) => {
                assert_eq!(relay.side(), Some(magnetdrive_relay::Side::Sink));
                assert_eq!(relay.bytes_forwarded(), 500_000);
            }
            other => panic!("expected relay failure, got {other:?}"),
        }
        assert_eq!(percentages(&events), [25.0, 50.0]);
        match events.last() {
            Some(TransferEvent::Failed { message }) => {
                assert!(message.starts_with("upload failed:"), "{message}");
                assert!(message.contains("storage full"), "{message}");
            }
            other => panic!("unexpected terminal event: {other:?}"),
        }
        assert_single_terminal(&events);
        assert_eq!(harness.source.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_cancels_and_releases() {
        let mut setup = Setup::files(&[("movie.mp4", 1_000)]);
        setup.stall = true;
        let harness = setup.build();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let client = async move {
            // Wait until the upload has started, then walk away.
            let first = rx.recv().await;
            assert!(matches!(first, Some(TransferEvent::Resolved { .. })));
            drop(rx);
        };

        let (result, ()) = tokio::join!(
            harness.pipeline.run(descriptor(), tx, cancel.clone()),
            client
        );

        let err = result.unwrap_err();
        assert!(err.is_cancelled(), "got {err:?}");
        assert!(cancel.is_cancelled());
        assert_eq!(harness.source.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn external_cancel_before_start() {
        let harness = Setup::files(&[("movie.mp4", 10)]).build();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = harness
            .pipeline
            .run(descriptor(), tx, cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(matches!(
            rx.recv().await,
            Some(TransferEvent::Failed { .. })
        ));
        assert_eq!(harness.source.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_descriptor_is_rejected_before_any_work() {
        let harness = Setup::files(&[("movie.mp4", 10)]).build();

        for raw in [None, Some(""), Some("   ")] {
            let err = TransferPipeline::prepare(raw).unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)));
            assert_eq!(err.to_string(), "Magnet URL is required");
        }

        assert_eq!(harness.source.connects.load(Ordering::SeqCst), 0);
        assert_eq!(harness.auth.calls.load(Ordering::SeqCst), 0);
        assert!(harness.sink.begins.lock().unwrap().is_empty());
    }
}
