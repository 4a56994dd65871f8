//! Sink streaming each asset as one HTTP `PUT`.
//!
//! The request body is fed from a bounded channel, so a chunk counts as
//! accepted once it is queued behind at most [`BODY_BUFFER`] others. The
//! server answers with `{"id": "..."}` when the body is complete.

use std::io;
use std::path::Path;

use bytes::Bytes;
use magnetdrive_auth::Credential;
use magnetdrive_relay::{AssetId, AssetWriter, SinkError, WriterFuture};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::TransferSink;

/// Chunks queued for the request body before writes wait.
const BODY_BUFFER: usize = 2;

type BodyItem = Result<Bytes, io::Error>;

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

/// Uploads to `<base_url>/<name>` with the credential as bearer token.
#[derive(Debug, Clone)]
pub struct HttpSink {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn upload_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        )
    }
}

impl TransferSink for HttpSink {
    fn begin<'a>(
        &'a self,
        credential: &'a Credential,
        name: &'a str,
        total_bytes: u64,
    ) -> WriterFuture<'a, Box<dyn AssetWriter>> {
        Box::pin(async move {
            let url = self.upload_url(name);
            let (tx, rx) = mpsc::channel::<BodyItem>(BODY_BUFFER);
            let body = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });

            let request = self
                .http
                .put(&url)
                .bearer_auth(&credential.access_token)
                .header(CONTENT_TYPE, content_type(name))
                .header(CONTENT_LENGTH, total_bytes)
                .body(reqwest::Body::wrap_stream(body));

            debug!(url = %url, bytes = total_bytes, "upload request started");
            let task = tokio::spawn(async move { complete(request).await });

            Ok(Box::new(HttpUpload {
                body: Some(tx),
                request: Some(task),
            }) as Box<dyn AssetWriter>)
        })
    }
}

/// Sends the request and reads the assigned id.
async fn complete(request: reqwest::RequestBuilder) -> Result<AssetId, SinkError> {
    let resp = request.send().await.map_err(transport)?;
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let body = resp.bytes().await.map_err(transport)?;
    let parsed: UploadResponse = serde_json::from_slice(&body)
        .map_err(|e| SinkError::Transport(format!("invalid upload response: {e}")))?;
    Ok(AssetId::new(parsed.id))
}

fn transport(e: reqwest::Error) -> SinkError {
    SinkError::Transport(e.to_string())
}

async fn join(task: JoinHandle<Result<AssetId, SinkError>>) -> Result<AssetId, SinkError> {
    task.await
        .map_err(|e| SinkError::Transport(format!("upload task failed: {e}")))?
}

struct HttpUpload {
    body: Option<mpsc::Sender<BodyItem>>,
    request: Option<JoinHandle<Result<AssetId, SinkError>>>,
}

impl AssetWriter for HttpUpload {
    fn write_chunk(&mut self, chunk: Bytes) -> WriterFuture<'_, ()> {
        Box::pin(async move {
            let Some(body) = self.body.as_ref() else {
                return Err(SinkError::Closed);
            };
            if body.send(Ok(chunk)).await.is_ok() {
                return Ok(());
            }

            // The request ended before the body did; report why.
            self.body = None;
            match self.request.take() {
                Some(task) => match join(task).await {
                    Err(e) => Err(e),
                    Ok(_) => Err(SinkError::Closed),
                },
                None => Err(SinkError::Closed),
            }
        })
    }

    fn finish(mut self: Box<Self>) -> WriterFuture<'static, AssetId> {
        Box::pin(async move {
            // Closing the channel ends the request body.
            self.body = None;
            let task = self.request.take().ok_or(SinkError::Closed)?;
            let id = join(task).await?;
            info!(id = %id, "asset uploaded");
            Ok(id)
        })
    }
}

impl Drop for HttpUpload {
    fn drop(&mut self) {
        if let Some(task) = self.request.take() {
            task.abort();
        }
    }
}

fn content_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}
