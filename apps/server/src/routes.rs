//! HTTP routes.
//!
//! ```text
//! GET  /        input form
//! POST /upload  form field `magnetURI`; streams an HTML progress page
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use magnetdrive_pipeline::TransferPipeline;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::render;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TransferPipeline>,
    /// Cancelled on server shutdown; each transfer runs on a child token.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct UploadForm {
    #[serde(rename = "magnetURI")]
    pub magnet_uri: Option<String>,
}

async fn index() -> Response {
    render::form_page()
}

async fn upload(State(state): State<AppState>, Form(form): Form<UploadForm>) -> Response {
    let descriptor = match TransferPipeline::prepare(form.magnet_uri.as_deref()) {
        Ok(descriptor) => descriptor,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    tracing::info!(descriptor = %descriptor.as_str(), "upload requested");

    let (tx, rx) = mpsc::unbounded_channel();
    let pipeline = Arc::clone(&state.pipeline);
    let cancel = state.shutdown.child_token();
    tokio::spawn(async move {
        let _ = pipeline.run(descriptor, tx, cancel).await;
    });

    // Dropping the body (client gone) drops `rx`, which cancels the transfer.
    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    let body = futures_util::stream::once(async { Bytes::from(render::progress_header()) })
        .chain(events.map(|event| Bytes::from(render::event(&event))))
        .map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnetdrive_auth::{AuthFuture, Credential, CredentialProvider};
    use magnetdrive_pipeline::PipelineSettings;
    use magnetdrive_sink::{DirectorySink, NamingPolicy};
    use magnetdrive_source::{MediaFilter, Resolver, SeedDirSource};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MOVIE_HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TEXT_HASH: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[derive(Default)]
    struct StaticCredential {
        calls: AtomicUsize,
    }

    impl CredentialProvider for StaticCredential {
        fn authorize(&self) -> AuthFuture<'_, Credential> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
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

    struct Server {
        base: String,
        uploads: std::path::PathBuf,
        auth: Arc<StaticCredential>,
        _root: tempfile::TempDir,
    }

    fn seed(root: &Path) {
        let movie = root.join("seeds").join(MOVIE_HASH).join("Movie");
        std::fs::create_dir_all(&movie).unwrap();
        std::fs::write(movie.join("movie.mp4"), vec![3u8; 1_000_000]).unwrap();
        std::fs::write(movie.join("notes.txt"), b"notes").unwrap();

        let text = root.join("seeds").join(TEXT_HASH);
        std::fs::create_dir_all(&text).unwrap();
        std::fs::write(text.join("readme.txt"), b"nothing to see").unwrap();
    }

    async fn start() -> Server {
        let root = tempfile::tempdir().unwrap();
        seed(root.path());
        let uploads = root.path().join("uploads");

        let auth = Arc::new(StaticCredential::default());
        let pipeline = TransferPipeline::new(
            Resolver::new(
                Arc::new(SeedDirSource::new(root.path().join("seeds"))),
                MediaFilter::default(),
            ),
            Arc::clone(&auth) as Arc<dyn CredentialProvider>,
            Arc::new(DirectorySink::new(&uploads)),
            PipelineSettings {
                chunk_size: 250_000,
                io_timeout: None,
                naming: NamingPolicy::Source,
            },
        );

        let app = router(AppState {
            pipeline: Arc::new(pipeline),
            shutdown: CancellationToken::new(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Server {
            base: format!("http://{addr}"),
            uploads,
            auth,
            _root: root,
        }
    }

    async fn submit(server: &Server, fields: &[(&str, &str)]) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/upload", server.base))
            .form(fields)
            .send()
            .await
            .unwrap()
    }

    fn magnet(hash: &str) -> String {
        format!("magnet:?xt=urn:btih:{hash}&dn=Movie")
    }

    fn progress_values(page: &str) -> Vec<f64> {
        page.lines()
            .filter_map(|line| {
                line.strip_prefix("<script>updateProgress(")?
                    .strip_suffix(");</script>")?
                    .parse()
                    .ok()
            })
            .collect()
    }

    #[tokio::test]
    async fn form_page_has_magnet_field() {
        let server = start().await;
        let page = reqwest::get(format!("{}/", server.base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(page.contains(r#"name="magnetURI""#));
        assert!(page.contains(r#"action="/upload""#));
    }

    #[tokio::test]
    async fn upload_streams_progress_then_completion() {
        let server = start().await;
        let uri = magnet(MOVIE_HASH);
        let resp = submit(&server, &[("magnetURI", uri.as_str())]).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let page = resp.text().await.unwrap();

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("function updateProgress"));
        let progress = progress_values(&page);
        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
        assert_eq!(progress.last(), Some(&100.0));
        assert!(page.contains("<h3>Upload complete!</h3>"));
        assert!(!page.contains("Error:"));

        let stored = std::fs::read(server.uploads.join("movie.mp4")).unwrap();
        assert_eq!(stored.len(), 1_000_000);
        assert_eq!(server.auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_media_file_reports_error_in_stream() {
        let server = start().await;
        let uri = magnet(TEXT_HASH);
        let resp = submit(&server, &[("magnetURI", uri.as_str())]).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let page = resp.text().await.unwrap();
        assert!(page.contains(
            "<h3 style=\"color:red;\">Error: No supported video file found in torrent</h3>"
        ));
        assert!(progress_values(&page).is_empty());
        assert!(page.ends_with("</html>\n"));
        assert_eq!(page.matches("</html>").count(), 1);
        assert_eq!(server.auth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_torrent_reports_client_error() {
        let server = start().await;
        let uri = magnet(&"c".repeat(40));
        let resp = submit(&server, &[("magnetURI", uri.as_str())]).await;

        let page = resp.text().await.unwrap();
        assert!(page.contains("Error: torrent client error:"), "{page}");
    }

    #[tokio::test]
    async fn missing_magnet_is_bad_request() {
        let server = start().await;

        for fields in [&[("magnetURI", "   ")][..], &[("other", "x")][..]] {
            let resp = submit(&server, fields).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(resp.text().await.unwrap(), "Magnet URL is required");
        }
        assert_eq!(server.auth.calls.load(Ordering::SeqCst), 0);
        assert!(!server.uploads.exists());
    }
}
