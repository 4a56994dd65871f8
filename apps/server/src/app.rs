//! Wires the pipeline from configuration and serves HTTP until shutdown.

use std::sync::Arc;

use magnetdrive_auth::{Authorizer, ConsoleFlow, CredentialStore};
use magnetdrive_pipeline::{PipelineSettings, TransferPipeline};
use magnetdrive_sink::{DirectorySink, HttpSink, TransferSink};
use magnetdrive_source::{MediaFilter, Resolver, SeedDirSource};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SinkConfig};
use crate::routes::{self, AppState};

/// Runs the server until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(build_pipeline(&config)?);
    let shutdown = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

    let app = routes::router(AppState {
        pipeline,
        shutdown: shutdown.clone(),
    });

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested, cancelling transfers");
            signal.cancel();
        })
        .await?;

    Ok(())
}

pub fn build_pipeline(config: &Config) -> anyhow::Result<TransferPipeline> {
    let source = Arc::new(SeedDirSource::new(&config.seed_dir));
    let resolver = Resolver::new(source, MediaFilter::new(&config.media_extensions))
        .with_metadata_timeout(config.resolve_timeout());

    let authorizer = Authorizer::new(
        CredentialStore::new(&config.token_path),
        &config.credentials_path,
        Arc::new(ConsoleFlow),
    )
    .with_scopes(config.scopes.clone())
    .with_flow_timeout(config.auth_timeout());

    let sink: Arc<dyn TransferSink> = match &config.sink {
        SinkConfig::Directory { path } => {
            tracing::info!(path = %path.display(), "storing uploads in directory");
            Arc::new(DirectorySink::new(path))
        }
        SinkConfig::Http { url } => {
            tracing::info!(url = %url, "uploading to HTTP storage");
            Arc::new(HttpSink::new(url.as_str())?)
        }
    };

    let settings = PipelineSettings {
        chunk_size: config.chunk_size,
        io_timeout: config.io_timeout(),
        naming: config.naming,
    };

    Ok(TransferPipeline::new(
        resolver,
        Arc::new(authorizer),
        sink,
        settings,
    ))
}
