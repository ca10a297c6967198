//! fedi-ingest: binary entrypoint
//! Loads config, wires the pipeline behind logging decorators, runs the live-stream
//! supervisor and serves the HTTP surface until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fedi_ingest::{
    api::{self, AppState},
    config::Config,
    discovery::{supervise_live_stream, Discovery, Service},
    event::Normalizer,
    follow::{FollowService, HttpFollowService},
    logging::Logging,
    metrics::Metrics,
    platform::HttpPlatform,
    policy::Policy,
    queue::InterestOptions,
    writer::{HttpWriter, Writer},
};

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let cfg = Config::load_default().context("loading configuration")?;
    init_tracing(&cfg.log.level);
    let credentials = cfg.credentials().context("platform credentials")?;
    tracing::info!(
        hosts = credentials.len(),
        port = cfg.api.port,
        event_type = %cfg.event.kind,
        "starting"
    );

    let metrics = Metrics::init()?;

    // No global timeout: the firehose response never completes.
    let client = reqwest::Client::builder()
        .user_agent(cfg.mastodon.user_agent.clone())
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building http client")?;

    let mut platform = HttpPlatform::new(client.clone(), cfg.mastodon.user_agent.clone())
        .with_timeout(cfg.mastodon.request_timeout);
    if !cfg.mastodon.stream_endpoint.is_empty() {
        platform = platform.with_stream_endpoint(cfg.mastodon.stream_endpoint.clone());
    }

    let follows: Arc<dyn FollowService> = Arc::new(Logging::new(
        HttpFollowService::new(client.clone(), &cfg.api.activitypub.uri)
            .with_timeout(cfg.mastodon.request_timeout),
    ));
    let writer: Arc<dyn Writer> = Arc::new(Logging::new(
        HttpWriter::new(client, &cfg.api.writer.uri)
            .with_backoff(cfg.api.writer.backoff)
            .with_retries(cfg.api.writer.max_retries)
            .with_timeout(cfg.mastodon.request_timeout),
    ));

    let discovery = Discovery::new(
        Arc::new(platform),
        credentials,
        Policy::new(cfg.mastodon.count_min.followers, cfg.mastodon.count_min.posts),
        Normalizer::new(cfg.event.kind.clone()),
        follows,
        writer,
    )
    .with_stream_timeout(cfg.mastodon.stream_timeout_max);
    let svc: Arc<dyn Service> = Arc::new(Logging::new(discovery));

    let cancel = CancellationToken::new();
    let stream_task = tokio::spawn(supervise_live_stream(
        svc.clone(),
        cancel.clone(),
        cfg.mastodon.reconnect_delay,
    ));

    let state = AppState {
        svc,
        interests: InterestOptions {
            activitypub_host: cfg.api.activitypub.host.clone(),
            search_limit: cfg.mastodon.search_limit,
        },
    };
    let app = api::router(state).merge(metrics.router());

    let addr = format!("0.0.0.0:{}", cfg.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.cancelled() => {}
            }
        })
        .await
        .context("http server")?;

    cancel.cancel();
    if let Err(e) = stream_task.await {
        tracing::warn!(error = %e, "live stream task ended abnormally");
    }
    tracing::info!("stopped");
    Ok(())
}
