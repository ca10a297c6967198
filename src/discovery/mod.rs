// src/discovery/mod.rs
//! Discovery pipeline: search fan-out and live-stream ingestion over shared policy,
//! normalizer and collaborators.

pub mod search;
pub mod stream;

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::event::Normalizer;
use crate::follow::FollowService;
use crate::model::SearchQuery;
use crate::platform::{Credential, Platform};
use crate::policy::Policy;
use crate::queue::Envelope;
use crate::writer::Writer;

pub use search::{SearchError, SearchErrors, SearchOutcome};
pub use stream::{StreamError, UpdateOutcome};

/// Group id used for content ingested from the live stream.
pub const GROUP_ID_DEFAULT: &str = "default";

/// Entry points of the pipeline, as seen by the HTTP surface and the supervisor.
#[async_trait]
pub trait Service: Send + Sync {
    /// Finds up to `limit` items matching the query on every credential and follows
    /// the eligible authors. Partial failure is reported next to the accepted count.
    async fn search_and_add(&self, q: &SearchQuery) -> SearchOutcome;

    /// Consumes the firehose until the idle timeout, cancellation or a transport failure.
    /// Always ends with exactly one terminal error; reconnecting is up to the caller.
    async fn run_live_stream(&self, cancel: &CancellationToken) -> StreamError;

    /// Processes live-stream updates relayed through the queue.
    async fn handle_live_stream_events(&self, evts: &[Envelope]);
}

/// Default [`Service`] implementation.
pub struct Discovery {
    platform: Arc<dyn Platform>,
    credentials: Vec<Credential>,
    policy: Policy,
    normalizer: Normalizer,
    follows: Arc<dyn FollowService>,
    writer: Arc<dyn Writer>,
    stream_timeout: Duration,
}

impl Discovery {
    pub fn new(
        platform: Arc<dyn Platform>,
        credentials: Vec<Credential>,
        policy: Policy,
        normalizer: Normalizer,
        follows: Arc<dyn FollowService>,
        writer: Arc<dyn Writer>,
    ) -> Self {
        Self {
            platform,
            credentials,
            policy,
            normalizer,
            follows,
            writer,
            stream_timeout: Duration::from_secs(60),
        }
    }

    /// Maximum idle time between two firehose events.
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }
}

#[async_trait]
impl Service for Discovery {
    async fn search_and_add(&self, q: &SearchQuery) -> SearchOutcome {
        self.fan_out_search(q).await
    }

    async fn run_live_stream(&self, cancel: &CancellationToken) -> StreamError {
        self.consume_stream(cancel).await
    }

    async fn handle_live_stream_events(&self, evts: &[Envelope]) {
        self.consume_batch(evts).await
    }
}

/// Re-runs the live stream after every terminal error until cancelled.
pub async fn supervise_live_stream(
    svc: Arc<dyn Service>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
) {
    crate::metrics::ensure_described();
    loop {
        let err = svc.run_live_stream(&cancel).await;
        if matches!(err, StreamError::Cancelled) || cancel.is_cancelled() {
            tracing::info!("live stream stopped");
            return;
        }
        tracing::warn!(error = %err, delay = ?reconnect_delay, "live stream ended, reconnecting");
        counter!("stream_reconnects_total").increment(1);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}
