// src/discovery/stream.rs
//! Live-stream ingestion: the persistent firehose loop and the queue-relayed batch mode.

use chrono::Utc;
use futures::StreamExt;
use metrics::counter;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Discovery, GROUP_ID_DEFAULT};
use crate::model::Status;
use crate::platform::PlatformError;
use crate::policy::{Channel, Rejection};
use crate::queue::Envelope;

/// Event kind carrying a new status.
pub const EVENT_UPDATE: &str = "update";

const LOG_DATA_PREVIEW: usize = 256;

/// Why a live-stream loop ended. Every run ends with exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("no credentials configured for the live stream")]
    NoCredentials,

    #[error("failed to open the live stream: {0}")]
    Connect(#[source] PlatformError),

    #[error("live stream transport failure: {0}")]
    Transport(#[source] PlatformError),

    #[error("live stream closed by upstream")]
    Closed,

    #[error("timeout while waiting for new stream status after {0:?}")]
    Timeout(Duration),

    #[error("live stream cancelled")]
    Cancelled,
}

/// What happened to one `update` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Undecodable,
    Rejected(Rejection),
    /// Locked account: a follow request awaiting manual approval was sent.
    FollowRequested { addr: String, ok: bool },
    Written { id: String, ok: bool },
    /// Neither locked nor indexable.
    Ignored,
}

impl Discovery {
    pub(super) async fn consume_stream(&self, cancel: &CancellationToken) -> StreamError {
        crate::metrics::ensure_described();
        let Some(cred) = self.credentials.first() else {
            return StreamError::NoCredentials;
        };
        let mut events = match self.platform.open_stream(cred).await {
            Ok(s) => s,
            Err(e) => return StreamError::Connect(e),
        };
        tracing::info!(host = %cred.host, timeout = ?self.stream_timeout, "live stream opened");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamError::Cancelled,
                next = events.next() => match next {
                    Some(Ok(ev)) => {
                        if ev.event == EVENT_UPDATE {
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return StreamError::Cancelled,
                                _ = self.handle_update(ev.data.as_bytes()) => {}
                            }
                        }
                    }
                    Some(Err(e)) => return StreamError::Transport(e),
                    None => return StreamError::Closed,
                },
                _ = tokio::time::sleep(self.stream_timeout) => {
                    return StreamError::Timeout(self.stream_timeout);
                }
            }
        }
    }

    /// Every event is handled on its own; a dropped event never stops the batch.
    pub(super) async fn consume_batch(&self, evts: &[Envelope]) {
        crate::metrics::ensure_described();
        for evt in evts {
            if evt.kind != EVENT_UPDATE {
                continue;
            }
            match evt.data() {
                Ok(data) => {
                    self.handle_update(&data).await;
                }
                Err(e) => {
                    tracing::warn!(id = %evt.id, error = %e, "live stream event without usable data");
                }
            }
        }
    }

    /// Decode, check, then either request a follow (locked) or write the normalized event.
    pub async fn handle_update(&self, data: &[u8]) -> UpdateOutcome {
        counter!("stream_events_total").increment(1);
        let st: Status = match serde_json::from_slice(data) {
            Ok(st) => st,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    data = %preview(data),
                    "failed to decode the live stream status"
                );
                return UpdateOutcome::Undecodable;
            }
        };

        if let Err(r) = self.policy.check_status(&st, Channel::LiveStream) {
            tracing::debug!(addr = st.account.address(), reason = %r, "live stream status skipped");
            counter!("policy_rejected_total", "rule" => r.rule()).increment(1);
            return UpdateOutcome::Rejected(r);
        }

        let acc = &st.account;
        let addr = acc.address();
        if acc.locked {
            // the author can accept the follow request manually
            let res = self
                .follows
                .create(addr, GROUP_ID_DEFAULT, addr, "", "")
                .await;
            counter!("stream_follow_requests_total").increment(1);
            if let Err(e) = &res {
                tracing::warn!(addr, error = %e, "live stream follow request failed");
            }
            return UpdateOutcome::FollowRequested {
                addr: addr.to_string(),
                ok: res.is_ok(),
            };
        }
        if !acc.allows_indexing() {
            return UpdateOutcome::Ignored;
        }

        let evt = self.normalizer.normalize(&st, Utc::now());
        let res = self.writer.write(&evt, GROUP_ID_DEFAULT, addr).await;
        match &res {
            Ok(()) => {
                counter!("stream_written_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(id = %evt.id, src = addr, error = %e, "failed to submit the live stream event");
            }
        }
        UpdateOutcome::Written {
            id: evt.id,
            ok: res.is_ok(),
        }
    }
}

fn preview(data: &[u8]) -> String {
    let end = data.len().min(LOG_DATA_PREVIEW);
    String::from_utf8_lossy(&data[..end]).into_owned()
}
