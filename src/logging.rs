// src/logging.rs
//! Logging decorator applied around collaborators and the pipeline at the composition root.
//!
//! `Logging<S>` implements the same trait as the wrapped `S` and logs every call with
//! structured fields: `debug` on success, `warn` on failure.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{SearchOutcome, Service, StreamError};
use crate::event::NormalizedEvent;
use crate::follow::{FollowError, FollowService};
use crate::model::SearchQuery;
use crate::queue::Envelope;
use crate::writer::{WriteError, Writer};

#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
}

impl<S> Logging<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: FollowService> FollowService for Logging<S> {
    async fn create(
        &self,
        addr: &str,
        group_id: &str,
        user_id: &str,
        sub_id: &str,
        term: &str,
    ) -> Result<(), FollowError> {
        let res = self.inner.create(addr, group_id, user_id, sub_id, term).await;
        match &res {
            Ok(()) => debug!(addr, group_id, user_id, sub_id, term, "follow.create"),
            Err(e) => warn!(addr, group_id, user_id, sub_id, term, error = %e, "follow.create"),
        }
        res
    }
}

#[async_trait]
impl<S: Writer> Writer for Logging<S> {
    async fn write(
        &self,
        evt: &NormalizedEvent,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), WriteError> {
        let res = self.inner.write(evt, group_id, user_id).await;
        match &res {
            Ok(()) => debug!(id = %evt.id, source = %evt.source, group_id, user_id, "writer.write"),
            Err(e) => warn!(id = %evt.id, source = %evt.source, group_id, user_id, error = %e, "writer.write"),
        }
        res
    }
}

#[async_trait]
impl<S: Service> Service for Logging<S> {
    async fn search_and_add(&self, q: &SearchQuery) -> SearchOutcome {
        let out = self.inner.search_and_add(q).await;
        if out.is_ok() {
            debug!(
                sub_id = %q.interest_id,
                group_id = %q.group_id,
                q = %q.text,
                typ = %q.search_type,
                n = out.accepted,
                "service.search_and_add"
            );
        } else {
            warn!(
                sub_id = %q.interest_id,
                group_id = %q.group_id,
                q = %q.text,
                typ = %q.search_type,
                n = out.accepted,
                error = %out.errors,
                "service.search_and_add"
            );
        }
        out
    }

    async fn run_live_stream(&self, cancel: &CancellationToken) -> StreamError {
        let err = self.inner.run_live_stream(cancel).await;
        match err {
            StreamError::Cancelled => info!(error = %err, "service.run_live_stream"),
            _ => warn!(error = %err, "service.run_live_stream"),
        }
        err
    }

    async fn handle_live_stream_events(&self, evts: &[Envelope]) {
        self.inner.handle_live_stream_events(evts).await;
        debug!(count = evts.len(), "service.handle_live_stream_events");
    }
}
