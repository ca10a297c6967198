// src/queue.rs
//! Queue-delivered envelopes: interest notifications and relayed live-stream updates.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::discovery::Service;
use crate::event::AttributeValue;
use crate::model::{SearchQuery, SearchType};

pub const KEY_GROUP_ID: &str = "awakarigroupid";
pub const KEY_QUERIES_COMPL: &str = "queriescompl";
pub const KEY_PUBLIC: &str = "public";
pub const KEY_DISCOVER: &str = "discover";

/// CloudEvents-style envelope as delivered by the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_data: Option<String>,
    /// Base64 payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope carries no data")]
    NoData,
    #[error("invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl Envelope {
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_str)
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(AttributeValue::as_bool)
    }

    /// Binary data wins over text data.
    pub fn data(&self) -> Result<Cow<'_, [u8]>, EnvelopeError> {
        if let Some(b64) = &self.binary_data {
            let raw = base64::engine::general_purpose::STANDARD.decode(b64)?;
            return Ok(Cow::Owned(raw));
        }
        match &self.text_data {
            Some(t) => Ok(Cow::Borrowed(t.as_bytes())),
            None => Err(EnvelopeError::NoData),
        }
    }
}

/// Static inputs for turning interest notifications into searches.
#[derive(Debug, Clone)]
pub struct InterestOptions {
    /// Host of the ActivityPub bridge; public interests are followable as `{id}@{host}`.
    pub activitypub_host: String,
    /// Per-query limit for status searches.
    pub search_limit: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub accepted: u32,
}

/// Handles one batch of "interest created/updated" notifications.
///
/// Per envelope (interest id in the text data):
/// - no group id: logged and skipped, the batch continues
/// - `public`: follow the interest's own actor from the platform (accounts search, limit 1)
/// - discovery enabled (default) and completed queries present: status search per query
pub async fn consume_interest_events(
    svc: &dyn Service,
    evts: &[Envelope],
    opts: &InterestOptions,
) -> BatchReport {
    tracing::debug!(count = evts.len(), "consume interest events");
    let mut report = BatchReport::default();
    for evt in evts {
        let interest_id = evt.text_data.as_deref().unwrap_or_default();
        let group_id = evt.attr_str(KEY_GROUP_ID).unwrap_or_default();
        if group_id.is_empty() {
            tracing::error!(interest_id, "interest event: empty group id, skipping");
            report.skipped += 1;
            continue;
        }
        report.processed += 1;

        if evt.attr_bool(KEY_PUBLIC).unwrap_or(false) {
            let actor = format!("{interest_id}@{}", opts.activitypub_host);
            let q = SearchQuery {
                interest_id: interest_id.to_string(),
                group_id: group_id.to_string(),
                text: actor,
                limit: 1,
                search_type: SearchType::Accounts,
            };
            report.accepted += svc.search_and_add(&q).await.accepted;
        } else {
            tracing::debug!(interest_id, "interest event: not public");
        }

        if !evt.attr_bool(KEY_DISCOVER).unwrap_or(true) {
            tracing::debug!(interest_id, "interest event: discovery disabled");
            continue;
        }
        let queries: Vec<&str> = evt
            .attr_str(KEY_QUERIES_COMPL)
            .unwrap_or_default()
            .split('\n')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            tracing::debug!(interest_id, "interest event: no queries, skipping the sources discovery");
            continue;
        }
        for text in queries {
            let q = SearchQuery {
                interest_id: interest_id.to_string(),
                group_id: group_id.to_string(),
                text: text.to_string(),
                limit: opts.search_limit,
                search_type: SearchType::Statuses,
            };
            report.accepted += svc.search_and_add(&q).await.accepted;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_attributes() {
        let raw = r#"{
            "id": "1",
            "type": "interests.created",
            "attributes": {
                "awakarigroupid": {"string": "g1"},
                "public": {"boolean": true}
            },
            "text_data": "interest-1"
        }"#;
        let e: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(e.attr_str(KEY_GROUP_ID), Some("g1"));
        assert_eq!(e.attr_bool(KEY_PUBLIC), Some(true));
        assert_eq!(e.attr_bool(KEY_DISCOVER), None);
    }

    #[test]
    fn binary_data_is_base64() {
        let e = Envelope {
            binary_data: Some("eyJhIjoxfQ==".into()),
            text_data: Some("ignored".into()),
            ..Default::default()
        };
        assert_eq!(e.data().unwrap().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn missing_data_is_an_error() {
        let e = Envelope::default();
        assert!(matches!(e.data(), Err(EnvelopeError::NoData)));
        let bad = Envelope {
            binary_data: Some("***".into()),
            ..Default::default()
        };
        assert!(matches!(bad.data(), Err(EnvelopeError::Base64(_))));
    }
}
