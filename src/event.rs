// src/event.rs
//! Normalized event envelope and the status → event conversion.
//!
//! The event id is a UUIDv7: a 48-bit millisecond timestamp followed by bytes taken
//! from the source address, so ids sort by time and stay fixed-width.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::{Builder, Uuid};

use crate::model::Status;

pub const SPEC_VERSION: &str = "1.0";

pub const KEY_SUBJECT: &str = "subject";
pub const KEY_TIME: &str = "time";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_OBJECT_URL: &str = "objecturl";
pub const KEY_CATEGORIES: &str = "categories";
pub const KEY_ATTACHMENT_TYPE: &str = "attachmenttype";
pub const KEY_ATTACHMENT_URL: &str = "attachmenturl";

const ENTROPY_LEN: usize = 16;
const MAX_UNIX_MILLIS: u64 = (1 << 48) - 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Uri(String),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
    Integer(i64),
}

impl AttributeValue {
    /// Text form for string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) | AttributeValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "specversion")]
    pub spec_version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub payload: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("timestamp {0}ms outside the 48-bit id range")]
    TimestampOutOfRange(i64),
}

/// Pads (leading zeros) or truncates the source bytes to a fixed width.
pub fn source_entropy(source: &str) -> [u8; ENTROPY_LEN] {
    let bytes = source.as_bytes();
    let mut out = [0u8; ENTROPY_LEN];
    if bytes.len() >= ENTROPY_LEN {
        out.copy_from_slice(&bytes[..ENTROPY_LEN]);
    } else {
        out[ENTROPY_LEN - bytes.len()..].copy_from_slice(bytes);
    }
    out
}

/// Time-ordered id carrying source-derived bytes.
///
/// The 10-byte payload is the tail of the entropy. Short sources land there whole, and
/// long ones contribute the bytes after the shared `https:` scheme.
pub fn derive_id(source: &str, now: DateTime<Utc>) -> Result<Uuid, IdError> {
    let ms = now.timestamp_millis();
    let ms_u = u64::try_from(ms)
        .ok()
        .filter(|v| *v <= MAX_UNIX_MILLIS)
        .ok_or(IdError::TimestampOutOfRange(ms))?;
    let entropy = source_entropy(source);
    let mut payload = [0u8; 10];
    payload.copy_from_slice(&entropy[ENTROPY_LEN - 10..]);
    Ok(Builder::from_unix_timestamp_millis(ms_u, &payload).into_uuid())
}

/// Never fails: falls back to a random v7 id.
pub fn event_id(source: &str, now: DateTime<Utc>) -> Uuid {
    derive_id(source, now).unwrap_or_else(|e| {
        tracing::warn!(error = %e, source, "event id derivation failed, using random id");
        Uuid::now_v7()
    })
}

/// Builds normalized events of one configured type.
#[derive(Debug, Clone)]
pub struct Normalizer {
    event_type: String,
}

impl Normalizer {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Converts an accepted status. Optional fields that are empty are left out.
    pub fn normalize(&self, st: &Status, now: DateTime<Utc>) -> NormalizedEvent {
        let source = st.account.address().to_string();
        let id = event_id(&source, now).to_string();

        let mut attributes = BTreeMap::new();
        attributes.insert(
            KEY_SUBJECT.to_string(),
            AttributeValue::String(st.account.display_name.clone()),
        );
        attributes.insert(KEY_TIME.to_string(), AttributeValue::Timestamp(st.created_at));
        if !st.language.is_empty() {
            attributes.insert(
                KEY_LANGUAGE.to_string(),
                AttributeValue::String(st.language.clone()),
            );
        }
        if !st.url.is_empty() {
            attributes.insert(KEY_OBJECT_URL.to_string(), AttributeValue::Uri(st.url.clone()));
        }

        let cats: Vec<&str> = st
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .filter(|n| !n.is_empty())
            .collect();
        if !cats.is_empty() {
            attributes.insert(
                KEY_CATEGORIES.to_string(),
                AttributeValue::String(cats.join(" ")),
            );
        }

        if let Some(att) = st.media_attachments.first() {
            attributes.insert(
                KEY_ATTACHMENT_TYPE.to_string(),
                AttributeValue::String(att.kind.clone()),
            );
            let u = if att.preview_url.is_empty() {
                &att.url
            } else {
                &att.preview_url
            };
            if !u.is_empty() {
                attributes.insert(KEY_ATTACHMENT_URL.to_string(), AttributeValue::Uri(u.clone()));
            }
        }

        NormalizedEvent {
            id,
            source,
            spec_version: SPEC_VERSION.to_string(),
            kind: self.event_type.clone(),
            attributes,
            payload: st.content.clone(),
        }
    }
}
