// src/model.rs
//! Upstream platform types (only the fields the pipeline consumes) and the search switch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Mastodon sends `null` for many optional strings; treat it like the zero value.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Which result set a search reads and which follow action it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Statuses,
    Accounts,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Statuses => "statuses",
            SearchType::Accounts => "accounts",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub interest_id: String,
    pub group_id: String,
    pub text: String,
    pub limit: u32,
    pub search_type: SearchType,
}

/// `GET /api/v2/search` response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Results {
    #[serde(default, deserialize_with = "null_as_default")]
    pub statuses: Vec<Status>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub accounts: Vec<Account>,
}

impl Results {
    /// Number of upstream items on this page for the requested type.
    pub fn page_len(&self, typ: SearchType) -> usize {
        match typ {
            SearchType::Statuses => self.statuses.len(),
            SearchType::Accounts => self.accounts.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visibility: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub language: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sensitive: bool,
    pub account: Account,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_attachments: Vec<MediaAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Instance-local id, used by the follow endpoint.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub acct: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub discoverable: bool,
    /// Absent and `false` mean different things: only an explicit `false` opts out.
    #[serde(default)]
    pub indexable: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locked: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub noindex: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub followers_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub statuses_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

impl Account {
    /// Best available address: canonical uri, then web url, then the handle.
    pub fn address(&self) -> &str {
        [&self.uri, &self.url, &self.acct]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// `indexable` unset or explicitly `true`.
    pub fn allows_indexing(&self) -> bool {
        self.indexable.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub preview_url: String,
}
