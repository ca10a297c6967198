// src/platform/mod.rs
//! Upstream platform access: search, follow and the public firehose.

pub mod http;
pub mod sse;

use async_trait::async_trait;
use futures::stream::Stream;
use std::fmt;
use std::pin::Pin;

use crate::model::{Results, SearchType};

pub use http::HttpPlatform;
pub use sse::{SseStream, StreamEvent};
pub(crate) use http::error_body;

/// Hard ceiling for any upstream response body.
pub const LIMIT_RESP_BODY_LEN: usize = 1_048_576;

/// Ceiling for response bodies quoted in error diagnostics.
pub const LIMIT_ERR_BODY_LEN: usize = 1024;

/// One instance host and the access token issued by it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub host: String,
    pub token: String,
}

impl Credential {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
        }
    }

    /// `https://{host}` unless the host already carries a scheme.
    pub fn base_url(&self) -> String {
        let h = self.host.trim_end_matches('/');
        if h.contains("://") {
            h.to_string()
        } else {
            format!("https://{h}")
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("host", &self.host)
            .field("token", &"***")
            .finish()
    }
}

/// One page of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage<'a> {
    pub q: &'a str,
    pub search_type: SearchType,
    pub offset: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("{method} {url} responded {status}, request headers: {headers:?}, response: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, PlatformError>> + Send>>;

#[async_trait]
pub trait Platform: Send + Sync {
    /// One page of `GET /api/v2/search` with `resolve=true`.
    async fn search(&self, cred: &Credential, page: &SearchPage<'_>) -> Result<Results, PlatformError>;

    /// `POST /api/v1/accounts/{id}/follow` on behalf of the credential's account.
    async fn follow(&self, cred: &Credential, account_id: &str) -> Result<(), PlatformError>;

    /// Opens the public firehose.
    async fn open_stream(&self, cred: &Credential) -> Result<EventStream, PlatformError>;
}
