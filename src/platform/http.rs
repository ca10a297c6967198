// src/platform/http.rs
//! `reqwest` implementation of [`Platform`] against the Mastodon REST + streaming API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response};
use std::time::Duration;

use super::{
    Credential, EventStream, Platform, PlatformError, SearchPage, SseStream, LIMIT_ERR_BODY_LEN,
    LIMIT_RESP_BODY_LEN,
};
use crate::model::Results;

const PATH_SEARCH: &str = "/api/v2/search";
const PATH_ACCOUNTS: &str = "/api/v1/accounts";
const PATH_STREAM_PUBLIC: &str = "/api/v1/streaming/public";

#[derive(Clone)]
pub struct HttpPlatform {
    client: Client,
    user_agent: String,
    /// Full firehose URL; when empty it is derived from the credential host.
    stream_endpoint: String,
    timeout: Duration,
}

impl HttpPlatform {
    /// `client` is shared (connection pool) and must not carry a global timeout,
    /// since the firehose response never completes.
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            stream_endpoint: String::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_stream_endpoint(mut self, url: impl Into<String>) -> Self {
        self.stream_endpoint = url.into();
        self
    }

    /// Per-request timeout for search and follow calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn stream_url(&self, cred: &Credential) -> String {
        if self.stream_endpoint.is_empty() {
            format!("{}{PATH_STREAM_PUBLIC}", cred.base_url())
        } else {
            self.stream_endpoint.clone()
        }
    }

    fn headers(&self, cred: &Credential, accept: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Ok(v) = accept.parse() {
            h.insert(ACCEPT, v);
        }
        if let Ok(v) = format!("Bearer {}", cred.token).parse() {
            h.insert(AUTHORIZATION, v);
        }
        if let Ok(v) = self.user_agent.parse() {
            h.insert(USER_AGENT, v);
        }
        h
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<Response, PlatformError> {
        let mut req = self.client.request(method.clone(), url).headers(headers.clone());
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req.send().await.map_err(|e| PlatformError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(status_error(method, url, &headers, resp).await);
        }
        Ok(resp)
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn search(&self, cred: &Credential, page: &SearchPage<'_>) -> Result<Results, PlatformError> {
        let base = format!("{}{PATH_SEARCH}", cred.base_url());
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("q", page.q.to_string()),
                ("type", page.search_type.as_str().to_string()),
                ("resolve", "true".to_string()),
                ("offset", page.offset.to_string()),
                ("limit", page.limit.to_string()),
            ],
        )
        .map_err(|e| PlatformError::Network {
            url: base.clone(),
            message: e.to_string(),
        })?;
        let url = url.to_string();

        let resp = self
            .send(
                Method::GET,
                &url,
                self.headers(cred, "application/json"),
                Some(self.timeout),
            )
            .await?;
        let (data, truncated) = read_limited(resp, LIMIT_RESP_BODY_LEN)
            .await
            .map_err(|message| PlatformError::Network {
                url: url.clone(),
                message,
            })?;
        if truncated {
            return Err(PlatformError::TooLarge {
                url,
                limit: LIMIT_RESP_BODY_LEN,
            });
        }
        serde_json::from_slice(&data).map_err(|e| PlatformError::Decode {
            url,
            message: e.to_string(),
        })
    }

    async fn follow(&self, cred: &Credential, account_id: &str) -> Result<(), PlatformError> {
        let url = format!("{}{PATH_ACCOUNTS}/{account_id}/follow", cred.base_url());
        self.send(
            Method::POST,
            &url,
            self.headers(cred, "application/json"),
            Some(self.timeout),
        )
        .await?;
        Ok(())
    }

    async fn open_stream(&self, cred: &Credential) -> Result<EventStream, PlatformError> {
        let url = self.stream_url(cred);
        let resp = self
            .send(Method::GET, &url, self.headers(cred, "text/event-stream"), None)
            .await?;
        Ok(Box::pin(SseStream::new(url, resp.bytes_stream())))
    }
}

/// Reads at most `limit` bytes; the flag reports whether the body was cut.
async fn read_limited(resp: Response, limit: usize) -> Result<(Vec<u8>, bool), String> {
    let mut body = resp.bytes_stream();
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        let room = limit - out.len();
        if chunk.len() > room {
            out.extend_from_slice(&chunk[..room]);
            return Ok((out, true));
        }
        out.extend_from_slice(&chunk);
    }
    Ok((out, false))
}

/// Response body for diagnostics, cut at `LIMIT_ERR_BODY_LEN`.
pub(crate) async fn error_body(resp: Response) -> String {
    match read_limited(resp, LIMIT_ERR_BODY_LEN).await {
        Ok((b, _)) => String::from_utf8_lossy(&b).into_owned(),
        Err(e) => format!("<unreadable body: {e}>"),
    }
}

async fn status_error(method: Method, url: &str, headers: &HeaderMap, resp: Response) -> PlatformError {
    let status = resp.status().as_u16();
    let body = error_body(resp).await;
    PlatformError::Status {
        method: method.to_string(),
        url: url.to_string(),
        status,
        headers: redacted(headers),
        body,
    }
}

fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            let val = if *k == AUTHORIZATION {
                "Bearer ***".to_string()
            } else {
                v.to_str().unwrap_or_default().to_string()
            };
            (k.as_str().to_string(), val)
        })
        .collect()
}
