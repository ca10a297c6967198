// src/writer.rs
//! Event writer: publishes normalized events to the downstream resolver.
//!
//! The HTTP writer owns its retry policy (exponential backoff); callers never retry.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::event::NormalizedEvent;
use crate::platform::error_body;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("writer rejected event {id}: {message}")]
    Rejected { id: String, message: String },
    #[error("writer unreachable after {attempts} attempts: {message}")]
    Unavailable { attempts: u8, message: String },
}

#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(
        &self,
        evt: &NormalizedEvent,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), WriteError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    group_id: &'a str,
    user_id: &'a str,
    events: [&'a NormalizedEvent; 1],
}

#[derive(Clone)]
pub struct HttpWriter {
    client: Client,
    endpoint: String,
    timeout: Duration,
    backoff: Duration,
    max_retries: u8,
}

impl HttpWriter {
    pub fn new(client: Client, base_uri: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/events", base_uri.trim_end_matches('/')),
            timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(1),
            max_retries: 3,
        }
    }

    /// First retry delay; doubles per attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn delay(&self, attempt: u8) -> Duration {
        self.backoff
            .saturating_mul(1u32 << u32::from(attempt.saturating_sub(1)).min(16))
    }
}

#[async_trait]
impl Writer for HttpWriter {
    async fn write(
        &self,
        evt: &NormalizedEvent,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), WriteError> {
        let payload = WriteRequest {
            group_id,
            user_id,
            events: [evt],
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.endpoint)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    // 4xx will not get better by retrying
                    if status.is_client_error() {
                        let body = error_body(rsp).await;
                        return Err(WriteError::Rejected {
                            id: evt.id.clone(),
                            message: format!("{status}: {body}"),
                        });
                    }
                    if attempt >= self.max_retries {
                        return Err(WriteError::Unavailable {
                            attempts: attempt,
                            message: format!("HTTP {status}"),
                        });
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(WriteError::Unavailable {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                }
            }
            tokio::time::sleep(self.delay(attempt)).await;
        }
    }
}
