// src/follow.rs
//! Follow delegation: asks the ActivityPub bridge to follow (or request to follow) an account.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::platform::error_body;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FollowError {
    #[error("internal failure: {0}")]
    Internal(String),
}

#[async_trait]
pub trait FollowService: Send + Sync {
    /// `addr` is the target account; `user_id` the requester identity (empty when the
    /// group follows on behalf of an interest); `sub_id`/`term` the originating interest.
    async fn create(
        &self,
        addr: &str,
        group_id: &str,
        user_id: &str,
        sub_id: &str,
        term: &str,
    ) -> Result<(), FollowError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    addr: &'a str,
    group_id: &'a str,
    user_id: &'a str,
    sub_id: &'a str,
    term: &'a str,
}

/// JSON-over-HTTP client for the follow bridge.
#[derive(Clone)]
pub struct HttpFollowService {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpFollowService {
    pub fn new(client: Client, base_uri: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/create", base_uri.trim_end_matches('/')),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FollowService for HttpFollowService {
    async fn create(
        &self,
        addr: &str,
        group_id: &str,
        user_id: &str,
        sub_id: &str,
        term: &str,
    ) -> Result<(), FollowError> {
        let body = CreateRequest {
            addr,
            group_id,
            user_id,
            sub_id,
            term,
        };
        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| FollowError::Internal(e.to_string()))?;
        if let Err(e) = rsp.error_for_status_ref() {
            let detail = error_body(rsp).await;
            return Err(FollowError::Internal(format!("{e}: {detail}")));
        }
        Ok(())
    }
}
