// src/config.rs
//! Service configuration: TOML file (optional) overlaid with environment variables.
//!
//! Lookup order for the file:
//! 1) $INGEST_CONFIG_PATH
//! 2) config/ingest.toml
//! 3) built-in defaults
//!
//! Environment variables always win over the file.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::Credential;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("credential hosts ({hosts}) and tokens ({tokens}) must have the same length")]
    CredentialMismatch { hosts: usize, tokens: usize },
    #[error("no platform credentials configured")]
    NoCredentials,
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub mastodon: MastodonConfig,
    pub event: EventConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    pub writer: WriterConfig,
    pub activitypub: ActivityPubConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            writer: WriterConfig::default(),
            activitypub: ActivityPubConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriterConfig {
    pub uri: String,
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
    pub max_retries: u8,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            uri: "http://resolver:8080".to_string(),
            backoff: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivityPubConfig {
    pub uri: String,
    /// Public host of the bridge, used to build interest actor addresses.
    pub host: String,
}

impl Default for ActivityPubConfig {
    fn default() -> Self {
        Self {
            uri: "http://int-activitypub:8080".to_string(),
            host: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MastodonConfig {
    pub hosts: Vec<String>,
    pub tokens: Vec<String>,
    pub user_agent: String,
    /// Full firehose URL; empty derives it from the first host.
    pub stream_endpoint: String,
    #[serde(with = "humantime_serde")]
    pub stream_timeout_max: Duration,
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub search_limit: u32,
    pub count_min: CountMin,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            tokens: Vec::new(),
            user_agent: "fedi-ingest".to_string(),
            stream_endpoint: String::new(),
            stream_timeout_max: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            search_limit: 10,
            count_min: CountMin::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CountMin {
    pub followers: u32,
    pub posts: u32,
}

impl Default for CountMin {
    fn default() -> Self {
        Self {
            followers: 10,
            posts: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            kind: "com_mastodon_status_v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `fedi_ingest=debug,warn`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// File (if any) + process environment, validated.
    pub fn load_default() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::load_from(&p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Overlays values found through `get` (the process environment in production).
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("API_PORT") {
            self.api.port = parse_num("API_PORT", &v)?;
        }
        if let Some(v) = get("API_WRITER_URI") {
            self.api.writer.uri = v;
        }
        if let Some(v) = get("API_WRITER_BACKOFF") {
            self.api.writer.backoff = parse_duration_key("API_WRITER_BACKOFF", &v)?;
        }
        if let Some(v) = get("API_WRITER_MAX_RETRIES") {
            self.api.writer.max_retries = parse_num("API_WRITER_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("API_ACTIVITYPUB_URI") {
            self.api.activitypub.uri = v;
        }
        if let Some(v) = get("API_ACTIVITYPUB_HOST") {
            self.api.activitypub.host = v;
        }
        if let Some(v) = get("API_MASTODON_CLIENT_HOSTS") {
            self.mastodon.hosts = split_list(&v);
        }
        if let Some(v) = get("API_MASTODON_CLIENT_TOKENS") {
            self.mastodon.tokens = split_list(&v);
        }
        if let Some(v) = get("API_MASTODON_USER_AGENT") {
            self.mastodon.user_agent = v;
        }
        if let Some(v) = get("API_MASTODON_ENDPOINT_STREAM") {
            self.mastodon.stream_endpoint = v;
        }
        if let Some(v) = get("API_MASTODON_STREAM_TIMEOUT_MAX") {
            self.mastodon.stream_timeout_max =
                parse_duration_key("API_MASTODON_STREAM_TIMEOUT_MAX", &v)?;
        }
        if let Some(v) = get("API_MASTODON_SEARCH_LIMIT") {
            self.mastodon.search_limit = parse_num("API_MASTODON_SEARCH_LIMIT", &v)?;
        }
        if let Some(v) = get("API_MASTODON_COUNT_MIN_FOLLOWERS") {
            self.mastodon.count_min.followers = parse_num("API_MASTODON_COUNT_MIN_FOLLOWERS", &v)?;
        }
        if let Some(v) = get("API_MASTODON_COUNT_MIN_POSTS") {
            self.mastodon.count_min.posts = parse_num("API_MASTODON_COUNT_MIN_POSTS", &v)?;
        }
        if let Some(v) = get("API_EVENT_TYPE") {
            self.event.kind = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log.level = v;
        }
        Ok(())
    }

    /// Misaligned credentials are fatal: the service refuses to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.mastodon;
        if m.hosts.len() != m.tokens.len() {
            return Err(ConfigError::CredentialMismatch {
                hosts: m.hosts.len(),
                tokens: m.tokens.len(),
            });
        }
        Ok(())
    }

    /// Host/token pairs in configured order.
    pub fn credentials(&self) -> Result<Vec<Credential>, ConfigError> {
        self.validate()?;
        let m = &self.mastodon;
        if m.hosts.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        Ok(m.hosts
            .iter()
            .zip(&m.tokens)
            .map(|(h, t)| Credential::new(h.clone(), t.clone()))
            .collect())
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_num<T: std::str::FromStr>(key: &str, v: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    v.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: v.to_string(),
        reason: e.to_string(),
    })
}

fn parse_duration_key(key: &str, v: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(v.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: v.to_string(),
        reason: e.to_string(),
    })
}

/// `500ms`, `10s`, `1m`, `2h` (any `humantime` form) in config files.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }
}
