// tests/common/mod.rs
// Hand-written doubles for the pipeline's collaborators, shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream;
use futures::StreamExt as _;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use fedi_ingest::discovery::{Discovery, SearchOutcome, Service, StreamError};
use fedi_ingest::event::{NormalizedEvent, Normalizer};
use fedi_ingest::follow::{FollowError, FollowService};
use fedi_ingest::model::{Account, MediaAttachment, Results, SearchQuery, SearchType, Status, Tag};
use fedi_ingest::platform::{
    Credential, EventStream, Platform, PlatformError, SearchPage, StreamEvent,
};
use fedi_ingest::policy::Policy;
use fedi_ingest::queue::Envelope;
use fedi_ingest::writer::{WriteError, Writer};

pub const MIN_FOLLOWERS: u32 = 10;
pub const MIN_POSTS: u32 = 10;
pub const EVENT_TYPE: &str = "com_mastodon_status_v1";

// ---------- fixtures ----------

/// An account that passes every rule.
pub fn account_fixture(addr: &str) -> Account {
    Account {
        id: format!("id-{addr}"),
        acct: addr.to_string(),
        display_name: format!("Display {addr}"),
        discoverable: true,
        indexable: Some(true),
        uri: format!("https://social.example/users/{addr}"),
        followers_count: 100,
        statuses_count: 100,
        ..Default::default()
    }
}

/// A public status by an eligible account.
pub fn status_fixture(addr: &str) -> Status {
    Status {
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        visibility: "public".to_string(),
        language: "en".to_string(),
        uri: format!("https://social.example/users/{addr}/statuses/1"),
        url: format!("https://social.example/@{addr}/1"),
        content: "<p>hello fediverse</p>".to_string(),
        sensitive: false,
        account: account_fixture(addr),
        tags: vec![
            Tag {
                name: "rust".to_string(),
            },
            Tag {
                name: "tokio".to_string(),
            },
        ],
        media_attachments: vec![MediaAttachment {
            kind: "image".to_string(),
            url: "https://files.example/full.png".to_string(),
            preview_url: "https://files.example/small.png".to_string(),
        }],
    }
}

pub fn statuses_page(prefix: &str, n: usize) -> Results {
    Results {
        statuses: (0..n).map(|i| status_fixture(&format!("{prefix}{i}"))).collect(),
        accounts: Vec::new(),
    }
}

pub fn accounts_page(prefix: &str, n: usize) -> Results {
    Results {
        statuses: Vec::new(),
        accounts: (0..n).map(|i| account_fixture(&format!("{prefix}{i}"))).collect(),
    }
}

pub fn update_event(st: &Status) -> StreamEvent {
    StreamEvent {
        event: "update".to_string(),
        data: serde_json::to_string(st).unwrap(),
    }
}

pub fn update_envelope(st: &Status) -> Envelope {
    Envelope {
        id: "evt".to_string(),
        kind: "update".to_string(),
        text_data: Some(serde_json::to_string(st).unwrap()),
        ..Default::default()
    }
}

// ---------- platform ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCall {
    pub host: String,
    pub q: String,
    pub search_type: SearchType,
    pub offset: u32,
    pub limit: u32,
}

/// Scripted platform. Search pages are served per host in order; once a host's
/// script runs out it returns empty pages.
#[derive(Default)]
pub struct MockPlatform {
    pages: Mutex<HashMap<String, VecDeque<Result<Results, PlatformError>>>>,
    pub searches: Mutex<Vec<SearchCall>>,
    pub follows: Mutex<Vec<(String, String)>>,
    failing_follows: Mutex<HashSet<String>>,
    stream_events: Mutex<Option<Vec<Result<StreamEvent, PlatformError>>>>,
    stream_open_error: Mutex<Option<PlatformError>>,
    stream_stays_open: Mutex<bool>,
    pub streams_opened: Mutex<u32>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, host: &str, page: Results) -> Self {
        self.pages
            .lock()
            .entry(host.to_string())
            .or_default()
            .push_back(Ok(page));
        self
    }

    pub fn failing_search(self, host: &str, err: PlatformError) -> Self {
        self.pages
            .lock()
            .entry(host.to_string())
            .or_default()
            .push_back(Err(err));
        self
    }

    pub fn failing_follow(self, account_id: &str) -> Self {
        self.failing_follows.lock().insert(account_id.to_string());
        self
    }

    /// Events served by the next `open_stream`; with `stays_open` the stream then
    /// idles forever instead of ending.
    pub fn stream(self, events: Vec<StreamEvent>, stays_open: bool) -> Self {
        *self.stream_events.lock() = Some(events.into_iter().map(Ok).collect());
        *self.stream_stays_open.lock() = stays_open;
        self
    }

    pub fn stream_with_error(self, events: Vec<Result<StreamEvent, PlatformError>>) -> Self {
        *self.stream_events.lock() = Some(events);
        self
    }

    pub fn stream_open_error(self, err: PlatformError) -> Self {
        *self.stream_open_error.lock() = Some(err);
        self
    }

    pub fn offsets(&self, host: &str) -> Vec<(u32, u32)> {
        self.searches
            .lock()
            .iter()
            .filter(|c| c.host == host)
            .map(|c| (c.offset, c.limit))
            .collect()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn search(
        &self,
        cred: &Credential,
        page: &SearchPage<'_>,
    ) -> Result<Results, PlatformError> {
        self.searches.lock().push(SearchCall {
            host: cred.host.clone(),
            q: page.q.to_string(),
            search_type: page.search_type,
            offset: page.offset,
            limit: page.limit,
        });
        self.pages
            .lock()
            .get_mut(&cred.host)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Results::default()))
    }

    async fn follow(&self, cred: &Credential, account_id: &str) -> Result<(), PlatformError> {
        self.follows
            .lock()
            .push((cred.host.clone(), account_id.to_string()));
        if self.failing_follows.lock().contains(account_id) {
            return Err(PlatformError::Status {
                method: "POST".to_string(),
                url: format!("https://{}/api/v1/accounts/{account_id}/follow", cred.host),
                status: 403,
                headers: vec![("authorization".to_string(), "Bearer ***".to_string())],
                body: "forbidden".to_string(),
            });
        }
        Ok(())
    }

    async fn open_stream(&self, _cred: &Credential) -> Result<EventStream, PlatformError> {
        *self.streams_opened.lock() += 1;
        if let Some(e) = self.stream_open_error.lock().clone() {
            return Err(e);
        }
        let events = self.stream_events.lock().clone().unwrap_or_default();
        let head = stream::iter(events);
        if *self.stream_stays_open.lock() {
            Ok(Box::pin(head.chain(stream::pending())))
        } else {
            Ok(Box::pin(head))
        }
    }
}

// ---------- follow delegation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowCall {
    pub addr: String,
    pub group_id: String,
    pub user_id: String,
    pub sub_id: String,
    pub term: String,
}

#[derive(Default)]
pub struct MockFollows {
    pub calls: Mutex<Vec<FollowCall>>,
    failing: Mutex<HashSet<String>>,
}

impl MockFollows {
    pub fn fail_for(&self, addr: &str) {
        self.failing.lock().insert(addr.to_string());
    }

    pub fn calls(&self) -> Vec<FollowCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FollowService for MockFollows {
    async fn create(
        &self,
        addr: &str,
        group_id: &str,
        user_id: &str,
        sub_id: &str,
        term: &str,
    ) -> Result<(), FollowError> {
        self.calls.lock().push(FollowCall {
            addr: addr.to_string(),
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            sub_id: sub_id.to_string(),
            term: term.to_string(),
        });
        if self.failing.lock().contains(addr) {
            return Err(FollowError::Internal(format!("bridge refused {addr}")));
        }
        Ok(())
    }
}

// ---------- writer ----------

#[derive(Default)]
pub struct MockWriter {
    pub writes: Mutex<Vec<(NormalizedEvent, String, String)>>,
    fail: Mutex<bool>,
    stall: Mutex<Option<Duration>>,
}

impl MockWriter {
    pub fn fail_all(&self) {
        *self.fail.lock() = true;
    }

    /// Every write sleeps this long before recording.
    pub fn stall_for(&self, d: Duration) {
        *self.stall.lock() = Some(d);
    }

    pub fn writes(&self) -> Vec<(NormalizedEvent, String, String)> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl Writer for MockWriter {
    async fn write(
        &self,
        evt: &NormalizedEvent,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), WriteError> {
        let stall = *self.stall.lock();
        if let Some(d) = stall {
            tokio::time::sleep(d).await;
        }
        self.writes
            .lock()
            .push((evt.clone(), group_id.to_string(), user_id.to_string()));
        if *self.fail.lock() {
            return Err(WriteError::Unavailable {
                attempts: 1,
                message: "writer down".to_string(),
            });
        }
        Ok(())
    }
}

// ---------- service ----------

/// Records what the HTTP/queue layer asks of the pipeline.
#[derive(Default)]
pub struct MockService {
    pub queries: Mutex<Vec<SearchQuery>>,
    pub batches: Mutex<Vec<usize>>,
    outcome: Mutex<SearchOutcome>,
}

impl MockService {
    pub fn with_outcome(outcome: SearchOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Service for MockService {
    async fn search_and_add(&self, q: &SearchQuery) -> SearchOutcome {
        self.queries.lock().push(q.clone());
        self.outcome.lock().clone()
    }

    async fn run_live_stream(&self, cancel: &CancellationToken) -> StreamError {
        cancel.cancelled().await;
        StreamError::Cancelled
    }

    async fn handle_live_stream_events(&self, evts: &[Envelope]) {
        self.batches.lock().push(evts.len());
    }
}

// ---------- wiring ----------

pub struct Harness {
    pub platform: Arc<MockPlatform>,
    pub follows: Arc<MockFollows>,
    pub writer: Arc<MockWriter>,
    pub discovery: Discovery,
}

pub fn harness(platform: MockPlatform, hosts: &[&str]) -> Harness {
    let platform = Arc::new(platform);
    let follows = Arc::new(MockFollows::default());
    let writer = Arc::new(MockWriter::default());
    let credentials = hosts
        .iter()
        .map(|h| Credential::new(*h, format!("token-{h}")))
        .collect();
    let discovery = Discovery::new(
        platform.clone(),
        credentials,
        Policy::new(MIN_FOLLOWERS, MIN_POSTS),
        Normalizer::new(EVENT_TYPE),
        follows.clone(),
        writer.clone(),
    );
    Harness {
        platform,
        follows,
        writer,
        discovery,
    }
}

pub fn statuses_query(text: &str, limit: u32) -> SearchQuery {
    SearchQuery {
        interest_id: "interest-1".to_string(),
        group_id: "group-1".to_string(),
        text: text.to_string(),
        limit,
        search_type: SearchType::Statuses,
    }
}

pub fn accounts_query(text: &str, limit: u32) -> SearchQuery {
    SearchQuery {
        search_type: SearchType::Accounts,
        ..statuses_query(text, limit)
    }
}
