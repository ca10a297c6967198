// src/platform/sse.rs
//! Server-sent events parser for the streaming API.
//!
//! Turns a raw `reqwest` byte stream into `StreamEvent`s. Lines may be split across
//! chunks (including inside a UTF-8 sequence); an event is dispatched on a blank line.
//! Comment lines (`:thump` heartbeats) are skipped.
//!
//! A pending line or a pending event larger than `LIMIT_RESP_BODY_LEN` ends the stream
//! with `PlatformError::TooLarge`.

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::{PlatformError, LIMIT_RESP_BODY_LEN};

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEvent {
    /// `event:` field (`update`, `delete`, ...). Empty when the server sent none.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug)]
struct Parser {
    buf: Vec<u8>,
    event: String,
    data: Vec<String>,
    /// Bytes held in `data`, separators included.
    data_len: usize,
    has_fields: bool,
    limit: usize,
}

impl Parser {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            event: String::new(),
            data: Vec::new(),
            data_len: 0,
            has_fields: false,
            limit,
        }
    }

    fn exceeded(&self) -> bool {
        self.buf.len() > self.limit || self.data_len > self.limit
    }

    fn clear(&mut self) {
        *self = Self::new(self.limit);
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete event already in the buffer.
    fn next_event(&mut self) -> Option<StreamEvent> {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(ev) = self.feed_line(line) {
                return Some(ev);
            }
            if self.data_len > self.limit {
                return None;
            }
        }
        None
    }

    fn feed_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event = value.to_string();
                self.has_fields = true;
            }
            "data" => {
                self.data_len += value.len() + 1;
                self.data.push(value.to_string());
                self.has_fields = true;
            }
            // id / retry are not used
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        if !self.has_fields {
            return None;
        }
        self.has_fields = false;
        self.data_len = 0;
        Some(StreamEvent {
            event: std::mem::take(&mut self.event),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Stream adapter over the firehose response body.
pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: Parser,
    url: String,
    done: bool,
}

impl SseStream {
    pub fn new(
        url: impl Into<String>,
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: Parser::new(LIMIT_RESP_BODY_LEN),
            url: url.into(),
            done: false,
        }
    }
}

impl Stream for SseStream {
    type Item = Result<StreamEvent, PlatformError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(ev) = this.parser.next_event() {
                return Poll::Ready(Some(Ok(ev)));
            }
            if this.parser.exceeded() {
                this.done = true;
                this.parser.clear();
                return Poll::Ready(Some(Err(PlatformError::TooLarge {
                    url: this.url.clone(),
                    limit: LIMIT_RESP_BODY_LEN,
                })));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.parser.push(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(PlatformError::Network {
                        url: this.url.clone(),
                        message: e.to_string(),
                    })));
                }
                Poll::Ready(None) => {
                    // A trailing event without the final blank line still counts.
                    this.done = true;
                    this.parser.push(b"\n\n");
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
