// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod config;
pub mod discovery;
pub mod event;
pub mod follow;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod platform;
pub mod policy;
pub mod queue;
pub mod writer;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::Config;
pub use crate::discovery::{supervise_live_stream, Discovery, Service};
pub use crate::logging::Logging;
