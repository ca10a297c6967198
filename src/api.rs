// src/api.rs
//! HTTP surface: search-and-add RPC and the queue push endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::discovery::Service;
use crate::model::{SearchQuery, SearchType};
use crate::queue::{consume_interest_events, BatchReport, Envelope, InterestOptions};

#[derive(Clone)]
pub struct AppState {
    pub svc: Arc<dyn Service>,
    pub interests: InterestOptions,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/v1/search-and-add", post(search_and_add))
        .route("/v1/queue/interests", post(queue_interests))
        .route("/v1/queue/live-stream", post(queue_live_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAndAddReq {
    pub sub_id: String,
    pub group_id: String,
    pub q: String,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchAndAddResp {
    pub n: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn search_and_add(
    State(state): State<AppState>,
    Json(req): Json<SearchAndAddReq>,
) -> (StatusCode, Json<SearchAndAddResp>) {
    let q = SearchQuery {
        interest_id: req.sub_id,
        group_id: req.group_id,
        text: req.q,
        limit: req.limit,
        search_type: SearchType::Statuses,
    };
    match state.svc.search_and_add(&q).await.into_result() {
        Ok(n) => (StatusCode::OK, Json(SearchAndAddResp { n, error: None })),
        Err((n, errs)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SearchAndAddResp {
                n,
                error: Some(errs.to_string()),
            }),
        ),
    }
}

async fn queue_interests(
    State(state): State<AppState>,
    Json(evts): Json<Vec<Envelope>>,
) -> Json<BatchReport> {
    let report = consume_interest_events(state.svc.as_ref(), &evts, &state.interests).await;
    Json(report)
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceptedResp {
    pub count: usize,
}

async fn queue_live_stream(
    State(state): State<AppState>,
    Json(evts): Json<Vec<Envelope>>,
) -> Json<AcceptedResp> {
    state.svc.handle_live_stream_events(&evts).await;
    Json(AcceptedResp { count: evts.len() })
}
