// tests/api_http.rs
mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use common::{harness, status_fixture, MockPlatform, MockService};
use fedi_ingest::api::{router, AppState};
use fedi_ingest::discovery::{SearchError, SearchErrors, SearchOutcome, Service};
use fedi_ingest::model::SearchType;
use fedi_ingest::queue::InterestOptions;

fn app(svc: Arc<dyn Service>) -> Router {
    router(AppState {
        svc,
        interests: InterestOptions {
            activitypub_host: "bridge.example".to_string(),
            search_limit: 10,
        },
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let app = app(Arc::new(MockService::default()));
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn search_and_add_runs_a_statuses_search() {
    let svc = Arc::new(MockService::with_outcome(SearchOutcome {
        accepted: 4,
        ..Default::default()
    }));
    let resp = app(svc.clone())
        .oneshot(post_json(
            "/v1/search-and-add",
            json!({"subId": "sub-1", "groupId": "g1", "q": "rust", "limit": 7}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"n": 4}));

    let qs = svc.queries();
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0].interest_id, "sub-1");
    assert_eq!(qs[0].group_id, "g1");
    assert_eq!(qs[0].text, "rust");
    assert_eq!(qs[0].limit, 7);
    assert_eq!(qs[0].search_type, SearchType::Statuses);
}

#[tokio::test]
async fn partial_failure_returns_count_and_error() {
    let svc = Arc::new(MockService::with_outcome(SearchOutcome {
        accepted: 2,
        errors: SearchErrors(vec![SearchError::MissingAccountId {
            host: "a.social".to_string(),
            addr: "x".to_string(),
        }]),
    }));
    let resp = app(svc)
        .oneshot(post_json(
            "/v1/search-and-add",
            json!({"subId": "s", "groupId": "g", "q": "q", "limit": 5}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert_eq!(body["n"], 2);
    assert!(body["error"].as_str().unwrap().contains("a.social"));
}

#[tokio::test]
async fn malformed_search_request_is_rejected() {
    let svc = Arc::new(MockService::default());
    let resp = app(svc.clone())
        .oneshot(post_json("/v1/search-and-add", json!({"q": "rust"})))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
    assert!(svc.queries().is_empty());
}

#[tokio::test]
async fn interests_push_reports_the_batch() {
    let svc = Arc::new(MockService::with_outcome(SearchOutcome {
        accepted: 1,
        ..Default::default()
    }));
    let batch = json!([
        {
            "id": "1",
            "type": "interests.created",
            "attributes": {
                "awakarigroupid": {"string": "g1"},
                "queriescompl": {"string": "rust\nfediverse"}
            },
            "text_data": "interest-1"
        },
        {
            "id": "2",
            "type": "interests.created",
            "attributes": {},
            "text_data": "orphan"
        }
    ]);
    let resp = app(svc.clone())
        .oneshot(post_json("/v1/queue/interests", batch))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        json_body(resp).await,
        json!({"processed": 1, "skipped": 1, "accepted": 2})
    );
    assert_eq!(svc.queries().len(), 2);
}

#[tokio::test]
async fn live_stream_push_reaches_the_pipeline() {
    let h = harness(MockPlatform::new(), &["a.social"]);
    let writer = h.writer.clone();
    let svc: Arc<dyn Service> = Arc::new(h.discovery);

    let st = status_fixture("alice");
    let batch = json!([{
        "id": "e1",
        "type": "update",
        "text_data": serde_json::to_string(&st).unwrap()
    }]);
    let resp = app(svc)
        .oneshot(post_json("/v1/queue/live-stream", batch))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"count": 1}));
    assert_eq!(writer.writes().len(), 1);
}
