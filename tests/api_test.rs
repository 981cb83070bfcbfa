//! REST API Integration Tests
//!
//! Exercises the router in-process with scripted agent components.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{build_agent, fast_config, ScriptedCritic, ScriptedPlanner};
use research_agent::api::{self, AppState};
use research_agent::cache::{ResultCache, ToolCache};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_app(confidences: &[f64]) -> Router {
    let agent = build_agent(
        Arc::new(ScriptedPlanner::no_tools()),
        Arc::new(ScriptedCritic::new(confidences)),
        fast_config(),
    );
    let state = AppState::new(
        Arc::new(agent),
        ToolCache::new(100, 60, true),
        ResultCache::new(100, true),
    );
    api::router(Arc::new(state))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_index_lists_endpoints() {
    let app = test_app(&[0.9]);
    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "research-agent");
    assert_eq!(body["endpoints"]["research"], "POST /research");
}

#[tokio::test]
async fn test_health() {
    let app = test_app(&[0.9]);
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tools"], 4);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_research_then_cached() {
    let app = test_app(&[0.9]);

    let (status, first) = post(&app, "/research", json!({ "query": "what is rust" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["accepted"], true);
    assert_eq!(first["final_answer"], "answer 1");
    assert_eq!(first["cached"], false);
    assert!(first["conversation_id"].as_str().is_some_and(|id| !id.is_empty()));

    let (status, second) = post(&app, "/research", json!({ "query": "what is rust" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["final_answer"], "answer 1");

    let (_, metrics) = get(&app, "/metrics").await;
    assert_eq!(metrics["agent"]["total_requests"], 2);
    assert_eq!(metrics["agent"]["average_attempts"], 1.0);
    assert_eq!(metrics["agent"]["cached_responses"], 1);
    assert_eq!(metrics["caches"]["result_cache"]["hits"], 1);
}

#[tokio::test]
async fn test_unaccepted_outcome_not_cached() {
    let app = test_app(&[0.2]);

    let (_, first) = post(&app, "/research", json!({ "query": "obscure" })).await;
    assert_eq!(first["accepted"], false);
    assert_eq!(first["attempts_used"], 3);

    let (_, second) = post(&app, "/research", json!({ "query": "obscure" })).await;
    assert_eq!(second["cached"], false);
}

#[tokio::test]
async fn test_follow_up_skips_cache() {
    let app = test_app(&[0.9]);
    let body = json!({ "query": "what is rust", "conversation_id": "chat-1" });

    let (_, first) = post(&app, "/research", body.clone()).await;
    assert_eq!(first["conversation_id"], "chat-1");
    assert_eq!(first["cached"], false);

    let (_, second) = post(&app, "/research", body).await;
    assert_eq!(second["cached"], false);
    assert_eq!(second["final_answer"], "answer 2");
}

#[tokio::test]
async fn test_invalid_requests() {
    let app = test_app(&[0.9]);

    let (status, body) = post(&app, "/research", json!({ "query": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");

    let (status, _) = post(&app, "/research", json!({ "query": "q", "max_results": 500 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/research", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_clear() {
    let app = test_app(&[0.9]);
    post(&app, "/research", json!({ "query": "what is rust" })).await;

    let (status, body) = post(&app, "/cache/clear", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (_, again) = post(&app, "/research", json!({ "query": "what is rust" })).await;
    assert_eq!(again["cached"], false);

    let (status, stats) = get(&app, "/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(stats["tool_cache"].is_object());
    assert!(stats["result_cache"].is_object());
}

#[tokio::test]
async fn test_stream_emits_lifecycle_events() {
    let app = test_app(&[0.5, 0.9]);
    let response = app
        .oneshot(
            Request::post("/research/stream")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "query": "what is rust" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should end after the completed event")
    .unwrap();
    let text = String::from_utf8_lossy(&bytes);

    let started = text.find("event: started").unwrap();
    let progress = text.find("event: progress").unwrap();
    let completed = text.find("event: completed").unwrap();
    assert!(started < progress && progress < completed);
    assert!(text.contains("\"step\":\"retry\""));
    assert!(!text.contains("event: error"));
}

#[tokio::test]
async fn test_stream_rejects_invalid_request() {
    let app = test_app(&[0.9]);
    let (status, body) = post(&app, "/research/stream", json!({ "query": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
}
