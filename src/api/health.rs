//! Service, health, metrics and cache endpoints

use super::state::AppState;
use crate::cache::CacheStats;
use crate::metrics::StatsSnapshot;
use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// GET /
pub async fn index(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": "research-agent",
        "version": state.version,
        "endpoints": {
            "research": "POST /research",
            "research_stream": "POST /research/stream",
            "health": "GET /health",
            "metrics": "GET /metrics",
            "cache_stats": "GET /cache/stats",
            "cache_clear": "POST /cache/clear",
        },
    }))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// ISO 8601
    pub timestamp: String,
    pub tools: usize,
    pub tool_cache_hit_rate: f64,
    pub result_cache_hit_rate: f64,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: state.version,
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        tools: state.agent.tools().len(),
        tool_cache_hit_rate: state.tool_cache.stats().hit_rate_percent,
        result_cache_hit_rate: state.result_cache.stats().hit_rate_percent,
    })
}

/// Both caches
#[derive(Debug, Serialize)]
pub struct CacheReport {
    pub tool_cache: CacheStats,
    pub result_cache: CacheStats,
}

impl CacheReport {
    fn collect(state: &AppState) -> Self {
        Self {
            tool_cache: state.tool_cache.stats(),
            result_cache: state.result_cache.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub agent: StatsSnapshot,
    pub caches: CacheReport,
    pub conversations: usize,
    pub tools: Vec<String>,
    pub uptime_secs: u64,
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        agent: state.agent.stats().snapshot(),
        caches: CacheReport::collect(&state),
        conversations: state.agent.memory().conversation_count(),
        tools: state.agent.tools().list().into_iter().map(String::from).collect(),
        uptime_secs: state.uptime_secs(),
    })
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheReport> {
    Json(CacheReport::collect(&state))
}

/// POST /cache/clear
pub async fn cache_clear(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.tool_cache.clear();
    state.result_cache.clear();
    info!("Caches cleared");
    Json(json!({ "cleared": true }))
}
