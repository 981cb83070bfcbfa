//! Research endpoints
//!
//! `POST /research` returns the finished outcome. `POST /research/stream`
//! runs the same request in a background task and streams its trace as
//! Server-Sent Events:
//!
//! ```text
//! started -> progress* -> completed | error
//! ```
//!
//! Dropping the SSE connection cancels the run.

use super::error::ApiError;
use super::state::AppState;
use crate::agent::{ResearchOutcome, ResearchRequest, TraceStep};
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default result count for REST requests
const DEFAULT_MAX_RESULTS: usize = 5;

/// Request body for both research endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl ResearchBody {
    /// Fill defaults; a missing conversation gets a fresh id
    fn into_request(self) -> ResearchRequest {
        ResearchRequest::new(self.query)
            .with_max_results(self.max_results.unwrap_or(DEFAULT_MAX_RESULTS))
            .with_conversation(
                self.conversation_id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            )
    }
}

/// Outcome plus request metadata
#[derive(Debug, Clone, Serialize)]
pub struct ResearchResponse {
    #[serde(flatten)]
    pub outcome: ResearchOutcome,
    pub conversation_id: String,
    pub cached: bool,
    /// ISO 8601
    pub timestamp: String,
}

impl ResearchResponse {
    fn new(outcome: ResearchOutcome, request: &ResearchRequest, cached: bool) -> Self {
        Self {
            outcome,
            conversation_id: request.conversation_id.clone().unwrap_or_default(),
            cached,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// POST /research
pub async fn research(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResearchBody>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let request = body.into_request();
    info!(
        "Research request: conversation={}",
        request.conversation_id.as_deref().unwrap_or("-")
    );

    let cancel = CancellationToken::new();
    // Cancel the run if the client goes away and axum drops this future
    let _guard = cancel.clone().drop_guard();

    let (outcome, cached) = state.research(&request, &cancel, None).await?;
    Ok(Json(ResearchResponse::new(outcome, &request, cached)))
}

type BoxedSseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

fn json_event(name: &str, data: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .data(serde_json::to_string(data).unwrap_or_default())
}

fn progress_event(step: &TraceStep) -> Event {
    json_event("progress", step)
}

/// POST /research/stream
pub async fn research_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResearchBody>,
) -> Response {
    let request = body.into_request();
    if let Err(e) = request.validate() {
        return ApiError(e).into_response();
    }

    let (event_tx, event_rx) = mpsc::channel::<Event>(64);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    tokio::spawn(async move {
        let started = json!({
            "query": request.query,
            "conversation_id": request.conversation_id,
            "max_results": request.max_results,
        });
        if event_tx.send(json_event("started", &started)).await.is_err() {
            return;
        }

        let (trace_tx, mut trace_rx) = mpsc::unbounded_channel::<TraceStep>();
        let run = state.research(&request, &cancel, Some(trace_tx));
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                Some(step) = trace_rx.recv() => {
                    if event_tx.send(progress_event(&step)).await.is_err() {
                        cancel.cancel();
                    }
                }
                result = &mut run => break result,
            }
        };
        while let Ok(step) = trace_rx.try_recv() {
            let _ = event_tx.send(progress_event(&step)).await;
        }

        let last = match result {
            Ok((outcome, cached)) => {
                json_event("completed", &ResearchResponse::new(outcome, &request, cached))
            }
            Err(e) => {
                warn!("Streamed research failed: {}", e);
                let err = ApiError(e);
                json_event(
                    "error",
                    &json!({ "status": err.status().as_u16(), "error": err.body() }),
                )
            }
        };
        let _ = event_tx.send(last).await;
    });

    // The guard travels with the stream; dropping the connection cancels the run
    let stream = ReceiverStream::new(event_rx).map(move |event| {
        let _ = &guard;
        Ok::<_, Infallible>(event)
    });
    let boxed: BoxedSseStream = Box::pin(stream);

    Sse::new(boxed)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("heartbeat"),
        )
        .into_response()
}
