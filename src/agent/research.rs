//! Research Agent Loop
//!
//! Explicit state machine driven by a plain loop:
//!
//! ```text
//! DECIDE -> ACT(tools) -> DRAFT -> CRITIQUE -> ACCEPT | RETRY -> DECIDE | DONE
//! ```
//!
//! A draft is accepted once its confidence reaches the threshold. Otherwise
//! the loop goes back to DECIDE with the critic's reasons as feedback until
//! the attempt budget runs out, then returns the best draft seen. Tool
//! failures never end a request; planner, generator and critic failures do.

use crate::agent::generator::ResponseGenerator;
use crate::agent::planner::{Decision, PlanContext, Planner};
use crate::agent::reflection::Critic;
use crate::agent::state::{Draft, Evidence, FlaggedClaim, Query, ReflectionVerdict, TraceStep, Turn};
use crate::agent::tools::{ToolCall, ToolRegistry};
use crate::config::AgentConfig;
use crate::conversation::ConversationMemory;
use crate::error::{AgentError, ConfigError, ProviderError};
use crate::metrics::{AgentStats, LatencyTimer};
use crate::search::truncate_chars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Largest accepted result-count hint
pub const MAX_RESULTS_LIMIT: usize = 50;

/// A research request as received at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    pub query: String,
    pub max_results: usize,
    pub conversation_id: Option<String>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: 5,
            conversation_id: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Reject empty queries and out-of-range result counts
    pub fn validate(&self) -> Result<Query, AgentError> {
        let text = self.query.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidRequest("query cannot be empty".to_string()));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(AgentError::InvalidRequest(format!(
                "max_results must be between 1 and {}, got {}",
                MAX_RESULTS_LIMIT, self.max_results
            )));
        }
        if self.conversation_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(AgentError::InvalidRequest(
                "conversation_id cannot be blank".to_string(),
            ));
        }
        Ok(Query::new(text, self.max_results))
    }
}

/// One critique, as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionEntry {
    pub attempt: usize,
    pub confidence: f64,
    pub flagged_claims: Vec<FlaggedClaim>,
}

/// Terminal result of one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub final_answer: String,
    pub accepted: bool,
    /// Confidence of the returned draft
    pub confidence: f64,
    pub attempts_used: usize,
    /// Every critique in attempt order
    pub reflection_log: Vec<ReflectionEntry>,
    /// Source ids of the evidence behind the returned draft
    pub sources: Vec<String>,
    /// Distinct tools invoked, in first-use order
    pub tools_used: Vec<String>,
    pub trace: Vec<TraceStep>,
}

enum Phase {
    Decide,
    Act(Vec<ToolCall>),
    Draft,
    Critique(Draft),
    Done(Box<Finished>),
}

struct Finished {
    draft: Draft,
    verdict: ReflectionVerdict,
    accepted: bool,
}

/// Mutable loop bookkeeping; lives for one request
struct LoopState {
    attempt: usize,
    feedback: String,
    best: Option<(Draft, ReflectionVerdict)>,
    log: Vec<ReflectionEntry>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            attempt: 0,
            feedback: String::new(),
            best: None,
            log: Vec::new(),
        }
    }

    /// Log a critique and keep the best draft. Only a strictly higher
    /// confidence replaces the incumbent, so ties stay with the earlier attempt.
    fn record(&mut self, draft: Draft, verdict: ReflectionVerdict) -> &(Draft, ReflectionVerdict) {
        self.log.push(ReflectionEntry {
            attempt: draft.attempt,
            confidence: verdict.confidence,
            flagged_claims: verdict.flagged_claims.clone(),
        });

        let replace = self
            .best
            .as_ref()
            .map_or(true, |(_, best)| verdict.confidence > best.confidence);
        if replace {
            self.best = None;
        }
        self.best.get_or_insert((draft, verdict))
    }
}

/// Execution trace, mirrored to an optional progress listener
struct Trace {
    steps: Vec<TraceStep>,
    progress: Option<mpsc::UnboundedSender<TraceStep>>,
}

impl Trace {
    fn new(progress: Option<mpsc::UnboundedSender<TraceStep>>) -> Self {
        Self {
            steps: Vec::new(),
            progress,
        }
    }

    fn log(&mut self, step: &str, details: Value) {
        if details.is_null() {
            info!("[TRACE] {}", step);
        } else {
            info!("[TRACE] {}: {}", step, details);
        }
        let entry = TraceStep::new(step, details);
        if let Some(tx) = &self.progress {
            // Listener may be gone; the trace is still returned in full
            let _ = tx.send(entry.clone());
        }
        self.steps.push(entry);
    }
}

/// Reflect-and-retry research agent
pub struct ResearchAgent {
    planner: Arc<dyn Planner>,
    generator: Arc<dyn ResponseGenerator>,
    critic: Arc<dyn Critic>,
    tools: Arc<ToolRegistry>,
    memory: Arc<ConversationMemory>,
    stats: Arc<AgentStats>,
    config: AgentConfig,
}

impl ResearchAgent {
    /// Fails when `config` cannot be honoured, e.g. a zero attempt budget
    pub fn new(
        planner: Arc<dyn Planner>,
        generator: Arc<dyn ResponseGenerator>,
        critic: Arc<dyn Critic>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            planner,
            generator,
            critic,
            tools,
            memory: Arc::new(ConversationMemory::default()),
            stats: Arc::new(AgentStats::default()),
            config,
        })
    }

    pub fn with_memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_stats(mut self, stats: Arc<AgentStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<AgentStats> {
        &self.stats
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one request to completion
    pub async fn run(
        &self,
        query: &str,
        max_results: usize,
        conversation_id: Option<&str>,
    ) -> Result<ResearchOutcome, AgentError> {
        let mut request = ResearchRequest::new(query).with_max_results(max_results);
        request.conversation_id = conversation_id.map(String::from);
        self.run_with(&request, &CancellationToken::new(), None).await
    }

    /// Run with cancellation and an optional live trace listener
    pub async fn run_with(
        &self,
        request: &ResearchRequest,
        cancel: &CancellationToken,
        progress: Option<mpsc::UnboundedSender<TraceStep>>,
    ) -> Result<ResearchOutcome, AgentError> {
        let query = request.validate()?;
        let timer = LatencyTimer::new("research");
        let mut trace = Trace::new(progress);
        let mut state = LoopState::new();

        let result = self
            .drive(&query, request.conversation_id.as_deref(), cancel, &mut trace, &mut state)
            .await;

        match &result {
            Ok(outcome) => self.stats.record_completed(
                outcome.attempts_used,
                outcome.confidence,
                outcome.accepted,
                timer.finish(),
            ),
            Err(e) => {
                trace.log("workflow_error", json!({ "error": e.to_string() }));
                self.stats.record_failed(state.attempt, timer.finish());
            }
        }
        result
    }

    async fn drive(
        &self,
        query: &Query,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
        trace: &mut Trace,
        state: &mut LoopState,
    ) -> Result<ResearchOutcome, AgentError> {
        let history: Vec<Turn> = conversation_id
            .map(|id| self.memory.turns(id))
            .unwrap_or_default();
        let mut evidence = Evidence::new();
        let mut tools_used: Vec<String> = Vec::new();

        trace.log(
            "workflow_start",
            json!({
                "query": truncate_chars(&query.text, 100),
                "max_results": query.max_results,
                "max_attempts": self.config.max_attempts,
                "history_turns": history.len(),
            }),
        );

        let mut phase = Phase::Decide;
        let finished = loop {
            if !matches!(phase, Phase::Done(_)) && cancel.is_cancelled() {
                trace.log("cancelled", json!({ "attempt": state.attempt }));
                return Err(AgentError::Cancelled);
            }

            phase = match phase {
                Phase::Decide => {
                    state.attempt += 1;
                    let ctx = PlanContext {
                        query,
                        conversation_id,
                        history: &history,
                        evidence: &evidence,
                        feedback: &state.feedback,
                        attempt: state.attempt,
                    };
                    let decision = self
                        .call_provider(cancel, "planner", self.planner.decide(&ctx))
                        .await?;

                    match decision {
                        Decision::NoToolsNeeded => {
                            trace.log("no_tools_needed", json!({ "attempt": state.attempt }));
                            Phase::Draft
                        }
                        Decision::Invoke(calls) => {
                            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                            trace.log(
                                "tools_selected",
                                json!({ "attempt": state.attempt, "tools": names }),
                            );
                            Phase::Act(calls)
                        }
                    }
                }

                Phase::Act(calls) => {
                    let results = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            trace.log("cancelled", json!({ "attempt": state.attempt }));
                            return Err(AgentError::Cancelled);
                        }
                        results = self.tools.invoke_all(&calls) => results?,
                    };

                    let mut merged = 0;
                    for result in &results {
                        if !tools_used.contains(&result.tool_name) {
                            tools_used.push(result.tool_name.clone());
                        }
                        match &result.outcome {
                            Ok(output) => merged += evidence.merge_all(output.evidence.iter().cloned()),
                            Err(failure) => trace.log(
                                "tool_failed",
                                json!({
                                    "tool": result.tool_name,
                                    "error": failure,
                                    "duration_ms": result.duration_ms,
                                }),
                            ),
                        }
                    }
                    info!(
                        "Attempt {}: {} tool result(s), {} evidence change(s), {} source(s) total",
                        state.attempt,
                        results.len(),
                        merged,
                        evidence.len()
                    );
                    Phase::Draft
                }

                Phase::Draft => {
                    let text = self
                        .call_provider(
                            cancel,
                            "generator",
                            self.generator
                                .generate(query, &history, &evidence, &state.feedback),
                        )
                        .await?;
                    trace.log(
                        "draft_generated",
                        json!({
                            "attempt": state.attempt,
                            "chars": text.chars().count(),
                            "evidence": evidence.len(),
                        }),
                    );
                    Phase::Critique(Draft {
                        attempt: state.attempt,
                        text,
                        evidence: evidence.clone(),
                    })
                }

                Phase::Critique(draft) => {
                    let verdict = self
                        .call_provider(
                            cancel,
                            "critic",
                            self.critic.critique(&draft.text, &draft.evidence),
                        )
                        .await?;
                    if !verdict.applies_to(&draft.evidence) {
                        return Err(ProviderError::Malformed {
                            provider: "critic".to_string(),
                            reason: "verdict computed against different evidence".to_string(),
                        }
                        .into());
                    }

                    let confidence = verdict.confidence;
                    let feedback = retry_feedback(&verdict);
                    trace.log(
                        "critique",
                        json!({
                            "attempt": state.attempt,
                            "confidence": confidence,
                            "flagged_claims": verdict.flagged_claims.len(),
                        }),
                    );

                    let terminal = if confidence >= self.config.confidence_threshold {
                        Some(true)
                    } else if state.attempt >= self.config.max_attempts {
                        Some(false)
                    } else {
                        None
                    };

                    let attempt = state.attempt;
                    let best = state.record(draft, verdict);
                    match terminal {
                        Some(accepted) => {
                            let (draft, verdict) = best.clone();
                            trace.log(
                                if accepted { "accepted" } else { "exhausted" },
                                json!({
                                    "attempt": attempt,
                                    "best_attempt": draft.attempt,
                                    "confidence": verdict.confidence,
                                }),
                            );
                            Phase::Done(Box::new(Finished {
                                draft,
                                verdict,
                                accepted,
                            }))
                        }
                        None => {
                            trace.log(
                                "retry",
                                json!({
                                    "attempt": attempt,
                                    "confidence": confidence,
                                    "threshold": self.config.confidence_threshold,
                                }),
                            );
                            state.feedback = feedback;
                            self.backoff(cancel).await?;
                            Phase::Decide
                        }
                    }
                }

                Phase::Done(finished) => break *finished,
            };
        };

        let Finished {
            draft,
            verdict,
            accepted,
        } = finished;

        if let Some(id) = conversation_id {
            self.memory.add_exchange(id, &query.text, &draft.text);
        }

        trace.log(
            "workflow_complete",
            json!({
                "accepted": accepted,
                "attempts_used": state.attempt,
                "confidence": verdict.confidence,
            }),
        );

        Ok(ResearchOutcome {
            sources: draft.evidence.source_ids(),
            final_answer: draft.text,
            accepted,
            confidence: verdict.confidence,
            attempts_used: state.attempt,
            reflection_log: std::mem::take(&mut state.log),
            tools_used,
            trace: std::mem::take(&mut trace.steps),
        })
    }

    /// Race a provider call against its timeout and cancellation
    async fn call_provider<T>(
        &self,
        cancel: &CancellationToken,
        stage: &str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, AgentError> {
        let timeout = self.config.provider_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(inner) => inner.map_err(|e| {
                    warn!("{} failed: {}", stage, e);
                    AgentError::from(e)
                }),
                Err(_) => {
                    warn!("{} timed out after {:?}", stage, timeout);
                    Err(ProviderError::Timeout {
                        provider: stage.to_string(),
                        secs: timeout.as_secs(),
                    }
                    .into())
                }
            },
        }
    }

    async fn backoff(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        if self.config.retry_backoff.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep(self.config.retry_backoff) => Ok(()),
        }
    }
}

/// Feedback for the next attempt: the flagged reasons, or a generic nudge
/// when the critic scored low without naming claims
fn retry_feedback(verdict: &ReflectionVerdict) -> String {
    if verdict.flagged_claims.is_empty() {
        format!(
            "The previous answer scored {:.2} for evidential support. Tie every statement to the evidence.",
            verdict.confidence
        )
    } else {
        verdict.feedback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(attempt: usize) -> Draft {
        Draft {
            attempt,
            text: format!("draft {}", attempt),
            evidence: Evidence::new(),
        }
    }

    fn verdict(confidence: f64) -> ReflectionVerdict {
        ReflectionVerdict::new(confidence, vec![], &Evidence::new())
    }

    #[test]
    fn test_best_so_far_prefers_earliest_on_tie() {
        let mut state = LoopState::new();
        state.record(draft(1), verdict(0.5));
        state.record(draft(2), verdict(0.5));
        let (best, _) = state.record(draft(3), verdict(0.4));
        assert_eq!(best.attempt, 1);
        assert_eq!(state.log.len(), 3);
    }

    #[test]
    fn test_best_so_far_takes_strictly_higher() {
        let mut state = LoopState::new();
        state.record(draft(1), verdict(0.4));
        let (best, v) = state.record(draft(2), verdict(0.6));
        assert_eq!(best.attempt, 2);
        assert!((v.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_request_validation() {
        assert!(ResearchRequest::new("  ").validate().is_err());
        assert!(ResearchRequest::new("q").with_max_results(0).validate().is_err());
        assert!(ResearchRequest::new("q")
            .with_max_results(MAX_RESULTS_LIMIT + 1)
            .validate()
            .is_err());
        assert!(ResearchRequest::new("q").with_conversation(" ").validate().is_err());

        let query = ResearchRequest::new("  what is rust?  ").validate().unwrap();
        assert_eq!(query.text, "what is rust?");
        assert_eq!(query.max_results, 5);
    }

    #[test]
    fn test_retry_feedback_falls_back_to_nudge() {
        let generic = retry_feedback(&verdict(0.3));
        assert!(generic.contains("0.30"));

        let specific = retry_feedback(&ReflectionVerdict::new(
            0.3,
            vec![FlaggedClaim {
                claim: "c".into(),
                reason: "r".into(),
            }],
            &Evidence::new(),
        ));
        assert_eq!(specific, "- \"c\": r");
    }
}
