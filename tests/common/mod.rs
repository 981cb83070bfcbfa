//! Scripted planner, generator and critic for driving the agent without
//! any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use research_agent::agent::{
    Critic, Decision, Evidence, EvidenceItem, FlaggedClaim, PlanContext, Planner, Query,
    ReflectionVerdict, ResearchAgent, ResponseGenerator, Tool, ToolCall, ToolFailure, ToolOutput,
    ToolRegistry, ToolSchema, Turn,
};
use research_agent::config::AgentConfig;
use research_agent::error::ProviderError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Plays back one decision per attempt, repeating the last
pub struct ScriptedPlanner {
    decisions: Vec<Decision>,
    calls: AtomicUsize,
    feedback: Mutex<Vec<String>>,
    history_lens: Mutex<Vec<usize>>,
}

impl ScriptedPlanner {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions,
            calls: AtomicUsize::new(0),
            feedback: Mutex::new(Vec::new()),
            history_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn no_tools() -> Self {
        Self::new(vec![Decision::NoToolsNeeded])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn feedback_seen(&self) -> Vec<String> {
        self.feedback.lock().clone()
    }

    pub fn history_seen(&self) -> Vec<usize> {
        self.history_lens.lock().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn decide(&self, ctx: &PlanContext<'_>) -> Result<Decision, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.feedback.lock().push(ctx.feedback.to_string());
        self.history_lens.lock().push(ctx.history.len());
        Ok(self
            .decisions
            .get(n)
            .or_else(|| self.decisions.last())
            .cloned()
            .unwrap_or(Decision::NoToolsNeeded))
    }
}

/// Answers "answer N" for the N-th draft
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl ResponseGenerator for CountingGenerator {
    async fn generate(
        &self,
        _query: &Query,
        _history: &[Turn],
        _evidence: &Evidence,
        _feedback: &str,
    ) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("answer {}", n))
    }
}

/// Always fails with a provider status error
pub struct FailingGenerator;

#[async_trait]
impl ResponseGenerator for FailingGenerator {
    async fn generate(
        &self,
        _query: &Query,
        _history: &[Turn],
        _evidence: &Evidence,
        _feedback: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Status {
            provider: "llm".to_string(),
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

/// Scores drafts from a fixed list, repeating the last.
///
/// Scores below 0.7 carry one flagged claim.
pub struct ScriptedCritic {
    confidences: Vec<f64>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    last_evidence: Mutex<Option<Evidence>>,
}

impl ScriptedCritic {
    pub fn new(confidences: &[f64]) -> Self {
        Self {
            confidences: confidences.to_vec(),
            calls: AtomicUsize::new(0),
            delay: None,
            last_evidence: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_evidence(&self) -> Option<Evidence> {
        self.last_evidence.lock().clone()
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn critique(
        &self,
        _draft: &str,
        evidence: &Evidence,
    ) -> Result<ReflectionVerdict, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_evidence.lock() = Some(evidence.clone());

        let confidence = self
            .confidences
            .get(n)
            .or_else(|| self.confidences.last())
            .copied()
            .unwrap_or(1.0);
        let flagged = if confidence < 0.7 {
            vec![FlaggedClaim {
                claim: format!("claim from draft {}", n + 1),
                reason: "no supporting source".to_string(),
            }]
        } else {
            vec![]
        };
        Ok(ReflectionVerdict::new(confidence, flagged, evidence))
    }
}

/// `lookup {id, relevance}` returns one evidence item. `broken` fails,
/// `panics` panics and `slow` sleeps for ten seconds.
pub fn test_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_timeout(Duration::from_secs(5));

    registry.register(Tool::new(
        ToolSchema::new("lookup", "Return one evidence item")
            .with_string_param("id", "Source id", true),
        |args: Value| async move {
            let id = args["id"].as_str().unwrap_or_default().to_string();
            let relevance = args["relevance"].as_f64().unwrap_or(0.5);
            Ok(ToolOutput::new(
                json!({ "id": id }),
                vec![EvidenceItem::new(id.clone(), format!("facts from {}", id), relevance)],
            ))
        },
    ));

    registry.register(Tool::new(
        ToolSchema::new("broken", "Always fails"),
        |_args: Value| async move { Err(ToolFailure::Execution("backend down".to_string())) },
    ));

    registry.register(Tool::new(
        ToolSchema::new("panics", "Always panics"),
        |_args: Value| async move {
            if true {
                panic!("boom");
            }
            Ok(ToolOutput::content_only(Value::Null))
        },
    ));

    registry.register(Tool::new(
        ToolSchema::new("slow", "Sleeps for a long time"),
        |_args: Value| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolOutput::content_only(Value::Null))
        },
    ));

    registry
}

pub fn lookup(id: &str, relevance: f64) -> ToolCall {
    ToolCall::new("lookup", json!({ "id": id, "relevance": relevance }))
}

pub fn fast_config() -> AgentConfig {
    AgentConfig {
        provider_timeout: Duration::from_secs(5),
        ..AgentConfig::default()
    }
}

pub fn build_agent(
    planner: Arc<ScriptedPlanner>,
    critic: Arc<ScriptedCritic>,
    config: AgentConfig,
) -> ResearchAgent {
    ResearchAgent::new(
        planner,
        Arc::new(CountingGenerator::default()),
        critic,
        Arc::new(test_registry()),
        config,
    )
    .unwrap()
}
