//! Tool Planning
//!
//! The DECIDE step: look at the question, what has been gathered so far and
//! any reviewer feedback, then choose zero or more tool calls.

use crate::agent::prompts;
use crate::agent::state::{Evidence, Query, Turn};
use crate::agent::tools::{extract_json_array, extract_json_object, ToolCall, ToolRegistry};
use crate::error::ProviderError;
use crate::llm::{ChatMessage, LanguageModel};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the DECIDE step
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Go straight to drafting
    NoToolsNeeded,
    /// Run these calls concurrently, then draft
    Invoke(Vec<ToolCall>),
}

impl Decision {
    pub fn from_calls(calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            Self::NoToolsNeeded
        } else {
            Self::Invoke(calls)
        }
    }
}

/// Everything the planner may look at
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub query: &'a Query,
    pub conversation_id: Option<&'a str>,
    pub history: &'a [Turn],
    pub evidence: &'a Evidence,
    /// Reasons from the last rejected draft; empty on the first attempt
    pub feedback: &'a str,
    /// 1-based attempt number
    pub attempt: usize,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn decide(&self, ctx: &PlanContext<'_>) -> Result<Decision, ProviderError>;
}

/// Planner configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Cap on tool calls issued in a single ACT step
    pub max_calls_per_step: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_calls_per_step: 4,
        }
    }
}

/// LLM-backed planner
pub struct LlmPlanner {
    llm: Arc<dyn LanguageModel>,
    tool_lines: Vec<String>,
    /// Tools that take a `conversation_id` argument
    contextual_tools: HashSet<String>,
    config: PlannerConfig,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LanguageModel>, registry: &ToolRegistry) -> Self {
        Self::with_config(llm, registry, PlannerConfig::default())
    }

    pub fn with_config(
        llm: Arc<dyn LanguageModel>,
        registry: &ToolRegistry,
        config: PlannerConfig,
    ) -> Self {
        let schemas = registry.schemas();
        let tool_lines = schemas.iter().map(|s| s.to_prompt_line()).collect();
        let contextual_tools = schemas
            .iter()
            .filter(|s| s.parameters["properties"].get("conversation_id").is_some())
            .map(|s| s.name.clone())
            .collect();

        Self {
            llm,
            tool_lines,
            contextual_tools,
            config,
        }
    }

    /// Fill in request context the model tends to leave out
    fn complete_arguments(&self, call: &mut ToolCall, conversation_id: Option<&str>) {
        if !call.arguments.is_object() {
            return;
        }
        if let Some(id) = conversation_id {
            if self.contextual_tools.contains(&call.name)
                && call.arguments.get("conversation_id").is_none()
            {
                call.arguments["conversation_id"] = Value::String(id.to_string());
            }
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn decide(&self, ctx: &PlanContext<'_>) -> Result<Decision, ProviderError> {
        let system = prompts::planner_system(&self.tool_lines, ctx.query.max_results);
        let request = prompts::planner_request(
            &ctx.query.text,
            ctx.conversation_id,
            ctx.history,
            ctx.evidence,
            ctx.feedback,
        );

        let response = self
            .llm
            .complete(&system, &[ChatMessage::user(request)])
            .await?;

        let Some(mut calls) = parse_tool_calls(&response) else {
            warn!("Planner response unreadable, drafting without tools");
            return Ok(Decision::NoToolsNeeded);
        };

        if calls.len() > self.config.max_calls_per_step {
            debug!(
                "Planner proposed {} calls, keeping {}",
                calls.len(),
                self.config.max_calls_per_step
            );
            calls.truncate(self.config.max_calls_per_step);
        }
        for call in &mut calls {
            self.complete_arguments(call, ctx.conversation_id);
        }

        Ok(Decision::from_calls(calls))
    }
}

/// JSON structure for parsing tool calls
#[derive(Debug, Deserialize)]
struct ToolCallJson {
    name: String,
    #[serde(default, alias = "parameters", alias = "args")]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct PlanJson {
    #[serde(default, alias = "tool_calls")]
    tools: Vec<ToolCallJson>,
}

/// Parse tool calls from a planner response.
///
/// Accepts `{"tools": [...]}`, a bare array of calls, or a single call
/// object. `None` means nothing readable was found.
pub fn parse_tool_calls(response: &str) -> Option<Vec<ToolCall>> {
    let into_calls = |calls: Vec<ToolCallJson>| {
        calls
            .into_iter()
            .map(|c| ToolCall::new(&c.name, c.arguments))
            .collect::<Vec<_>>()
    };

    let object = extract_json_object(response);
    let array = extract_json_array(response);
    let object_first = match (object, array) {
        (Some(o), Some(a)) => response.find(o) <= response.find(a),
        (Some(_), None) => true,
        _ => false,
    };

    if object_first {
        let json = object?;
        if let Ok(plan) = serde_json::from_str::<PlanJson>(json) {
            if plan.tools.is_empty() && serde_json::from_str::<ToolCallJson>(json).is_ok() {
                return serde_json::from_str::<ToolCallJson>(json)
                    .ok()
                    .map(|c| into_calls(vec![c]));
            }
            return Some(into_calls(plan.tools));
        }
    }

    if let Some(json) = array {
        if let Ok(calls) = serde_json::from_str::<Vec<ToolCallJson>>(json) {
            return Some(into_calls(calls));
        }
    }

    None
}
