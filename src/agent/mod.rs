//! Research Agent
//!
//! Reflect-and-retry loop over a registry of tools:
//! - Planning (decide which tools to call, if any)
//! - Structured Tool Use (JSON schema tools with concurrent execution)
//! - Drafting (answer from the evidence gathered so far)
//! - Reflection (score the draft against that same evidence)
//! - Error Recovery (retry transient provider failures with backoff)
//!
//! ```text
//! Decide -> Act -> Draft -> Critique -> Accept | Retry
//! ```

pub mod generator;
pub mod planner;
pub mod prompts;
pub mod recovery;
pub mod reflection;
pub mod research;
pub mod state;
pub mod tools;

pub use generator::{LlmResponseGenerator, ResponseGenerator};
pub use planner::{Decision, LlmPlanner, PlanContext, Planner, PlannerConfig};
pub use recovery::RetryPolicy;
pub use reflection::{ClaimJudgment, Critic, LlmCritic};
pub use research::{
    ReflectionEntry, ResearchAgent, ResearchOutcome, ResearchRequest, MAX_RESULTS_LIMIT,
};
pub use state::{
    Draft, Evidence, EvidenceItem, FlaggedClaim, Query, ReflectionVerdict, Role, TraceStep, Turn,
};
pub use tools::{
    Tool, ToolCall, ToolFailure, ToolOutput, ToolRegistry, ToolResult, ToolSchema,
};
