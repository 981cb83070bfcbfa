//! Research Agent
//!
//! Reflective research assistant: plans tool calls, gathers evidence,
//! drafts an answer, critiques it and retries with feedback until the
//! draft is confident enough or the attempt budget runs out.
//!
//! # Features
//!
//! - **Reflect-retry loop**: DECIDE -> ACT -> DRAFT -> CRITIQUE -> ACCEPT | RETRY
//! - **Tool registry**: 17 built-in tools with per-call timeouts and isolated failures
//! - **Caching**: Moka caches for tool outputs and accepted research results
//! - **Conversation memory**: bounded per-conversation history
//! - **REST API**: Axum endpoints with Server-Sent Events progress streaming
//! - **Metrics**: attempt counts, confidence histogram and latency percentiles
//!
//! # Architecture
//!
//! ```text
//! CLI / REST ──► AppState ──► ResearchAgent ──► Planner   (LLM)
//!                  │              │          ├─► Generator (LLM)
//!                  │              │          └─► Critic    (LLM)
//!                  │              └──► ToolRegistry ──► search, fetch, summarize,
//!                  │                                    extract, fact-check, cite
//!                  ├── ResultCache (Moka)
//!                  └── ToolCache   (Moka)
//! ```

pub mod agent;
pub mod api;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod search;
pub mod tools;

pub use agent::{ResearchAgent, ResearchOutcome, ResearchRequest, ToolRegistry};
pub use api::AppState;
pub use cache::{ResultCache, ToolCache};
pub use config::Config;
pub use conversation::ConversationMemory;
pub use error::{AgentError, ProviderError};
pub use llm::{ChatClient, LanguageModel};
pub use metrics::AgentStats;
pub use search::WebSearch;
