//! Shared application state
//!
//! Wires providers, tools and the agent together from [`Config`] and fronts
//! the agent with the research-result cache. Both the REST handlers and the
//! one-shot CLI go through [`AppState::research`].

use crate::agent::{
    LlmCritic, LlmPlanner, LlmResponseGenerator, ResearchAgent, ResearchOutcome, ResearchRequest,
    TraceStep, ToolRegistry,
};
use crate::cache::{ResultCache, ToolCache};
use crate::config::Config;
use crate::conversation::{ConversationMemory, CONVERSATION_IDLE};
use crate::error::AgentError;
use crate::llm::{ChatClient, LanguageModel};
use crate::metrics::AgentStats;
use crate::search::WebSearch;
use crate::tools::{register_builtin, ToolContext};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TOOL_CACHE_ENTRIES: u64 = 200;
const RESULT_CACHE_ENTRIES: u64 = 500;

/// Application state shared across handlers
pub struct AppState {
    pub agent: Arc<ResearchAgent>,
    pub tool_cache: ToolCache,
    pub result_cache: ResultCache,
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(agent: Arc<ResearchAgent>, tool_cache: ToolCache, result_cache: ResultCache) -> Self {
        Self {
            agent,
            tool_cache,
            result_cache,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Build the full stack: chat client, web search, built-in tools, agent
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm = ChatClient::new(config.llm.clone(), config.agent.provider_timeout)?;
        if !llm.is_available() {
            warn!("No LLM API key configured; research requests will fail until LLM_API_KEY is set");
        }
        info!("LLM model: {}", llm.model());
        let llm: Arc<dyn LanguageModel> = Arc::new(llm);

        let tool_cache = ToolCache::new(TOOL_CACHE_ENTRIES, config.cache_ttl_secs, config.cache_enabled);
        let result_cache = ResultCache::new(RESULT_CACHE_ENTRIES, config.cache_enabled);
        let memory = Arc::new(ConversationMemory::bounded(
            config.memory_limit,
            config.memory_max_conversations,
            CONVERSATION_IDLE,
        ));

        let ctx = ToolContext {
            web: WebSearch::from_config(&config.search)?,
            llm: llm.clone(),
            memory: memory.clone(),
        };
        let mut registry = ToolRegistry::new()
            .with_cache(tool_cache.clone())
            .with_timeout(config.agent.tool_timeout);
        register_builtin(&mut registry, &ctx);

        let agent = ResearchAgent::new(
            Arc::new(LlmPlanner::new(llm.clone(), &registry)),
            Arc::new(LlmResponseGenerator::new(llm.clone())),
            Arc::new(LlmCritic::new(llm)),
            Arc::new(registry),
            config.agent.clone(),
        )?
        .with_memory(memory)
        .with_stats(Arc::new(AgentStats::default()));

        Ok(Self::new(Arc::new(agent), tool_cache, result_cache))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Answer a request, serving identical recent questions from the result
    /// cache. Follow-ups in a conversation with history always run the agent.
    /// Returns the outcome and whether it came from the cache.
    pub async fn research(
        &self,
        request: &ResearchRequest,
        cancel: &CancellationToken,
        progress: Option<mpsc::UnboundedSender<TraceStep>>,
    ) -> Result<(ResearchOutcome, bool), AgentError> {
        let query = request.validate()?;
        let memory = self.agent.memory();
        let has_history = request
            .conversation_id
            .as_deref()
            .is_some_and(|id| !memory.turns(id).is_empty());

        let key = ResultCache::compute_key(&query.text, query.max_results);
        if !has_history {
            if let Some(outcome) = self.result_cache.get(&key).await {
                debug!("Serving cached result for: {}", query.text);
                if let Some(id) = &request.conversation_id {
                    memory.add_exchange(id, &query.text, &outcome.final_answer);
                }
                self.agent.stats().record_cached();
                return Ok((outcome, true));
            }
        }

        let outcome = self.agent.run_with(request, cancel, progress).await?;
        if outcome.accepted && !has_history {
            self.result_cache.set(&key, outcome.clone()).await;
        }
        Ok((outcome, false))
    }
}
