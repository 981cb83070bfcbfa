//! Configuration management

use crate::error::ConfigError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Agent loop policy
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Attempt budget for the reflect-retry loop
    pub max_attempts: usize,
    /// Minimum critic confidence to accept a draft
    pub confidence_threshold: f64,
    /// Delay before re-entering DECIDE after a rejected draft
    pub retry_backoff: Duration,
    /// Timeout for a single tool invocation
    pub tool_timeout: Duration,
    /// Timeout for planner, generator and critic calls
    pub provider_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            confidence_threshold: 0.7,
            retry_backoff: Duration::ZERO,
            tool_timeout: Duration::from_secs(45),
            provider_timeout: Duration::from_secs(60),
        }
    }
}

impl AgentConfig {
    /// Reject values the loop cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_attempts",
                value: self.max_attempts,
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "confidence_threshold",
                value: self.confidence_threshold,
            });
        }
        Ok(())
    }
}

/// Chat model settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the OpenAI-compatible endpoint (optional - core calls fail without it)
    pub api_key: Option<String>,
    /// Base URL, e.g. https://api.groq.com/openai/v1
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Web search settings
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Tavily key (optional - DuckDuckGo is used without it)
    pub tavily_api_key: Option<String>,
    pub max_results: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,

    /// Enable tool and result caching
    pub cache_enabled: bool,

    /// Tool cache TTL in seconds
    pub cache_ttl_secs: u64,

    /// Turns kept per conversation
    pub memory_limit: usize,

    /// Conversations held at once; least recently used are evicted
    pub memory_max_conversations: u64,

    pub api_host: IpAddr,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent = AgentConfig {
            max_attempts: env_parse("AGENT_MAX_ATTEMPTS", 3),
            confidence_threshold: env_parse("AGENT_CONFIDENCE_THRESHOLD", 0.7),
            retry_backoff: Duration::from_millis(env_parse("AGENT_RETRY_BACKOFF_MS", 0)),
            tool_timeout: Duration::from_secs(env_parse("TOOL_TIMEOUT_SECS", 45)),
            provider_timeout: Duration::from_secs(env_parse("PROVIDER_TIMEOUT_SECS", 60)),
        };
        agent.validate()?;

        let llm = LlmConfig {
            api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("GROQ_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            model: std::env::var("MODEL_NAME")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            temperature: env_parse("MODEL_TEMPERATURE", 0.1),
            max_tokens: env_parse("MODEL_MAX_TOKENS", 4096),
        };

        let search = SearchConfig {
            tavily_api_key: std::env::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty()),
            max_results: env_parse("SEARCH_MAX_RESULTS", 5),
            timeout: Duration::from_secs(env_parse("SEARCH_TIMEOUT_SECS", 30)),
            user_agent: std::env::var("SEARCH_USER_AGENT")
                .unwrap_or_else(|_| "Research Assistant Bot 1.0".to_string()),
        };

        let cache_enabled = std::env::var("CACHE_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Ok(Self {
            agent,
            llm,
            search,
            cache_enabled,
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", 3600),
            memory_limit: env_parse("MEMORY_LIMIT", 50),
            memory_max_conversations: env_parse("MEMORY_MAX_CONVERSATIONS", 10_000),
            api_host: env_parse("API_HOST", IpAddr::V4(Ipv4Addr::LOCALHOST)),
            api_port: env_parse("API_PORT", 8000),
        })
    }

    /// REST API bind address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.api_host, self.api_port)
    }
}

/// Read and parse an env var, falling back to `default` when unset or invalid
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
