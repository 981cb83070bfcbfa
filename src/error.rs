//! Error Types
//!
//! Only a few errors ever cross the agent loop boundary. Tool failures and
//! low-confidence drafts are folded into the returned outcome instead.

use thiserror::Error;

/// Errors raised by an LLM or search backend
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} transport error: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned an unreadable response: {reason}")]
    Malformed { provider: String, reason: String },
}

impl ProviderError {
    /// Name of the backend that failed
    pub fn provider(&self) -> &str {
        match self {
            Self::NotConfigured { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Status { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Malformed { provider, .. } => provider,
        }
    }

    /// Whether the transport layer may try the same call again
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            Self::NotConfigured { .. } | Self::Malformed { .. } => false,
        }
    }
}

/// Dispatch to a tool name the registry does not know
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

/// Request-level failures returned by the research agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[from] ProviderError),

    #[error(transparent)]
    UnknownTool(#[from] UnknownTool),

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1, got {value}")]
    NonPositive { name: &'static str, value: usize },

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let rate_limited = ProviderError::Status {
            provider: "llm".into(),
            status: 429,
            body: String::new(),
        };
        let bad_request = ProviderError::Status {
            provider: "llm".into(),
            status: 400,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        assert!(!bad_request.is_transient());
        assert!(ProviderError::Timeout { provider: "llm".into(), secs: 5 }.is_transient());
    }

    #[test]
    fn test_unknown_tool_converts() {
        let err: AgentError = UnknownTool("teleport".into()).into();
        assert!(matches!(err, AgentError::UnknownTool(ref u) if u.0 == "teleport"));
        assert_eq!(err.to_string(), "unknown tool: teleport");
    }
}
