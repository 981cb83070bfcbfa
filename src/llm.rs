//! Chat Completion Client
//!
//! Client for OpenAI-compatible `/chat/completions` endpoints (Groq by
//! default). Transient failures are retried here with backoff; anything that
//! survives the retries surfaces as a [`ProviderError`].

use crate::agent::recovery::RetryPolicy;
use crate::config::LlmConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const PROVIDER: &str = "llm";

/// Message in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Anything that can turn a system prompt plus messages into text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, messages: &[ChatMessage])
        -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI-compatible chat client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
    /// Budget for one `complete` call, retries included
    deadline: Duration,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(config: LlmConfig, deadline: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            config,
            deadline,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check if an API key is configured
    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Timeout applied to each HTTP request
    pub fn request_timeout(&self) -> Duration {
        self.retry.attempt_timeout(self.deadline)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_once(&self, api_key: &str, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.request_timeout())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|source| self.transport_error(source))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER.to_string(),
                status,
                body,
            });
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|source| self.transport_error(source))?;

        if let Some(usage) = &result.usage {
            info!(
                "LLM response: model={}, in={}, out={}",
                self.config.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                reason: "response contained no message content".to_string(),
            })
    }

    fn transport_error(&self, source: reqwest::Error) -> ProviderError {
        if source.is_timeout() {
            ProviderError::Timeout {
                provider: PROVIDER.to_string(),
                secs: self.request_timeout().as_secs(),
            }
        } else if source.is_decode() {
            ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                reason: source.to_string(),
            }
        } else {
            ProviderError::Transport {
                provider: PROVIDER.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: PROVIDER.to_string(),
                reason: "LLM_API_KEY (or GROQ_API_KEY) not set".to_string(),
            })?;

        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        });
        all.extend_from_slice(messages);

        let request = CompletionRequest {
            model: &self.config.model,
            messages: all,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            "Calling LLM: model={}, messages={}, system_len={}",
            self.config.model,
            request.messages.len(),
            system.len()
        );

        self.retry.run(|| self.send_once(api_key, &request)).await
    }
}
