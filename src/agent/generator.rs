//! Response Generator
//!
//! The DRAFT step. Turns the question, prior turns, evidence and reviewer
//! feedback into a candidate answer.

use crate::agent::prompts;
use crate::agent::state::{Evidence, Query, Role, Turn};
use crate::error::ProviderError;
use crate::llm::{ChatMessage, LanguageModel};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        query: &Query,
        history: &[Turn],
        evidence: &Evidence,
        feedback: &str,
    ) -> Result<String, ProviderError>;
}

/// LLM-backed generator
pub struct LlmResponseGenerator {
    llm: Arc<dyn LanguageModel>,
    system_prompt: String,
}

impl LlmResponseGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            system_prompt: prompts::SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// Prior turns as chat messages; system turns are folded into user turns
fn history_messages(history: &[Turn]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::Assistant => ChatMessage::assistant(turn.text.clone()),
            Role::User | Role::System => ChatMessage::user(turn.text.clone()),
        })
        .collect()
}

#[async_trait]
impl ResponseGenerator for LlmResponseGenerator {
    async fn generate(
        &self,
        query: &Query,
        history: &[Turn],
        evidence: &Evidence,
        feedback: &str,
    ) -> Result<String, ProviderError> {
        let mut messages = history_messages(history);
        messages.push(ChatMessage::user(prompts::draft_request(
            &query.text,
            evidence,
            feedback,
        )));

        debug!(
            "Drafting answer: history={}, evidence={}, feedback_len={}",
            history.len(),
            evidence.len(),
            feedback.len()
        );

        let text = self.llm.complete(&self.system_prompt, &messages).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::Malformed {
                provider: "llm".to_string(),
                reason: "empty draft".to_string(),
            });
        }
        Ok(text.to_string())
    }
}
