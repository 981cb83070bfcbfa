//! Conversation Store
//!
//! Message turns per conversation for follow-up questions. Held in process
//! with a rolling window per conversation; nothing is persisted. The set of
//! conversations is itself bounded: least recently used conversations are
//! evicted past the capacity, and idle ones expire.

use crate::agent::{Role, Turn};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default maximum messages kept per conversation (rolling window)
pub const MAX_MESSAGES_PER_CONVERSATION: usize = 50;

/// Default number of conversations held at once
pub const MAX_CONVERSATIONS: u64 = 10_000;

/// Conversations untouched for this long are dropped
pub const CONVERSATION_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// A stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl From<&ConversationMessage> for Turn {
    fn from(msg: &ConversationMessage) -> Self {
        Turn {
            role: msg.role,
            text: msg.content.clone(),
        }
    }
}

type Messages = Arc<RwLock<Vec<ConversationMessage>>>;

/// In-memory conversation store
pub struct ConversationMemory {
    conversations: Cache<String, Messages>,
    max_messages: usize,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self::bounded(max_messages, MAX_CONVERSATIONS, CONVERSATION_IDLE)
    }

    /// Store holding at most `max_conversations`, each expiring after `idle`
    pub fn bounded(max_messages: usize, max_conversations: u64, idle: Duration) -> Self {
        let conversations = Cache::builder()
            .max_capacity(max_conversations.max(1))
            .time_to_idle(idle)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            conversations,
            max_messages: max_messages.max(1),
        }
    }

    fn messages(&self, conversation_id: &str) -> Messages {
        self.conversations
            .get_with(conversation_id.to_string(), || Arc::new(RwLock::new(Vec::new())))
    }

    fn trim(&self, messages: &mut Vec<ConversationMessage>) {
        if messages.len() > self.max_messages {
            let drain_count = messages.len() - self.max_messages;
            messages.drain(0..drain_count);
        }
    }

    /// Add a message to a conversation, trimming the oldest past the limit
    pub fn add_message(&self, conversation_id: &str, role: Role, content: &str) {
        let entry = self.messages(conversation_id);
        let mut messages = entry.write();
        messages.push(ConversationMessage {
            role,
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        self.trim(&mut messages);
        debug!("Added {} message to conversation {}", role.as_str(), conversation_id);
    }

    /// Add a complete exchange (user message + assistant response) under one lock
    pub fn add_exchange(&self, conversation_id: &str, user_msg: &str, assistant_msg: &str) {
        let now = chrono::Utc::now().timestamp_millis();
        let entry = self.messages(conversation_id);
        let mut messages = entry.write();
        messages.push(ConversationMessage {
            role: Role::User,
            content: user_msg.to_string(),
            timestamp: now,
        });
        messages.push(ConversationMessage {
            role: Role::Assistant,
            content: assistant_msg.to_string(),
            timestamp: now + 1,
        });
        self.trim(&mut messages);
    }

    /// Most recent `limit` messages, oldest first
    pub fn get_history(&self, conversation_id: &str, limit: usize) -> Vec<ConversationMessage> {
        self.conversations
            .get(conversation_id)
            .map(|entry| {
                let messages = entry.read();
                let skip = messages.len().saturating_sub(limit);
                messages[skip..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Whole window as loop turns
    pub fn turns(&self, conversation_id: &str) -> Vec<Turn> {
        self.get_history(conversation_id, self.max_messages)
            .iter()
            .map(Turn::from)
            .collect()
    }

    pub fn clear(&self, conversation_id: &str) {
        self.conversations.invalidate(conversation_id);
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.run_pending_tasks();
        self.conversations.entry_count() as usize
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(MAX_MESSAGES_PER_CONVERSATION)
    }
}
