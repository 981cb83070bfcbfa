//! Request-scoped data model
//!
//! Everything here lives for one research request: the query, the turns it
//! was asked in, the evidence gathered by tools, and the drafts and verdicts
//! the loop produces along the way.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Immutable research question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Result-count hint handed to search tools
    pub max_results: usize,
}

impl Query {
    pub fn new(text: impl Into<String>, max_results: usize) -> Self {
        Self {
            text: text.into(),
            max_results,
        }
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse a role name, defaulting unknown names to `User`
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::User,
        }
    }
}

/// A single prior turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// One retrieved fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// URL or `tool:<name>:<digest>` for derived results
    pub source_id: String,
    pub text: String,
    pub relevance: f64,
}

impl EvidenceItem {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, relevance: f64) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            relevance,
        }
    }
}

/// Evidence accumulated for one request, keyed by source identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    items: BTreeMap<String, EvidenceItem>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one item; on a duplicate source the higher relevance wins.
    ///
    /// Returns true when the set changed.
    pub fn merge(&mut self, item: EvidenceItem) -> bool {
        match self.items.get(&item.source_id) {
            Some(existing) if existing.relevance >= item.relevance => false,
            _ => {
                self.items.insert(item.source_id.clone(), item);
                true
            }
        }
    }

    /// Merge a batch in order, returning how many entries changed
    pub fn merge_all(&mut self, items: impl IntoIterator<Item = EvidenceItem>) -> usize {
        items.into_iter().map(|i| self.merge(i)).filter(|changed| *changed).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, source_id: &str) -> Option<&EvidenceItem> {
        self.items.get(source_id)
    }

    /// Items in source-identifier order
    pub fn iter(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items.values()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    /// Content digest identifying this exact snapshot
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for item in self.items.values() {
            hasher.update(item.source_id.as_bytes());
            hasher.update([0u8]);
            hasher.update(item.text.as_bytes());
            hasher.update([0u8]);
            hasher.update(item.relevance.to_bits().to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Candidate answer and the evidence it was written from
#[derive(Debug, Clone)]
pub struct Draft {
    pub attempt: usize,
    pub text: String,
    pub evidence: Evidence,
}

/// An unsupported claim picked out by the critic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedClaim {
    pub claim: String,
    pub reason: String,
}

/// Critic judgment for one draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    pub confidence: f64,
    pub flagged_claims: Vec<FlaggedClaim>,
    /// Digest of the evidence snapshot this verdict was computed against
    #[serde(skip)]
    evidence_digest: String,
}

impl ReflectionVerdict {
    /// Confidence is clamped to [0, 1]; NaN counts as 0.0
    pub fn new(confidence: f64, flagged_claims: Vec<FlaggedClaim>, evidence: &Evidence) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            confidence,
            flagged_claims,
            evidence_digest: evidence.digest(),
        }
    }

    /// Whether this verdict was computed against `evidence`
    pub fn applies_to(&self, evidence: &Evidence) -> bool {
        self.evidence_digest == evidence.digest()
    }

    /// Feedback text for the next draft: one line per flagged claim
    pub fn feedback(&self) -> String {
        self.flagged_claims
            .iter()
            .map(|c| format!("- \"{}\": {}", c.claim, c.reason))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One entry of the execution trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl TraceStep {
    pub fn new(step: &str, details: serde_json::Value) -> Self {
        Self {
            step: step.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details,
        }
    }
}
