//! Reflection Critic
//!
//! Scores a draft against the evidence it was written from:
//! - LLM-as-judge produces one support judgment per factual claim
//! - Judgments are combined deterministically into a confidence
//! - Weakly supported claims become feedback for the next attempt
//!
//! Combination policy: confidence is the arithmetic mean of per-claim
//! support, clamped to [0, 1]. A draft with no factual claims scores 1.0.
//! Claims with support below 0.5 are flagged, in the judge's order. A judge
//! response that cannot be read scores 0.0 with a single flag.

use crate::agent::prompts;
use crate::agent::state::{Evidence, FlaggedClaim, ReflectionVerdict};
use crate::agent::tools::{extract_json_array, extract_json_object};
use crate::error::ProviderError;
use crate::llm::{ChatMessage, LanguageModel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Claims below this support are flagged
pub const FLAG_THRESHOLD: f64 = 0.5;

/// Judge's view of one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimJudgment {
    pub claim: String,
    /// 0.0 unsupported .. 1.0 fully supported
    pub support: f64,
    #[serde(default)]
    pub reason: String,
}

#[async_trait]
pub trait Critic: Send + Sync {
    /// Judge `draft` against exactly the evidence it was generated from
    async fn critique(&self, draft: &str, evidence: &Evidence)
        -> Result<ReflectionVerdict, ProviderError>;
}

/// Combine per-claim judgments into a verdict bound to `evidence`
pub fn aggregate(judgments: &[ClaimJudgment], evidence: &Evidence) -> ReflectionVerdict {
    if judgments.is_empty() {
        return ReflectionVerdict::new(1.0, vec![], evidence);
    }

    let supports: Vec<f64> = judgments.iter().map(|j| clamp_support(j.support)).collect();
    let confidence = supports.iter().sum::<f64>() / supports.len() as f64;

    let flagged = judgments
        .iter()
        .zip(&supports)
        .filter(|(_, support)| **support < FLAG_THRESHOLD)
        .map(|(j, _)| FlaggedClaim {
            claim: j.claim.clone(),
            reason: if j.reason.trim().is_empty() {
                "not supported by the retrieved evidence".to_string()
            } else {
                j.reason.clone()
            },
        })
        .collect();

    ReflectionVerdict::new(confidence, flagged, evidence)
}

/// Verdict for a judge response that could not be read
pub fn unreadable(evidence: &Evidence) -> ReflectionVerdict {
    ReflectionVerdict::new(
        0.0,
        vec![FlaggedClaim {
            claim: "(entire response)".to_string(),
            reason: "the critic's judgment could not be read; verify every claim against the evidence"
                .to_string(),
        }],
        evidence,
    )
}

fn clamp_support(support: f64) -> f64 {
    if support.is_nan() {
        0.0
    } else {
        support.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsJson {
    claims: Vec<ClaimJudgment>,
}

/// Parse per-claim judgments from a judge response.
///
/// Accepts `{"claims": [...]}` or a bare array, optionally wrapped in prose.
/// Anything else, including a lone overall score, is `None`.
pub fn parse_judgment(response: &str) -> Option<Vec<ClaimJudgment>> {
    if let Some(json) = extract_json_object(response) {
        if let Ok(parsed) = serde_json::from_str::<ClaimsJson>(json) {
            return Some(parsed.claims);
        }
    }
    extract_json_array(response)
        .and_then(|json| serde_json::from_str::<Vec<ClaimJudgment>>(json).ok())
}

/// LLM-as-judge critic
pub struct LlmCritic {
    llm: Arc<dyn LanguageModel>,
}

impl LlmCritic {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Critic for LlmCritic {
    async fn critique(
        &self,
        draft: &str,
        evidence: &Evidence,
    ) -> Result<ReflectionVerdict, ProviderError> {
        let request = prompts::critic_request(draft, evidence);
        let response = self
            .llm
            .complete(prompts::CRITIC_PROMPT, &[ChatMessage::user(request)])
            .await?;

        let verdict = match parse_judgment(&response) {
            Some(claims) => {
                debug!("Critic judged {} claim(s)", claims.len());
                aggregate(&claims, evidence)
            }
            None => {
                warn!("Critic response unreadable, scoring draft 0.0");
                unreadable(evidence)
            }
        };

        info!(
            "Critique: confidence={:.2}, flagged={}",
            verdict.confidence,
            verdict.flagged_claims.len()
        );
        Ok(verdict)
    }
}
