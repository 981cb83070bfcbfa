//! Fact-checking tools
//!
//! `verify_claim` searches for the claim, hands the hits to the model and
//! reads back a `Status / Confidence / Explanation` verdict. The search hits
//! become evidence alongside a derived verdict item.

use super::{ask, parse_list, text_arg, ToolContext};
use crate::agent::tools::derived_source_id;
use crate::agent::{EvidenceItem, Tool, ToolFailure, ToolOutput, ToolSchema};
use crate::llm::LanguageModel;
use crate::search::{truncate_chars, SearchResult, WebSearch};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Search hits consulted per claim
const EVIDENCE_RESULTS: usize = 5;
/// Claims checked by one `extract_and_verify_claims` call
const MAX_CLAIMS_VERIFIED: usize = 5;

/// Fact-check verdict for one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub claim: String,
    /// true, false, partially_true, unverified or insufficient_evidence
    pub verification: String,
    pub confidence: f64,
    pub explanation: String,
    pub evidence: Vec<SearchResult>,
}

impl Verification {
    fn summary_line(&self) -> String {
        format!(
            "Claim: {}\nVerification: {} (confidence {:.2})\n{}",
            self.claim, self.verification, self.confidence, self.explanation
        )
    }
}

/// Read the model's `Status:`, `Confidence:` and `Explanation:` lines.
/// Missing fields leave the claim unverified at 0.0 with the raw reply as
/// the explanation.
pub fn parse_verification(claim: &str, reply: &str) -> Verification {
    let mut verdict = Verification {
        claim: claim.to_string(),
        verification: "unverified".to_string(),
        confidence: 0.0,
        explanation: reply.trim().to_string(),
        evidence: vec![],
    };

    for line in reply.lines().map(str::trim) {
        if let Some(status) = line.strip_prefix("Status:") {
            verdict.verification = status.trim().to_lowercase();
        } else if let Some(confidence) = line.strip_prefix("Confidence:") {
            if let Ok(value) = confidence.trim().parse::<f64>() {
                verdict.confidence = value.clamp(0.0, 1.0);
            }
        } else if let Some(explanation) = line.strip_prefix("Explanation:") {
            verdict.explanation = explanation.trim().to_string();
        }
    }
    verdict
}

#[derive(Clone)]
struct FactChecker {
    web: WebSearch,
    llm: Arc<dyn LanguageModel>,
}

impl FactChecker {
    async fn extract_claims(&self, text: &str) -> Result<Vec<String>, ToolFailure> {
        let prompt = format!(
            "Extract the main factual claims from the following text. List only specific, \
             verifiable statements, one per line as a numbered list:\n\nText: {}\n\nFactual Claims:",
            text
        );
        let claims = parse_list(&ask(self.llm.as_ref(), prompt).await?);
        if claims.is_empty() {
            return Err(ToolFailure::EmptyResult);
        }
        Ok(claims)
    }

    async fn verify(&self, claim: &str) -> Result<Verification, ToolFailure> {
        let hits = self
            .web
            .search(&format!("fact check {}", claim), Some(EVIDENCE_RESULTS))
            .await;

        if hits.is_empty() {
            return Ok(Verification {
                claim: claim.to_string(),
                verification: "insufficient_evidence".to_string(),
                confidence: 0.0,
                explanation: "No search results found to verify this claim.".to_string(),
                evidence: vec![],
            });
        }

        let evidence_text = hits
            .iter()
            .map(|h| format!("Source: {}\nContent: {}...", h.title, truncate_chars(&h.content, 500)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "As a fact-checker, analyze the following claim and evidence.\n\n\
             Claim: {}\n\nEvidence:\n{}\n\n\
             Respond in exactly this format:\n\
             Status: [true/false/partially_true/unverified]\n\
             Confidence: [0.0-1.0]\n\
             Explanation: [one or two sentences]",
            claim, evidence_text
        );

        let mut verdict = parse_verification(claim, &ask(self.llm.as_ref(), prompt).await?);
        verdict.evidence = hits;
        info!(
            "Verified claim: {} -> {} ({:.2})",
            truncate_chars(claim, 80),
            verdict.verification,
            verdict.confidence
        );
        Ok(verdict)
    }
}

/// Search hits as evidence items
fn hit_evidence(verdicts: &[Verification]) -> Vec<EvidenceItem> {
    verdicts
        .iter()
        .flat_map(|v| &v.evidence)
        .filter(|hit| !hit.url.is_empty())
        .map(|hit| {
            EvidenceItem::new(
                hit.url.clone(),
                format!("{}\n{}", hit.title, hit.content),
                hit.score.clamp(0.0, 1.0),
            )
        })
        .collect()
}

pub(super) fn tools(ctx: &ToolContext) -> Vec<Tool> {
    let checker = FactChecker {
        web: ctx.web.clone(),
        llm: ctx.llm.clone(),
    };
    vec![
        verify_claim(checker.clone()),
        extract_and_verify_claims(checker.clone()),
        extract_claims(checker),
    ]
}

fn verify_claim(checker: FactChecker) -> Tool {
    let schema = ToolSchema::new("verify_claim", "Verify a specific factual claim")
        .with_string_param("claim", "The claim to verify", true)
        .cacheable();

    Tool::new(schema, move |args| {
        let checker = checker.clone();
        async move {
            let claim = text_arg(&args, "claim")?;
            let verdict = checker.verify(claim).await?;

            let mut evidence = hit_evidence(std::slice::from_ref(&verdict));
            evidence.push(EvidenceItem::new(
                derived_source_id("verify_claim", &args),
                verdict.summary_line(),
                1.0,
            ));
            Ok(ToolOutput::new(json!({ "verification_result": verdict }), evidence))
        }
    })
}

fn extract_and_verify_claims(checker: FactChecker) -> Tool {
    let schema = ToolSchema::new(
        "extract_and_verify_claims",
        "Extract claims from text and verify them",
    )
    .with_string_param("text", "Text whose claims should be checked", true)
    .cacheable();

    Tool::new(schema, move |args| {
        let checker = checker.clone();
        async move {
            let text = text_arg(&args, "text")?;
            let mut claims = checker.extract_claims(text).await?;
            if claims.len() > MAX_CLAIMS_VERIFIED {
                warn!(
                    "Verifying first {} of {} extracted claims",
                    MAX_CLAIMS_VERIFIED,
                    claims.len()
                );
                claims.truncate(MAX_CLAIMS_VERIFIED);
            }

            let mut verdicts = Vec::with_capacity(claims.len());
            for (claim, result) in claims.iter().zip(join_all(claims.iter().map(|c| checker.verify(c))).await) {
                match result {
                    Ok(v) => verdicts.push(v),
                    Err(e) => warn!("Verification failed for {}: {}", truncate_chars(claim, 80), e),
                }
            }
            if verdicts.is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            let mut evidence = hit_evidence(&verdicts);
            evidence.push(EvidenceItem::new(
                derived_source_id("extract_and_verify_claims", &args),
                verdicts
                    .iter()
                    .map(Verification::summary_line)
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                1.0,
            ));
            Ok(ToolOutput::new(
                json!({ "verification_results": verdicts, "total_claims": verdicts.len() }),
                evidence,
            ))
        }
    })
}

fn extract_claims(checker: FactChecker) -> Tool {
    let schema = ToolSchema::new("extract_claims", "Extract factual claims from text")
        .with_string_param("text", "Source text", true)
        .cacheable();

    Tool::new(schema, move |args| {
        let checker = checker.clone();
        async move {
            let text = text_arg(&args, "text")?;
            let claims = checker.extract_claims(text).await?;
            let rendered = claims
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(ToolOutput::derived(
                "extract_claims",
                &args,
                rendered,
                json!({ "claims": claims, "total_claims": claims.len() }),
            ))
        }
    })
}
