//! Prompt templates

use crate::agent::state::{Evidence, Turn};
use crate::search::truncate_chars;

/// Per-item cap on evidence text inside prompts
const EVIDENCE_CHARS: usize = 1500;

pub const SYSTEM_PROMPT: &str = "You are a helpful research assistant with access to tools for \
searching the web, summarizing content, fact-checking, extracting data, and managing citations. \
Answer thoroughly, ground every factual statement in the retrieved evidence, and cite sources \
by URL when you use them.";

pub const PLANNER_PROMPT: &str = r#"You are the planning step of a research assistant. Decide which tools, if any, to call next.

Tools:
{tools}

Guidance:
- For new research questions, call search_web.
- Call get_conversation_history only when the question refers to earlier turns ("what did I ask", "expand on that", "why?").
- If the gathered evidence already answers the question, or the question needs no research (greetings, arithmetic), call no tools.
- When reviewer feedback lists unsupported claims, search for evidence that settles them.
- Max search results: {max_results}

Respond with JSON only:
{"tools": [{"name": "tool_name", "arguments": {"arg": "value"}}]}
Use {"tools": []} when no tool is needed."#;

pub const CRITIC_PROMPT: &str = r#"You are a rigorous research critic. Check an assistant's response for hallucinations by comparing it with the retrieved context.

Instructions:
1. List every factual claim the response makes, in order.
2. For each claim, judge how well the retrieved context supports it: 1.0 fully supported, 0.0 unsupported or contradicted.
3. Give a short reason for each judgment.
4. Opinions, greetings and restatements of the question are not factual claims. If there are none, return an empty list.

Respond with JSON only:
{"claims": [{"claim": "...", "support": 0.0, "reason": "..."}]}"#;

/// Render the planner system prompt
pub fn planner_system(tool_lines: &[String], max_results: usize) -> String {
    PLANNER_PROMPT
        .replace("{tools}", &tool_lines.join("\n"))
        .replace("{max_results}", &max_results.to_string())
}

/// Evidence as a numbered context block
pub fn format_evidence(evidence: &Evidence) -> String {
    if evidence.is_empty() {
        return "(no evidence retrieved)".to_string();
    }
    evidence
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "[{}] {} (relevance {:.2})\n{}",
                i + 1,
                item.source_id,
                item.relevance,
                truncate_chars(&item.text, EVIDENCE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), truncate_chars(&t.text, 300)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User message for the planner
pub fn planner_request(
    query: &str,
    conversation_id: Option<&str>,
    history: &[Turn],
    evidence: &Evidence,
    feedback: &str,
) -> String {
    let mut msg = format!("Question: {}\n", query);
    if let Some(id) = conversation_id {
        msg.push_str(&format!(
            "Conversation ID: {} (pass it as conversation_id to memory tools)\n",
            id
        ));
    }
    if !history.is_empty() {
        msg.push_str(&format!(
            "\nConversation so far ({} turns, available through get_conversation_history):\n{}\n",
            history.len(),
            format_history(history)
        ));
    }
    if evidence.is_empty() {
        msg.push_str("\nNo evidence gathered yet.\n");
    } else {
        msg.push_str(&format!(
            "\nEvidence gathered so far ({} sources):\n{}\n",
            evidence.len(),
            evidence.source_ids().join("\n")
        ));
    }
    if !feedback.is_empty() {
        msg.push_str(&format!(
            "\nThe previous answer was rejected. Reviewer feedback:\n{}\n",
            feedback
        ));
    }
    msg
}

/// Final user message for the response generator
pub fn draft_request(query: &str, evidence: &Evidence, feedback: &str) -> String {
    let mut msg = format!(
        "Retrieved evidence:\n{}\n\nQuestion: {}\n",
        format_evidence(evidence),
        query
    );
    if !feedback.is_empty() {
        msg.push_str(&format!(
            "\nA reviewer rejected the previous answer. Fix or drop these claims:\n{}\n",
            feedback
        ));
    }
    msg.push_str("\nWrite the answer now. Only state facts the evidence supports.");
    msg
}

/// User message for the critic
pub fn critic_request(draft: &str, evidence: &Evidence) -> String {
    format!(
        "Retrieved Context:\n{}\n\nAssistant's Response:\n{}",
        format_evidence(evidence),
        draft
    )
}
