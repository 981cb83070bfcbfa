//! Built-in Research Tools
//!
//! Search, summarization, fact-checking, data extraction, citations and
//! conversation memory, registered into a [`ToolRegistry`]:
//!
//! | Group | Tools |
//! |---|---|
//! | search | `search_web`, `get_page_content` |
//! | summarize | `summarize_text`, `create_executive_summary`, `extract_key_points` |
//! | fact_check | `verify_claim`, `extract_and_verify_claims`, `extract_claims` |
//! | extract | `extract_key_metrics`, `extract_entities`, `extract_contact_info`, `extract_table_data` |
//! | citation | `generate_citations`, `create_bibliography`, `validate_sources` |
//! | memory | `store_conversation`, `get_conversation_history` |

mod citation;
mod extract;
mod fact_check;
mod memory;
mod search;
mod summarize;

pub use citation::{format_citation, CitationStyle, SourceRecord};
pub use extract::{extract_contact_info, ContactInfo};
pub use fact_check::{parse_verification, Verification};

use crate::agent::{ToolFailure, ToolRegistry};
use crate::conversation::ConversationMemory;
use crate::llm::{ChatMessage, LanguageModel};
use crate::search::WebSearch;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Shared handles every built-in tool may use
#[derive(Clone)]
pub struct ToolContext {
    pub web: WebSearch,
    pub llm: Arc<dyn LanguageModel>,
    pub memory: Arc<ConversationMemory>,
}

/// Register every built-in tool
pub fn register_builtin(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let tools = search::tools(ctx)
        .into_iter()
        .chain(summarize::tools(ctx))
        .chain(fact_check::tools(ctx))
        .chain(extract::tools(ctx))
        .chain(citation::tools())
        .chain(memory::tools(ctx));

    for tool in tools {
        registry.register(tool);
    }
    info!("Registered {} built-in tools", registry.len());
}

/// Required string argument, already checked by the schema
fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolFailure> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolFailure::InvalidArguments(format!("'{}' must be a string", name)))
}

/// Non-blank string argument
fn text_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolFailure> {
    let value = str_arg(args, name)?.trim();
    if value.is_empty() {
        return Err(ToolFailure::InvalidArguments(format!("'{}' cannot be empty", name)));
    }
    Ok(value)
}

/// Positive integer argument
fn count_arg(args: &Value, name: &str) -> Result<usize, ToolFailure> {
    match args.get(name).and_then(Value::as_u64) {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(ToolFailure::InvalidArguments(format!(
            "'{}' must be a positive integer",
            name
        ))),
    }
}

/// Single-prompt completion; an empty reply counts as no result
async fn ask(llm: &dyn LanguageModel, prompt: String) -> Result<String, ToolFailure> {
    let reply = llm.complete(SYSTEM, &[ChatMessage::user(prompt)]).await?;
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ToolFailure::EmptyResult);
    }
    Ok(reply.to_string())
}

const SYSTEM: &str = "You are a precise research assistant. Follow the requested output format exactly.";

/// Items of a numbered or bulleted list, markers stripped
fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with(|c: char| c.is_ascii_digit())
                || line.starts_with('-')
                || line.starts_with('*')
        })
        .map(|line| {
            line.trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '*' | ')' | ' '))
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a JSON argument that may arrive as a JSON-encoded string
fn json_arg(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => serde_json::from_str(s.trim()).ok(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_parse_list_strips_markers() {
        let items = parse_list("Key Points:\n1. First\n2) Second\n- Third\n* Fourth\n\nTrailing prose");
        assert_eq!(items, vec!["First", "Second", "Third", "Fourth"]);
    }

    #[test]
    fn test_json_arg_accepts_encoded_strings() {
        assert_eq!(json_arg(&Value::String("[1, 2]".into())), Some(serde_json::json!([1, 2])));
        assert_eq!(json_arg(&serde_json::json!([1])), Some(serde_json::json!([1])));
        assert_eq!(json_arg(&Value::String("not json".into())), None);
    }

    #[test]
    fn test_registers_every_builtin() {
        let ctx = context(ScriptedLlm::new(&["ok"]), vec![]);
        let registry = registry(&ctx);
        assert_eq!(registry.len(), 17);
        for name in [
            "search_web",
            "get_page_content",
            "summarize_text",
            "create_executive_summary",
            "extract_key_points",
            "verify_claim",
            "extract_and_verify_claims",
            "extract_claims",
            "extract_key_metrics",
            "extract_entities",
            "extract_contact_info",
            "extract_table_data",
            "generate_citations",
            "create_bibliography",
            "validate_sources",
            "store_conversation",
            "get_conversation_history",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }
}
