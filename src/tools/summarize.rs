//! Summarization tools

use super::{ask, count_arg, json_arg, parse_list, str_arg, text_arg, ToolContext};
use crate::agent::{Tool, ToolFailure, ToolOutput, ToolSchema};
use crate::llm::LanguageModel;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Per-document summary length inside an executive summary
const DOCUMENT_SUMMARY_WORDS: usize = 300;

pub(super) fn tools(ctx: &ToolContext) -> Vec<Tool> {
    vec![
        summarize_text(ctx.clone()),
        create_executive_summary(ctx.clone()),
        extract_key_points(ctx.clone()),
    ]
}

/// Summarize `text` to roughly `max_length` words; short text is returned as is
async fn summarize(llm: &dyn LanguageModel, text: &str, max_length: usize) -> Result<String, ToolFailure> {
    if text.chars().count() <= max_length {
        return Ok(text.to_string());
    }
    let prompt = format!(
        "Please provide a concise summary of the following text in approximately {} words:\n\n\
         Text: {}\n\nSummary:",
        max_length, text
    );
    let summary = ask(llm, prompt).await?;
    info!(
        "Text summarized: {} -> {} characters",
        text.chars().count(),
        summary.chars().count()
    );
    Ok(summary)
}

fn summarize_text(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new("summarize_text", "Summarize a given text to specified length")
        .with_string_param("text", "Text to summarize", true)
        .with_int_param("max_length", "Approximate summary length in words", false)
        .with_default("max_length", json!(500))
        .cacheable();

    Tool::new(schema, move |args| {
        let llm = ctx.llm.clone();
        async move {
            let text = text_arg(&args, "text")?;
            let max_length = count_arg(&args, "max_length")?;
            let summary = summarize(llm.as_ref(), text, max_length).await?;

            let content = json!({
                "summary": summary,
                "original_length": text.chars().count(),
                "summary_length": summary.chars().count(),
            });
            Ok(ToolOutput::derived("summarize_text", &args, summary, content))
        }
    })
}

/// A document for the executive summary
#[derive(Debug, Clone, PartialEq)]
struct Document {
    title: String,
    url: String,
    content: String,
}

/// Documents arrive as a JSON list of objects or as plain text
fn parse_documents(raw: &Value) -> Vec<Document> {
    let from_object = |doc: &Value| Document {
        title: doc["title"].as_str().unwrap_or("Unknown").to_string(),
        url: doc["url"].as_str().unwrap_or_default().to_string(),
        content: doc["content"].as_str().unwrap_or_default().to_string(),
    };

    let docs = match json_arg(raw) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Document {
                    title: "Document".to_string(),
                    url: String::new(),
                    content: s.clone(),
                },
                other => from_object(other),
            })
            .collect(),
        Some(obj @ Value::Object(_)) => vec![from_object(&obj)],
        _ => match raw.as_str() {
            Some(text) => vec![Document {
                title: "Document".to_string(),
                url: String::new(),
                content: text.to_string(),
            }],
            None => vec![],
        },
    };

    docs.into_iter()
        .filter(|d: &Document| !d.content.trim().is_empty())
        .collect()
}

fn create_executive_summary(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new(
        "create_executive_summary",
        "Create executive summary from multiple documents about a topic",
    )
    .with_json_param("documents", "JSON list of {title, url, content} or plain text", true)
    .with_string_param("topic", "Topic of the summary", true)
    .cacheable();

    Tool::new(schema, move |args| {
        let llm = ctx.llm.clone();
        async move {
            let topic = str_arg(&args, "topic")?;
            let documents = parse_documents(&args["documents"]);
            if documents.is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            let summaries = join_all(
                documents
                    .iter()
                    .map(|doc| summarize(llm.as_ref(), &doc.content, DOCUMENT_SUMMARY_WORDS)),
            )
            .await;

            let mut sections = Vec::new();
            for (doc, summary) in documents.iter().zip(summaries) {
                match summary {
                    Ok(summary) => sections.push(format!("Source: {}\n{}", doc.title, summary)),
                    Err(e) => warn!("Failed to summarize document {}: {}", doc.title, e),
                }
            }
            if sections.is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            let prompt = format!(
                "Based on the following research summaries about \"{}\", create a comprehensive \
                 executive summary that synthesizes the key findings, insights, and conclusions:\n\n\
                 {}\n\nExecutive Summary:",
                topic,
                sections.join("\n\n")
            );
            let summary = ask(llm.as_ref(), prompt).await?;

            let content = json!({
                "executive_summary": summary,
                "topic": topic,
                "documents_processed": sections.len(),
                "sources": documents.iter().filter(|d| !d.url.is_empty()).map(|d| &d.url).collect::<Vec<_>>(),
            });
            Ok(ToolOutput::derived("create_executive_summary", &args, summary, content))
        }
    })
}

fn extract_key_points(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new("extract_key_points", "Extract key points from text")
        .with_string_param("text", "Source text", true)
        .with_int_param("num_points", "Number of points to extract", false)
        .with_default("num_points", json!(5))
        .cacheable();

    Tool::new(schema, move |args| {
        let llm = ctx.llm.clone();
        async move {
            let text = text_arg(&args, "text")?;
            let num_points = count_arg(&args, "num_points")?;

            let prompt = format!(
                "Extract the {} most important key points from the following text. \
                 Format as a numbered list:\n\nText: {}\n\nKey Points:",
                num_points, text
            );
            let mut points = parse_list(&ask(llm.as_ref(), prompt).await?);
            points.truncate(num_points);
            if points.is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            let rendered = points
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{}. {}", i + 1, p))
                .collect::<Vec<_>>()
                .join("\n");
            let content = json!({ "key_points": points, "num_points": points.len() });
            Ok(ToolOutput::derived("extract_key_points", &args, rendered, content))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::agent::tools::derived_source_id;

    #[test]
    fn test_parse_documents_shapes() {
        let docs = parse_documents(&json!(r#"[{"title": "A", "url": "https://a", "content": "alpha"}]"#));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "A");

        let docs = parse_documents(&json!("just some prose"));
        assert_eq!(docs[0].title, "Document");
        assert_eq!(docs[0].content, "just some prose");

        let docs = parse_documents(&json!([{"title": "empty", "content": "  "}, "raw text"]));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "raw text");
    }

    #[tokio::test]
    async fn test_short_text_is_not_sent_to_model() {
        let llm = ScriptedLlm::new(&["should not be used"]);
        let ctx = context(llm.clone(), vec![]);
        let args = json!({ "text": "tiny", "max_length": 500 });
        let output = registry(&ctx)
            .invoke("summarize_text", args.clone())
            .await
            .unwrap()
            .outcome
            .unwrap();
        assert_eq!(output.content["summary"], "tiny");
        assert!(llm.prompts.lock().is_empty());
        assert_eq!(
            output.evidence[0].source_id,
            derived_source_id("summarize_text", &args)
        );
    }

    #[tokio::test]
    async fn test_key_points_truncated_to_request() {
        let ctx = context(ScriptedLlm::new(&["1. one\n2. two\n3. three"]), vec![]);
        let output = registry(&ctx)
            .invoke("extract_key_points", json!({ "text": "long text", "num_points": 2 }))
            .await
            .unwrap()
            .outcome
            .unwrap();
        assert_eq!(output.content["key_points"], json!(["one", "two"]));
        assert_eq!(output.evidence[0].text, "1. one\n2. two");
    }

    #[tokio::test]
    async fn test_executive_summary_uses_every_document() {
        let llm = ScriptedLlm::new(&["Combined view."]);
        let ctx = context(llm.clone(), vec![]);
        let output = registry(&ctx)
            .invoke(
                "create_executive_summary",
                json!({
                    "documents": [{"title": "A", "content": "alpha"}, {"title": "B", "content": "beta"}],
                    "topic": "letters",
                }),
            )
            .await
            .unwrap()
            .outcome
            .unwrap();
        assert_eq!(output.content["executive_summary"], "Combined view.");
        assert_eq!(output.content["documents_processed"], 2);
        let prompts = llm.prompts.lock();
        assert!(prompts.last().unwrap().contains("Source: A\nalpha"));
    }
}
