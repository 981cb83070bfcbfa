//! search_web and get_page_content

use super::{count_arg, text_arg, ToolContext};
use crate::agent::{EvidenceItem, Tool, ToolFailure, ToolOutput, ToolSchema, MAX_RESULTS_LIMIT};
use crate::search::truncate_chars;
use serde_json::json;

/// Cap on page text kept as evidence
const PAGE_EVIDENCE_CHARS: usize = 8000;

pub(super) fn tools(ctx: &ToolContext) -> Vec<Tool> {
    vec![search_web(ctx.clone()), get_page_content(ctx.clone())]
}

fn search_web(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new("search_web", "Search the web for information on a given query")
        .with_string_param("query", "Search query", true)
        .with_int_param("max_results", "Maximum number of results", false)
        .with_default("max_results", json!(10))
        .cacheable();

    Tool::new(schema, move |args| {
        let web = ctx.web.clone();
        async move {
            let query = text_arg(&args, "query")?;
            let max_results = count_arg(&args, "max_results")?.min(MAX_RESULTS_LIMIT);

            let results = web.search(query, Some(max_results)).await;
            let evidence: Vec<EvidenceItem> = results
                .iter()
                .filter(|r| !r.url.is_empty())
                .map(|r| {
                    EvidenceItem::new(
                        r.url.clone(),
                        format!("{}\n{}", r.title, r.content),
                        r.score.clamp(0.0, 1.0),
                    )
                })
                .collect();
            if evidence.is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            Ok(ToolOutput::new(
                json!({
                    "query": query,
                    "total_results": results.len(),
                    "results": results,
                }),
                evidence,
            ))
        }
    })
}

fn get_page_content(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new("get_page_content", "Extract full content from a specific web page")
        .with_string_param("url", "Page URL (http or https)", true)
        .cacheable();

    Tool::new(schema, move |args| {
        let web = ctx.web.clone();
        async move {
            let url = text_arg(&args, "url")?;
            let text = web.fetch_page_text(url).await?;
            if text.trim().is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            let item = EvidenceItem::new(url, truncate_chars(&text, PAGE_EVIDENCE_CHARS), 1.0);
            Ok(ToolOutput::new(
                json!({ "url": url, "content": text }),
                vec![item],
            ))
        }
    })
}
