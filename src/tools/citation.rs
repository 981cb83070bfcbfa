//! Citation tools

use super::json_arg;
use crate::agent::{Tool, ToolFailure, ToolOutput, ToolSchema};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationStyle {
    Apa,
    Mla,
    Chicago,
    Basic,
}

impl CitationStyle {
    /// Case-insensitive; unknown names fall back to `Basic`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "APA" => Self::Apa,
            "MLA" => Self::Mla,
            "CHICAGO" => Self::Chicago,
            _ => Self::Basic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apa => "APA",
            Self::Mla => "MLA",
            Self::Chicago => "CHICAGO",
            Self::Basic => "BASIC",
        }
    }
}

fn unknown_title() -> String {
    "Unknown Title".to_string()
}

fn unknown_source() -> String {
    "unknown".to_string()
}

/// A cited source as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default = "unknown_title")]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default = "unknown_source")]
    pub source: String,
}

/// Format one citation as of `date`
pub fn format_citation(source: &SourceRecord, style: CitationStyle, date: NaiveDate) -> String {
    let title = if source.title.trim().is_empty() {
        "Unknown Title"
    } else {
        source.title.trim()
    };
    let url = source.url.trim();

    match (style, url.is_empty()) {
        (CitationStyle::Apa, false) => {
            format!("{}. Retrieved {}, from {}", title, date.format("%B %-d, %Y"), url)
        }
        (CitationStyle::Apa, true) => format!("{}. (n.d.)", title),
        (CitationStyle::Mla, false) => {
            format!("\"{}.\" Web. {}. <{}>", title, date.format("%d %b %Y"), url)
        }
        (CitationStyle::Mla, true) => format!("\"{}.\" Print.", title),
        (CitationStyle::Chicago, false) => {
            format!("\"{}.\" Accessed {}. {}.", title, date.format("%B %-d, %Y"), url)
        }
        (CitationStyle::Chicago, true) => format!("\"{}.\"", title),
        (CitationStyle::Basic, false) => format!("{} - {}", title, url),
        (CitationStyle::Basic, true) => title.to_string(),
    }
}

/// Sources as a JSON list (or JSON-encoded string) of objects or URLs
fn parse_sources(raw: &Value) -> Result<Vec<SourceRecord>, ToolFailure> {
    let Some(Value::Array(items)) = json_arg(raw) else {
        return Err(ToolFailure::InvalidArguments(
            "sources must be a JSON list".to_string(),
        ));
    };

    let sources: Vec<SourceRecord> = items
        .into_iter()
        .map(|item| match item {
            Value::String(url) => Ok(SourceRecord {
                title: url.clone(),
                url,
                content: String::new(),
                snippet: String::new(),
                source: unknown_source(),
            }),
            other => serde_json::from_value(other)
                .map_err(|e| ToolFailure::InvalidArguments(format!("bad source: {}", e))),
        })
        .collect::<Result<_, _>>()?;

    if sources.is_empty() {
        return Err(ToolFailure::EmptyResult);
    }
    Ok(sources)
}

fn style_arg(args: &Value) -> CitationStyle {
    CitationStyle::parse(args["style"].as_str().unwrap_or("APA"))
}

fn citations(sources: &[SourceRecord], style: CitationStyle) -> Vec<String> {
    let today = Utc::now().date_naive();
    sources
        .iter()
        .map(|s| format_citation(s, style, today))
        .collect()
}

pub(super) fn tools() -> Vec<Tool> {
    vec![generate_citations(), create_bibliography(), validate_sources()]
}

fn sources_schema(name: &str, description: &str, styled: bool) -> ToolSchema {
    let schema = ToolSchema::new(name, description).with_json_param(
        "sources",
        "JSON list of {title, url} objects",
        true,
    );
    if styled {
        schema
            .with_string_param("style", "APA, MLA, CHICAGO or anything else for basic", false)
            .with_default("style", json!("APA"))
    } else {
        schema
    }
}

fn generate_citations() -> Tool {
    let schema = sources_schema(
        "generate_citations",
        "Generate citations for given sources in specified style",
        true,
    );
    Tool::new(schema, |args| async move {
        let sources = parse_sources(&args["sources"])?;
        let style = style_arg(&args);
        let list = citations(&sources, style);

        Ok(ToolOutput::derived(
            "generate_citations",
            &args,
            list.join("\n"),
            json!({
                "citations": list,
                "style": style.as_str(),
                "total_sources": sources.len(),
            }),
        ))
    })
}

fn create_bibliography() -> Tool {
    let schema = sources_schema(
        "create_bibliography",
        "Create a formatted bibliography from sources",
        true,
    );
    Tool::new(schema, |args| async move {
        let sources = parse_sources(&args["sources"])?;
        let style = style_arg(&args);

        let mut bibliography = format!("{} Bibliography:\n\n", style.as_str());
        for (i, citation) in citations(&sources, style).iter().enumerate() {
            bibliography.push_str(&format!("{}. {}\n", i + 1, citation));
        }

        let content = json!({ "bibliography": bibliography, "style": style.as_str() });
        Ok(ToolOutput::derived("create_bibliography", &args, bibliography, content))
    })
}

fn validate_sources() -> Tool {
    let schema = sources_schema("validate_sources", "Validate and clean source information", false);
    Tool::new(schema, |args| async move {
        let sources = parse_sources(&args["sources"])?;
        let retrieved = Utc::now().to_rfc3339();

        let validated: Vec<Value> = sources
            .iter()
            .map(|s| {
                let is_valid = s.title != unknown_title()
                    && !s.title.trim().is_empty()
                    && !(s.url.is_empty() && s.content.is_empty());
                json!({
                    "title": s.title,
                    "url": s.url,
                    "content": s.content,
                    "snippet": s.snippet,
                    "source": s.source,
                    "retrieved_date": retrieved,
                    "is_valid": is_valid,
                })
            })
            .collect();

        let valid = validated.iter().filter(|v| v["is_valid"] == true).count();
        let summary = format!("{} of {} sources valid", valid, validated.len());
        Ok(ToolOutput::derived(
            "validate_sources",
            &args,
            summary,
            json!({ "validated_sources": validated, "total_sources": validated.len() }),
        ))
    })
}
