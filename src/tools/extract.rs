//! Data extraction tools

use super::{ask, text_arg, ToolContext};
use crate::agent::tools::{extract_json_array, extract_json_object};
use crate::agent::{Tool, ToolFailure, ToolOutput, ToolSchema};
use crate::llm::LanguageModel;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+|www\.[^\s<>"{}|\\^`\[\]]+"#).unwrap()
});

const ENTITY_CATEGORIES: [&str; 7] = [
    "PERSON",
    "ORGANIZATION",
    "LOCATION",
    "DATE",
    "MONEY",
    "PERCENT",
    "PRODUCT",
];

/// Contact details found in text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub urls: Vec<String>,
    pub addresses: Vec<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.phones.is_empty() && self.urls.is_empty() && self.addresses.is_empty()
    }

    fn render(&self) -> String {
        [
            ("Emails", &self.emails),
            ("Phones", &self.phones),
            ("URLs", &self.urls),
            ("Addresses", &self.addresses),
        ]
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("{}: {}", label, values.join("; ")))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

fn unique_matches(pattern: &Regex, text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in pattern.find_iter(text) {
        let value = m.as_str().trim_end_matches(['.', ',', ';', ')']).to_string();
        if !found.contains(&value) {
            found.push(value);
        }
    }
    found
}

/// Emails, phone numbers and URLs by pattern; addresses are left to the model
pub fn extract_contact_info(text: &str) -> ContactInfo {
    ContactInfo {
        emails: unique_matches(&EMAIL_PATTERN, text),
        phones: unique_matches(&PHONE_PATTERN, text),
        urls: unique_matches(&URL_PATTERN, text),
        addresses: vec![],
    }
}

/// Parse a JSON object from a reply, else keep the raw text under `fallback_key`
fn object_or_raw(reply: &str, fallback_key: &str) -> Value {
    extract_json_object(reply)
        .and_then(|json| serde_json::from_str::<Map<String, Value>>(json).ok())
        .map(Value::Object)
        .unwrap_or_else(|| json!({ fallback_key: reply }))
}

/// Category headers followed by bulleted entities
fn parse_entities_fallback(reply: &str) -> Value {
    let mut entities: Map<String, Value> = ENTITY_CATEGORIES
        .iter()
        .map(|c| (c.to_string(), Value::Array(vec![])))
        .collect();
    let mut current: Option<String> = None;

    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let header = line.trim_end_matches(':').to_uppercase();
        if ENTITY_CATEGORIES.contains(&header.as_str()) {
            current = Some(header);
        } else if let Some(category) = &current {
            let entity = line.trim_start_matches(['-', '*', ' ']).trim();
            if let (false, Some(Value::Array(list))) = (entity.is_empty(), entities.get_mut(category)) {
                list.push(Value::String(entity.to_string()));
            }
        }
    }
    Value::Object(entities)
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(has_content),
        Value::Object(map) => map.values().any(has_content),
        _ => true,
    }
}

pub(super) fn tools(ctx: &ToolContext) -> Vec<Tool> {
    vec![
        extract_key_metrics(ctx.llm.clone()),
        extract_entities(ctx.llm.clone()),
        extract_contact_info_tool(ctx.llm.clone()),
        extract_table_data(ctx.llm.clone()),
    ]
}

fn text_schema(name: &str, description: &str) -> ToolSchema {
    ToolSchema::new(name, description)
        .with_string_param("text", "Source text", true)
        .cacheable()
}

fn derived_json(tool: &str, args: &Value, key: &str, value: Value) -> Result<ToolOutput, ToolFailure> {
    if !has_content(&value) {
        return Err(ToolFailure::EmptyResult);
    }
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    Ok(ToolOutput::derived(tool, args, text, json!({ key: value })))
}

fn extract_key_metrics(llm: Arc<dyn LanguageModel>) -> Tool {
    Tool::new(
        text_schema("extract_key_metrics", "Extract key metrics and statistics from text"),
        move |args| {
            let llm = llm.clone();
            async move {
                let text = text_arg(&args, "text")?;
                let prompt = format!(
                    "Extract key metrics, statistics, and quantitative data from the following text.\n\n\
                     Text: {}\n\n\
                     Extract numbers with units, dates and time periods, percentages and rates, \
                     financial figures, and performance metrics. Respond with a JSON object with keys: \
                     numbers, dates, percentages, financial, performance.",
                    text
                );
                let reply = ask(llm.as_ref(), prompt).await?;
                derived_json("extract_key_metrics", &args, "metrics", object_or_raw(&reply, "raw_metrics"))
            }
        },
    )
}

fn extract_entities(llm: Arc<dyn LanguageModel>) -> Tool {
    Tool::new(
        text_schema("extract_entities", "Extract named entities from text"),
        move |args| {
            let llm = llm.clone();
            async move {
                let text = text_arg(&args, "text")?;
                let prompt = format!(
                    "Extract named entities from the following text. Categorize them as {}.\n\n\
                     Text: {}\n\n\
                     Respond with a JSON object with the categories as keys and lists of entities as values.",
                    ENTITY_CATEGORIES.join(", "),
                    text
                );
                let reply = ask(llm.as_ref(), prompt).await?;
                let entities = extract_json_object(&reply)
                    .and_then(|json| serde_json::from_str::<Map<String, Value>>(json).ok())
                    .map(Value::Object)
                    .unwrap_or_else(|| parse_entities_fallback(&reply));
                derived_json("extract_entities", &args, "entities", entities)
            }
        },
    )
}

fn extract_contact_info_tool(llm: Arc<dyn LanguageModel>) -> Tool {
    Tool::new(
        text_schema("extract_contact_info", "Extract contact information from text"),
        move |args| {
            let llm = llm.clone();
            async move {
                let text = text_arg(&args, "text")?;
                let mut info = extract_contact_info(text);

                let prompt = format!(
                    "Extract physical addresses from the following text.\n\nText: {}\n\n\
                     List only complete addresses, one per line. Reply NONE if there are none.",
                    text
                );
                match ask(llm.as_ref(), prompt).await {
                    Ok(reply) => {
                        info.addresses = reply
                            .lines()
                            .map(|l| l.trim_start_matches(['-', '*', ' ']).trim())
                            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("none"))
                            .map(String::from)
                            .collect()
                    }
                    Err(e) => warn!("Address extraction skipped: {}", e),
                }

                if info.is_empty() {
                    return Err(ToolFailure::EmptyResult);
                }
                Ok(ToolOutput::derived(
                    "extract_contact_info",
                    &args,
                    info.render(),
                    json!({ "contact_info": info }),
                ))
            }
        },
    )
}

fn extract_table_data(llm: Arc<dyn LanguageModel>) -> Tool {
    Tool::new(
        text_schema("extract_table_data", "Extract tabular data from text"),
        move |args| {
            let llm = llm.clone();
            async move {
                let text = text_arg(&args, "text")?;
                let prompt = format!(
                    "Extract any tabular data from the following text.\n\nText: {}\n\n\
                     Respond with a JSON array of objects, one per row, with column headers as keys. \
                     Respond with [] if there is no table.",
                    text
                );
                let reply = ask(llm.as_ref(), prompt).await?;
                let rows = extract_json_array(&reply)
                    .and_then(|json| serde_json::from_str::<Vec<Value>>(json).ok())
                    .map(Value::Array)
                    .unwrap_or_else(|| json!([{ "raw_table_data": reply }]));
                derived_json("extract_table_data", &args, "table_data", rows)
            }
        },
    )
}
