//! Structured Tool Use Framework
//!
//! JSON-schema tool definitions with guarded, concurrent dispatch:
//! - Tool registration with schemas and argument defaults
//! - Parameter validation
//! - Per-invocation timeout and panic isolation
//! - Shared result cache for cacheable tools
//!
//! A tool can fail in many ways but the registry never lets an error or a
//! panic escape; everything comes back as a [`ToolFailure`]. The only error
//! dispatch itself raises is [`UnknownTool`].

use crate::agent::state::EvidenceItem;
use crate::cache::ToolCache;
use crate::error::{ProviderError, UnknownTool};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// JSON Schema for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (snake_case)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: Value,
    /// Required parameter names
    pub required: Vec<String>,
    /// Values filled in for absent optional parameters
    pub defaults: Map<String, Value>,
    /// Whether successful outputs may be served from the tool cache
    pub cacheable: bool,
}

impl ToolSchema {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            required: vec![],
            defaults: Map::new(),
            cacheable: false,
        }
    }

    fn with_param(mut self, name: &str, spec: Value, required: bool) -> Self {
        if let Some(props) = self.parameters.get_mut("properties") {
            props[name] = spec;
        }
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string parameter
    pub fn with_string_param(self, name: &str, description: &str, required: bool) -> Self {
        self.with_param(
            name,
            serde_json::json!({ "type": "string", "description": description }),
            required,
        )
    }

    /// Add an integer parameter
    pub fn with_int_param(self, name: &str, description: &str, required: bool) -> Self {
        self.with_param(
            name,
            serde_json::json!({ "type": "integer", "description": description }),
            required,
        )
    }

    /// Add an enum parameter
    pub fn with_enum_param(
        self,
        name: &str,
        description: &str,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.with_param(
            name,
            serde_json::json!({ "type": "string", "description": description, "enum": values }),
            required,
        )
    }

    /// Add a parameter accepting any JSON value (lists, objects or raw text)
    pub fn with_json_param(self, name: &str, description: &str, required: bool) -> Self {
        self.with_param(
            name,
            serde_json::json!({ "description": description }),
            required,
        )
    }

    /// Default for an optional parameter
    pub fn with_default(mut self, name: &str, value: Value) -> Self {
        self.defaults.insert(name.to_string(), value);
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Fill in defaults for absent parameters. `null` counts as no arguments.
    pub fn apply_defaults(&self, args: Value) -> Result<Value, ToolFailure> {
        let mut obj = match args {
            Value::Null => Map::new(),
            Value::Object(obj) => obj,
            other => {
                return Err(ToolFailure::InvalidArguments(format!(
                    "expected an object, got {}",
                    json_type(&other)
                )))
            }
        };
        for (name, value) in &self.defaults {
            if obj.get(name).map_or(true, Value::is_null) {
                obj.insert(name.clone(), value.clone());
            }
        }
        Ok(Value::Object(obj))
    }

    /// Validate parameters against schema
    pub fn validate(&self, params: &Value) -> Result<(), ToolFailure> {
        for req in &self.required {
            if params.get(req).map_or(true, Value::is_null) {
                return Err(ToolFailure::InvalidArguments(format!(
                    "missing required parameter: {}",
                    req
                )));
            }
        }

        let Some(props) = self.parameters.get("properties").and_then(Value::as_object) else {
            return Ok(());
        };
        for (name, schema) in props {
            let Some(value) = params.get(name) else {
                continue;
            };
            let expected_type = schema.get("type").and_then(|t| t.as_str());
            let valid = match expected_type {
                Some("string") => value.is_string(),
                Some("integer") => value.is_i64() || value.is_u64(),
                Some("number") => value.is_number(),
                Some("boolean") => value.is_boolean(),
                Some("array") => value.is_array(),
                Some("object") => value.is_object(),
                _ => true,
            };
            if !valid {
                return Err(ToolFailure::InvalidArguments(format!(
                    "parameter '{}' has wrong type, expected {}",
                    name,
                    expected_type.unwrap_or("unknown")
                )));
            }
            if let (Some(allowed), Some(s)) =
                (schema.get("enum").and_then(Value::as_array), value.as_str())
            {
                if !allowed.iter().any(|v| v.as_str() == Some(s)) {
                    return Err(ToolFailure::InvalidArguments(format!(
                        "parameter '{}' must be one of {}",
                        name,
                        Value::Array(allowed.clone())
                    )));
                }
            }
        }

        Ok(())
    }

    /// One-line description for planner prompts
    pub fn to_prompt_line(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .keys()
                    .map(|name| match self.defaults.get(name) {
                        Some(default) => format!("{}={}", name, default),
                        None if self.required.contains(name) => name.clone(),
                        None => format!("{}?", name),
                    })
                    .collect()
            })
            .unwrap_or_default();
        format!("- {}({}): {}", self.name, params.join(", "), self.description)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Successful tool payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Structured result returned to callers
    pub content: Value,
    /// Evidence this call contributes to the request
    pub evidence: Vec<EvidenceItem>,
}

impl ToolOutput {
    pub fn new(content: Value, evidence: Vec<EvidenceItem>) -> Self {
        Self { content, evidence }
    }

    /// Output with no evidence contribution
    pub fn content_only(content: Value) -> Self {
        Self {
            content,
            evidence: vec![],
        }
    }

    /// Output of a derived (non-retrieval) tool: one evidence item whose
    /// source id is stable for the same tool and arguments
    pub fn derived(tool_name: &str, args: &Value, text: String, content: Value) -> Self {
        let item = EvidenceItem::new(derived_source_id(tool_name, args), text, 1.0);
        Self {
            content,
            evidence: vec![item],
        }
    }
}

/// Source id for derived evidence: `tool:<name>:<16 hex of args digest>`
pub fn derived_source_id(tool_name: &str, args: &Value) -> String {
    let key = ToolCache::compute_key(tool_name, args);
    format!("tool:{}:{}", tool_name, &key[..16])
}

/// Why a tool invocation produced no output
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolFailure {
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("no results")]
    EmptyResult,

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("tool panicked: {0}")]
    Panicked(String),
}

impl From<anyhow::Error> for ToolFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Execution(format!("{:#}", err))
    }
}

impl From<ProviderError> for ToolFailure {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout { secs, .. } => Self::Timeout(secs * 1000),
            other => Self::Execution(other.to_string()),
        }
    }
}

/// Result from one tool invocation
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_name: String,
    pub call_id: String,
    pub outcome: Result<ToolOutput, ToolFailure>,
    pub duration_ms: u64,
    /// Served from the tool cache
    pub cached: bool,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Evidence contributed by this call; empty on failure
    pub fn evidence(&self) -> &[EvidenceItem] {
        match &self.outcome {
            Ok(output) => &output.evidence,
            Err(_) => &[],
        }
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        self.outcome.as_ref().err()
    }
}

/// A tool call request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: &str, arguments: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// Type alias for tool handler function
pub type ToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutput, ToolFailure>> + Send + Sync>;

/// A registered tool with schema and handler
pub struct Tool {
    pub schema: ToolSchema,
    handler: ToolHandler,
}

impl Tool {
    pub fn new<F, Fut>(schema: ToolSchema, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolFailure>> + Send + 'static,
    {
        Self {
            schema,
            handler: Arc::new(move |params| Box::pin(handler(params))),
        }
    }
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
    cache: Option<ToolCache>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            cache: None,
            timeout: Duration::from_secs(45),
        }
    }

    /// Share a result cache with other registries/requests
    pub fn with_cache(mut self, cache: ToolCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Per-invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, tool: Tool) {
        debug!("Registered tool: {}", tool.schema.name);
        self.tools.insert(tool.schema.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn schemas(&self) -> Vec<&ToolSchema> {
        self.tools.values().map(|t| &t.schema).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolResult, UnknownTool> {
        self.invoke_call(&ToolCall::new(name, args)).await
    }

    /// Invoke a single tool call
    pub async fn invoke_call(&self, call: &ToolCall) -> Result<ToolResult, UnknownTool> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| UnknownTool(call.name.clone()))?;
        Ok(self.run(tool, call).await)
    }

    /// Invoke several calls concurrently.
    ///
    /// Every name is checked before anything runs, so an unknown tool
    /// leaves no partial side effects. Results keep the order of `calls`.
    pub async fn invoke_all(&self, calls: &[ToolCall]) -> Result<Vec<ToolResult>, UnknownTool> {
        let tools = calls
            .iter()
            .map(|call| {
                self.tools
                    .get(&call.name)
                    .ok_or_else(|| UnknownTool(call.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let results = join_all(
            tools
                .into_iter()
                .zip(calls)
                .map(|(tool, call)| self.run(tool, call)),
        )
        .await;

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "Executed {} tool call(s), {} failed",
            results.len(),
            failed
        );
        Ok(results)
    }

    async fn run(&self, tool: &Tool, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let (outcome, cached) = self.guarded(tool, call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(failure) = &outcome {
            warn!(
                "Tool {} ({}) failed after {}ms: {}",
                call.name, call.id, duration_ms, failure
            );
        }

        ToolResult {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            outcome,
            duration_ms,
            cached,
        }
    }

    async fn guarded(&self, tool: &Tool, call: &ToolCall) -> (Result<ToolOutput, ToolFailure>, bool) {
        let args = match tool.schema.apply_defaults(call.arguments.clone()) {
            Ok(args) => args,
            Err(failure) => return (Err(failure), false),
        };
        if let Err(failure) = tool.schema.validate(&args) {
            return (Err(failure), false);
        }

        let cache_key = match &self.cache {
            Some(_) if tool.schema.cacheable => Some(ToolCache::compute_key(&call.name, &args)),
            _ => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(output) = cache.get(key).await {
                return (Ok(output), true);
            }
        }

        let handler = Arc::clone(&tool.handler);
        let invocation = AssertUnwindSafe(async move { handler(args).await }).catch_unwind();

        let outcome = match tokio::time::timeout(self.timeout, invocation).await {
            Err(_) => Err(ToolFailure::Timeout(self.timeout.as_millis() as u64)),
            Ok(Err(panic)) => Err(ToolFailure::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        };

        if let (Ok(output), Some(cache), Some(key)) = (&outcome, &self.cache, &cache_key) {
            cache.set(key, output.clone()).await;
        }
        (outcome, false)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Extract the first balanced JSON array from text
pub(crate) fn extract_json_array(s: &str) -> Option<&str> {
    extract_balanced(s, '[', ']')
}

/// Extract the first balanced JSON object from text
pub(crate) fn extract_json_object(s: &str) -> Option<&str> {
    extract_balanced(s, '{', '}')
}

fn extract_balanced(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
