//! Web Search Providers
//!
//! Tavily is the primary backend when a key is configured; DuckDuckGo's
//! Instant Answer API is the keyless fallback. [`WebSearch`] walks the chain
//! in order and returns the first non-empty result list.

use crate::config::SearchConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const SNIPPET_CHARS: usize = 200;

/// One web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Full content snippet/description
    #[serde(default)]
    pub content: String,
    /// First 200 characters of `content`
    #[serde(default)]
    pub snippet: String,
    /// Backend that produced this result
    pub source: String,
    #[serde(default)]
    pub score: f64,
}

impl SearchResult {
    pub fn new(title: String, url: String, content: String, source: &str, score: f64) -> Self {
        Self {
            snippet: snippet(&content),
            title,
            url,
            content,
            source: source.to_string(),
            score,
        }
    }
}

/// First 200 characters plus an ellipsis when truncated
pub fn snippet(content: &str) -> String {
    match content.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

/// A web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, ProviderError>;
}

fn http_client(config: &SearchConfig, provider: &str) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.clone())
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|source| ProviderError::Transport {
            provider: provider.to_string(),
            source,
        })
}

fn request_error(provider: &str, timeout: Duration, source: reqwest::Error) -> ProviderError {
    if source.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            secs: timeout.as_secs(),
        }
    } else if source.is_decode() {
        ProviderError::Malformed {
            provider: provider.to_string(),
            reason: source.to_string(),
        }
    } else {
        ProviderError::Transport {
            provider: provider.to_string(),
            source,
        }
    }
}

async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        provider: provider.to_string(),
        status,
        body,
    })
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

/// Tavily search API client
#[derive(Clone)]
pub struct TavilySearch {
    client: Client,
    api_key: String,
    timeout: Duration,
}

impl TavilySearch {
    pub fn new(api_key: String, config: &SearchConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config, "tavily")?,
            api_key,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            include_answer: true,
            max_results,
        };

        let response = self
            .client
            .post(TAVILY_URL)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("tavily", self.timeout, e))?;
        let data: TavilyResponse = check_status("tavily", response)
            .await?
            .json()
            .await
            .map_err(|e| request_error("tavily", self.timeout, e))?;

        Ok(data
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(max_results)
            .map(|r| SearchResult::new(r.title, r.url, r.content, "tavily", r.score))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DdgResponse {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<DdgTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DdgTopic {
    Entry {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<DdgTopic>,
    },
}

impl DdgTopic {
    fn flatten_into(self, out: &mut Vec<(String, String)>) {
        match self {
            Self::Entry { text, first_url } => out.push((text, first_url)),
            Self::Group { topics } => topics.into_iter().for_each(|t| t.flatten_into(out)),
        }
    }
}

/// DuckDuckGo Instant Answer API client
#[derive(Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    timeout: Duration,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config, "duckduckgo")?,
            timeout: config.timeout,
        })
    }

    fn parse(data: DdgResponse, max_results: usize) -> Vec<SearchResult> {
        let mut results = Vec::new();

        if !data.abstract_text.is_empty() && !data.abstract_url.is_empty() {
            let title = if data.heading.is_empty() {
                data.abstract_url.clone()
            } else {
                data.heading.clone()
            };
            results.push(SearchResult::new(
                title,
                data.abstract_url,
                data.abstract_text,
                "duckduckgo",
                0.5,
            ));
        }

        let mut topics = Vec::new();
        for topic in data.related_topics {
            topic.flatten_into(&mut topics);
        }
        for (text, url) in topics {
            if url.is_empty() || results.iter().any(|r| r.url == url) {
                continue;
            }
            let title = text.split(" - ").next().unwrap_or(&text).to_string();
            results.push(SearchResult::new(title, url, text, "duckduckgo", 0.5));
        }

        results.truncate(max_results);
        results
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let response = self
            .client
            .get(DUCKDUCKGO_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| request_error("duckduckgo", self.timeout, e))?;
        let data: DdgResponse = check_status("duckduckgo", response)
            .await?
            .json()
            .await
            .map_err(|e| request_error("duckduckgo", self.timeout, e))?;

        Ok(Self::parse(data, max_results))
    }
}

/// Search chain plus page fetching
#[derive(Clone)]
pub struct WebSearch {
    providers: Vec<Arc<dyn SearchProvider>>,
    client: Client,
    timeout: Duration,
    default_max_results: usize,
}

impl WebSearch {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        config: &SearchConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            providers,
            client: http_client(config, "web")?,
            timeout: config.timeout,
            default_max_results: config.max_results,
        })
    }

    /// Tavily (when keyed) followed by DuckDuckGo
    pub fn from_config(config: &SearchConfig) -> Result<Self, ProviderError> {
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let Some(key) = &config.tavily_api_key {
            providers.push(Arc::new(TavilySearch::new(key.clone(), config)?));
        }
        providers.push(Arc::new(DuckDuckGoSearch::new(config)?));

        info!(
            "Initialized web search: providers=[{}], timeout={}s",
            providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(", "),
            config.timeout.as_secs()
        );
        Self::new(providers, config)
    }

    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    /// Query each provider in turn; empty when every provider fails or finds nothing
    pub async fn search(&self, query: &str, max_results: Option<usize>) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return vec![];
        }
        let max_results = max_results.unwrap_or(self.default_max_results);

        for provider in &self.providers {
            match provider.search(query, max_results).await {
                Ok(results) if !results.is_empty() => {
                    info!(
                        "{} search returned {} results for: {}",
                        provider.name(),
                        results.len(),
                        truncate_chars(query, 100)
                    );
                    return results;
                }
                Ok(_) => debug!("{} search returned no results", provider.name()),
                Err(e) => warn!("{} search failed: {}", provider.name(), e),
            }
        }

        warn!("All search providers failed");
        vec![]
    }

    /// Fetch a page and reduce it to plain text
    pub async fn fetch_page_text(&self, raw_url: &str) -> Result<String, ProviderError> {
        let url = url::Url::parse(raw_url.trim()).map_err(|e| ProviderError::Malformed {
            provider: "web".to_string(),
            reason: format!("invalid url {}: {}", raw_url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ProviderError::Malformed {
                provider: "web".to_string(),
                reason: format!("unsupported url: {}", raw_url),
            });
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error("web", self.timeout, e))?;
        let body = check_status("web", response)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error("web", self.timeout, e))?;

        let text = html_to_text(&body).map_err(|reason| ProviderError::Malformed {
            provider: "web".to_string(),
            reason,
        })?;
        info!("Extracted {} characters from {}", text.len(), url);
        Ok(text)
    }
}

/// Render HTML to text and collapse whitespace
pub fn html_to_text(html: &[u8]) -> Result<String, String> {
    let rendered = html2text::from_read(html, 120).map_err(|e| e.to_string())?;
    Ok(rendered.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
