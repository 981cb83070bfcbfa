//! Tool and Research Caches
//!
//! Process-wide caches shared by every request. Keys are SHA256 digests so
//! equal arguments hit regardless of how the caller built them.

use crate::agent::{ResearchOutcome, ToolOutput};
use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Research results stay fresh for 30 minutes
const RESULT_TTL_SECS: u64 = 30 * 60;

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
}

/// Hit/miss counters shared by clones of a cache
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self, entries: u64) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            entries,
            hits,
            misses,
            hit_rate_percent: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Cache of successful tool outputs
#[derive(Clone)]
pub struct ToolCache {
    cache: Cache<String, ToolOutput>,
    counters: Arc<Counters>,
    enabled: bool,
}

impl ToolCache {
    /// Create new cache with TTL
    pub fn new(max_entries: u64, ttl_secs: u64, enabled: bool) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            cache,
            counters: Arc::new(Counters::default()),
            enabled,
        }
    }

    /// Compute cache key from tool name and arguments
    ///
    /// Key = SHA256(tool_name + NUL + canonical JSON args). `serde_json`
    /// objects keep their keys sorted, so the serialization is canonical.
    pub fn compute_key(tool_name: &str, args: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tool_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(args.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Get cached output
    pub async fn get(&self, key: &str) -> Option<ToolOutput> {
        if !self.enabled {
            return None;
        }

        let found = self.cache.get(key).await;
        self.counters.record(found.is_some());
        debug!(
            "Tool cache {}: {}",
            if found.is_some() { "HIT" } else { "MISS" },
            short(key)
        );
        found
    }

    /// Store output in cache
    pub async fn set(&self, key: &str, output: ToolOutput) {
        if !self.enabled {
            return;
        }

        self.cache.insert(key.to_string(), output).await;
        debug!("Tool cache SET: {}", short(key));
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.stats(self.cache.entry_count())
    }

    /// Clear all entries and counters
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.counters.reset();
    }
}

/// Cache of completed research outcomes keyed by query and result count
#[derive(Clone)]
pub struct ResultCache {
    cache: Cache<String, ResearchOutcome>,
    counters: Arc<Counters>,
    enabled: bool,
}

impl ResultCache {
    pub fn new(max_entries: u64, enabled: bool) -> Self {
        Self::with_ttl(max_entries, Duration::from_secs(RESULT_TTL_SECS), enabled)
    }

    pub fn with_ttl(max_entries: u64, ttl: Duration, enabled: bool) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            counters: Arc::new(Counters::default()),
            enabled,
        }
    }

    /// Key = SHA256(normalized query + result count)
    pub fn compute_key(query: &str, max_results: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(max_results.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<ResearchOutcome> {
        if !self.enabled {
            return None;
        }
        let found = self.cache.get(key).await;
        self.counters.record(found.is_some());
        found
    }

    pub async fn set(&self, key: &str, outcome: ResearchOutcome) {
        if self.enabled {
            self.cache.insert(key.to_string(), outcome).await;
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.stats(self.cache.entry_count())
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.counters.reset();
    }
}

fn short(key: &str) -> &str {
    key.get(..16).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EvidenceItem;
    use serde_json::json;

    fn output(text: &str) -> ToolOutput {
        ToolOutput {
            content: json!({ "text": text }),
            evidence: vec![EvidenceItem::new("https://example.com", text, 0.5)],
        }
    }

    #[tokio::test]
    async fn test_cache_hit_miss() {
        let cache = ToolCache::new(100, 3600, true);
        let key = ToolCache::compute_key("search_web", &json!({ "query": "rust" }));

        // Miss
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, output("hello")).await;

        // Hit
        let result = cache.get(&key).await;
        assert_eq!(result.unwrap().evidence[0].text, "hello");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate_percent - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = ToolCache::new(100, 3600, false);
        let key = ToolCache::compute_key("search_web", &json!({}));
        cache.set(&key, output("x")).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_key_ignores_argument_order() {
        let a = json!({ "query": "rust", "max_results": 3 });
        let b = json!({ "max_results": 3, "query": "rust" });
        assert_eq!(
            ToolCache::compute_key("search_web", &a),
            ToolCache::compute_key("search_web", &b)
        );
    }

    #[test]
    fn test_key_varies_with_tool() {
        let args = json!({ "text": "abc" });
        assert_ne!(
            ToolCache::compute_key("summarize_text", &args),
            ToolCache::compute_key("extract_entities", &args)
        );
    }

    #[test]
    fn test_result_key_normalizes_query() {
        assert_eq!(
            ResultCache::compute_key("  What is Rust? ", 5),
            ResultCache::compute_key("what is rust?", 5)
        );
        assert_ne!(
            ResultCache::compute_key("what is rust?", 5),
            ResultCache::compute_key("what is rust?", 6)
        );
    }
}
