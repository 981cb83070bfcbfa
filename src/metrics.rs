//! Usage Statistics
//!
//! Request counters, attempts-per-request and a histogram of final
//! confidence. Shared by every request; all updates are atomic.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Confidence histogram resolution: ten buckets of width 0.1
pub const CONFIDENCE_BUCKETS: usize = 10;

/// Map a confidence in [0, 1] to its histogram bucket; 1.0 lands in the last
pub fn bucket_for(confidence: f64) -> usize {
    let clamped = if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    };
    ((clamped * CONFIDENCE_BUCKETS as f64) as usize).min(CONFIDENCE_BUCKETS - 1)
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Every request served, including those answered from the result cache
    pub total_requests: u64,
    pub accepted: u64,
    pub not_accepted: u64,
    pub failed: u64,
    pub cached_responses: u64,
    /// Mean attempts over requests that ran the loop; cached responses are excluded
    pub average_attempts: f64,
    /// Bucket `i` counts final confidences in `[i/10, (i+1)/10)`
    pub confidence_histogram: [u64; CONFIDENCE_BUCKETS],
    pub latency: LatencyStats,
}

/// Latency percentiles over the recent window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub max_ms: u64,
}

/// Real-time stats collector
pub struct AgentStats {
    total_requests: AtomicU64,
    total_attempts: AtomicU64,
    accepted: AtomicU64,
    not_accepted: AtomicU64,
    failed: AtomicU64,
    cached: AtomicU64,
    histogram: [AtomicU64; CONFIDENCE_BUCKETS],
    /// Recent request latencies (rolling window)
    latencies: RwLock<Vec<u64>>,
    max_history: usize,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl AgentStats {
    pub fn new(max_history: usize) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_attempts: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            not_accepted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            histogram: std::array::from_fn(|_| AtomicU64::new(0)),
            latencies: RwLock::new(Vec::with_capacity(max_history.min(1024))),
            max_history,
        }
    }

    /// Record a request that ran the loop to completion
    pub fn record_completed(
        &self,
        attempts: usize,
        final_confidence: f64,
        accepted: bool,
        latency: Duration,
    ) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_attempts
            .fetch_add(attempts as u64, Ordering::Relaxed);
        if accepted {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.not_accepted.fetch_add(1, Ordering::Relaxed);
        }
        self.histogram[bucket_for(final_confidence)].fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency);

        debug!(
            "Recorded request: attempts={}, confidence={:.2}, accepted={}, latency={}ms",
            attempts,
            final_confidence,
            accepted,
            latency.as_millis()
        );
    }

    /// Record a request that ended with an error
    pub fn record_failed(&self, attempts: usize, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_attempts
            .fetch_add(attempts as u64, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency);
    }

    /// Record a request answered from the result cache
    pub fn record_cached(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    fn push_latency(&self, latency: Duration) {
        let mut latencies = self.latencies.write();
        latencies.push(latency.as_millis() as u64);
        if latencies.len() > self.max_history {
            let drain_count = latencies.len() - self.max_history;
            latencies.drain(0..drain_count);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_attempts = self.total_attempts.load(Ordering::Relaxed);
        let cached = self.cached.load(Ordering::Relaxed);
        let loop_runs = total_requests.saturating_sub(cached);

        StatsSnapshot {
            total_requests,
            accepted: self.accepted.load(Ordering::Relaxed),
            not_accepted: self.not_accepted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cached_responses: cached,
            average_attempts: if loop_runs > 0 {
                total_attempts as f64 / loop_runs as f64
            } else {
                0.0
            },
            confidence_histogram: std::array::from_fn(|i| {
                self.histogram[i].load(Ordering::Relaxed)
            }),
            latency: self.latency_stats(),
        }
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let mut latencies = self.latencies.read().clone();
        if latencies.is_empty() {
            return LatencyStats::default();
        }
        latencies.sort_unstable();

        let len = latencies.len();
        LatencyStats {
            p50_ms: latencies.get(len / 2).copied().unwrap_or(0),
            p90_ms: latencies.get(len * 90 / 100).copied().unwrap_or(0),
            max_ms: latencies.last().copied().unwrap_or(0),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.total_attempts,
            &self.accepted,
            &self.not_accepted,
            &self.failed,
            &self.cached,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for bucket in &self.histogram {
            bucket.store(0, Ordering::Relaxed);
        }
        self.latencies.write().clear();
        info!("Stats reset");
    }
}

/// Timer for measuring operation latency
pub struct LatencyTimer {
    start: Instant,
    operation: String,
}

impl LatencyTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        debug!("{}: {}ms", self.operation, elapsed.as_millis());
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket_for(0.0), 0);
        assert_eq!(bucket_for(0.09), 0);
        assert_eq!(bucket_for(0.1), 1);
        assert_eq!(bucket_for(0.75), 7);
        assert_eq!(bucket_for(1.0), 9);
        assert_eq!(bucket_for(-3.0), 0);
        assert_eq!(bucket_for(f64::NAN), 0);
    }

    #[test]
    fn test_stats_recording() {
        let stats = AgentStats::new(100);

        stats.record_completed(1, 0.9, true, Duration::from_millis(100));
        stats.record_completed(3, 0.5, false, Duration::from_millis(300));
        stats.record_failed(2, Duration::from_millis(50));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.not_accepted, 1);
        assert_eq!(snap.failed, 1);
        assert!((snap.average_attempts - 2.0).abs() < f64::EPSILON);
        assert_eq!(snap.confidence_histogram[9], 1);
        assert_eq!(snap.confidence_histogram[5], 1);
        assert_eq!(snap.confidence_histogram.iter().sum::<u64>(), 2);
        assert_eq!(snap.latency.max_ms, 300);
    }

    #[test]
    fn test_cached_responses_count_as_requests() {
        let stats = AgentStats::new(100);

        stats.record_completed(3, 0.9, true, Duration::from_millis(100));
        stats.record_cached();
        stats.record_cached();

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.cached_responses, 2);
        assert!((snap.average_attempts - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_window_trims() {
        let stats = AgentStats::new(2);
        for ms in [10, 20, 30] {
            stats.record_failed(1, Duration::from_millis(ms));
        }
        assert_eq!(stats.latencies.read().len(), 2);
        assert_eq!(stats.latency_stats().max_ms, 30);
    }

    #[test]
    fn test_reset() {
        let stats = AgentStats::default();
        stats.record_completed(2, 0.8, true, Duration::from_millis(5));
        stats.record_cached();
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.cached_responses, 0);
        assert_eq!(snap.average_attempts, 0.0);
    }
}
