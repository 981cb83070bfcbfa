//! Transport Retry Policy
//!
//! Exponential backoff with jitter for transient provider failures (rate
//! limits, 5xx, dropped connections). This sits below the agent loop: the
//! loop itself never retries a provider error.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first call
    pub max_retries: usize,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 - 1.0); 0 disables jitter
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter = capped * self.jitter_factor * (rand_simple() * 2.0 - 1.0);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// Per-call timeout that lets every retry, plus its backoff, fit inside `deadline`
    pub fn attempt_timeout(&self, deadline: Duration) -> Duration {
        let calls = (self.max_retries + 1) as f64;
        let backoff: f64 = (0..self.max_retries)
            .map(|attempt| {
                let base = self.initial_delay.as_secs_f64()
                    * self.backoff_multiplier.powi(attempt as i32);
                base.min(self.max_delay.as_secs_f64()) * (1.0 + self.jitter_factor)
            })
            .sum();

        let remaining = deadline.as_secs_f64() - backoff;
        if remaining > 0.0 {
            Duration::from_secs_f64(remaining / calls)
        } else {
            deadline / (self.max_retries as u32 + 1)
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} (retry {}/{} in {:?})",
                        err,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Simple pseudo-random for jitter (avoid heavy rand dependency)
fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}
