//! Retry policy: exponential backoff with jitter over retryable categories.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::classification::ErrorCategory;

/// Computes delays and decides whether another retry is allowed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Whether a retry is allowed after `retries_so_far` retries of this
    /// category. Honors both the global budget and per-category caps.
    pub fn allows_retry(&self, category: ErrorCategory, retries_so_far: u32) -> bool {
        if !category.is_retryable() {
            return false;
        }
        let cap = category
            .retry_cap()
            .map(|c| c.min(self.config.max_retries))
            .unwrap_or(self.config.max_retries);
        retries_so_far < cap
    }

    /// Delay before retry number `retry_index` (0-based: the first retry is
    /// index 0 and waits roughly the base delay).
    ///
    /// The wait is `min(max_delay, base * exponential_base^n) * (1 ± jitter)`.
    pub fn delay(&self, retry_index: u32, category: ErrorCategory) -> Duration {
        let base = match category {
            ErrorCategory::RateLimit => self.config.rate_limit_base_delay,
            _ => self.config.base_delay,
        };

        let exp = self.config.exponential_base.powi(retry_index as i32);
        let raw = base.as_secs_f64() * exp;
        let capped = raw.min(self.config.max_delay.as_secs_f64());

        let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    /// Lower/upper bounds on the delay for a retry index, for assertions and
    /// telemetry.
    pub fn delay_bounds(&self, retry_index: u32, category: ErrorCategory) -> (Duration, Duration) {
        let base = match category {
            ErrorCategory::RateLimit => self.config.rate_limit_base_delay,
            _ => self.config.base_delay,
        };
        let exp = self.config.exponential_base.powi(retry_index as i32);
        let raw = base.as_secs_f64() * exp;
        let capped = raw.min(self.config.max_delay.as_secs_f64());
        let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
        (
            Duration::from_secs_f64(capped * (1.0 - jitter)),
            Duration::from_secs_f64(capped * (1.0 + jitter)),
        )
    }
}
