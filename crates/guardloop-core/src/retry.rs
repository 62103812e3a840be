//! Retry configuration and backoff calculation.
//!
//! Portable, sync-only building blocks: the async retry execution lives in
//! `guardloop-adapters` (which has access to tokio). The policy matches the
//! adapter contract: up to 3 attempts with exponential backoff
//! `base · 2^(attempt-1)`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum attempts (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Retry policy for subprocess execution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, first try included (default: 3).
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Returns `None` once attempts are exhausted; otherwise
    /// `base · 2^(attempt-1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Some(Duration::from_millis(
            self.base_delay_ms.saturating_mul(factor),
        ))
    }

    /// Upper bound on total time spent waiting between attempts.
    #[must_use]
    pub fn backoff_budget(&self) -> Duration {
        (1..self.max_attempts)
            .filter_map(|a| self.delay_after(a))
            .sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn budget_sums_intermediate_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_budget(), Duration::from_secs(3));
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 1000,
        };
        assert_eq!(policy.delay_after(1), None);
        assert_eq!(policy.backoff_budget(), Duration::ZERO);
    }
}
