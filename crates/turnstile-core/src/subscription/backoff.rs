use std::time::Duration;

use crate::config::SubscriptionConfig;

/// Largest jitter fraction a policy will apply, whatever it was configured with.
pub const MAX_JITTER_RATIO: f64 = 0.35;

/// Reconnect schedule: `min(cap, base * 2^attempt) * (1 + jitter)` with `jitter` drawn
/// uniformly from `[0, jitter_ratio]`, for at most `max_attempts` attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&SubscriptionConfig::default())
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn from_config(config: &SubscriptionConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            cap: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
            jitter_ratio: config.jitter_ratio.clamp(0.0, MAX_JITTER_RATIO),
        }
    }

    /// The capped exponential term, without jitter.
    #[must_use]
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay for `attempt` with an explicit jitter fraction, clamped to the policy's ratio.
    #[must_use]
    pub fn compute_delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = jitter.clamp(0.0, self.ratio());
        self.exponential(attempt).mul_f64(1.0 + jitter)
    }

    #[must_use]
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let ratio = self.ratio();
        let jitter = if ratio > 0.0 {
            rand::rng().random_range(0.0..=ratio)
        } else {
            0.0
        };
        self.compute_delay_with_jitter(attempt, jitter)
    }

    /// Delay before reconnect number `attempt` (zero-based), or `None` once the budget is
    /// spent.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.compute_delay(attempt))
    }

    /// Upper bound any single delay can reach.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.cap.mul_f64(1.0 + self.ratio())
    }

    fn ratio(&self) -> f64 {
        self.jitter_ratio.clamp(0.0, MAX_JITTER_RATIO)
    }
}
