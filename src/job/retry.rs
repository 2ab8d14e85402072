//! Exponential backoff between failed attempts.

use crate::config::EngineConfig;
use rand::Rng;
use std::time::Duration;

/// Delay schedule the engine applies before rescheduling a failed job.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomization in `0.0..=1.0` applied around the computed delay.
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(600),
            jitter_factor: 0.25,
        }
    }
}

impl From<&EngineConfig> for BackoffPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_secs(config.backoff_max_seconds),
            jitter_factor: config.backoff_jitter,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the attempt following `failures` failed ones (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        let base = self.base_delay.saturating_mul(2_u32.saturating_pow(exponent));
        let capped = base.min(self.max_delay);
        apply_jitter(capped, self.jitter_factor).min(self.max_delay)
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }
    let range = duration.as_secs_f64() * jitter_factor.clamp(0.0, 1.0);
    let offset = rand::rng().random_range(-range..=range);
    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
