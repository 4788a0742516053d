//! Retry delay policy for the outbox relay.
//!
//! The delay for attempt `n` (zero-based) is `first * 2^n`, capped at `max`.
//! With jitter enabled the result is drawn uniformly from `[base/2, base]`,
//! so relays restarted together do not retry in lockstep. The base is always
//! derived from the attempt number, never from a previous jittered value.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Exponential backoff with optional equal jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_first_ms")]
    pub first_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    /// Whether to randomize delays.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_ms: default_first_ms(),
            max_ms: default_max_ms(),
            jitter: default_jitter(),
        }
    }
}

const fn default_first_ms() -> u64 {
    200
}

const fn default_max_ms() -> u64 {
    30_000
}

const fn default_jitter() -> bool {
    true
}

impl RetryPolicy {
    /// Un-jittered delay for `attempt`.
    pub fn base(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let ms = self.first_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// Delay to wait before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base(attempt);
        if !self.jitter {
            return base;
        }
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(self.max_ms);
        let half = base_ms.checked_div(2).unwrap_or_default();
        let jittered = rand::rng().random_range(half..=base_ms);
        Duration::from_millis(jittered)
    }
}
