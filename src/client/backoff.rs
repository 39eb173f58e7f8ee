//! Reconnect backoff schedule

use std::time::Duration;

/// Delay before the first reconnect
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for any reconnect delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential backoff: attempt `k` (0-indexed) waits `min(base * 2^k, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before reconnect attempt `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = Duration::from_millis(base_ms.saturating_mul(factor));
        delay.min(self.max)
    }
}
