use std::time::Duration;

/// Doubling backoff for background loops such as live-query polling.
///
/// Attempt `n` waits `base * 2^n`, never less than a server hint and never
/// more than `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let backoff = self.base.saturating_mul(factor);
        let hint = Duration::from_millis(retry_after_hint_ms.unwrap_or_default());
        backoff.max(hint).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(1_000, 60_000)
    }
}
