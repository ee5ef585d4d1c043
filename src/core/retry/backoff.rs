//! Randomized exponential backoff

use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Default upper bound for any single delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Default growth factor of the base interval
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Exponential backoff with a random stretch of up to one growth step
///
/// The base interval for retry `n` (zero based) is
/// `initial * multiplier^n`, capped at `max`. The actual delay is
/// `base * (1 + r * (multiplier - 1))` with `r` in `[0, 1)`, again capped at
/// `max`. Every delay therefore lies in `[initial, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl BackoffPolicy {
    /// Creates a policy
    ///
    /// A `max_delay` below `initial_delay` is raised to it and a multiplier
    /// below 1 is treated as 1.
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
        }
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Base interval before jitter for the given retry
    pub fn base_delay(&self, retry: u32) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(base.min(max))
    }

    /// Delay for the given retry with jitter factor `r` in `[0, 1)`
    pub fn delay(&self, retry: u32, r: f64) -> Duration {
        let r = r.clamp(0.0, 1.0);
        let base = self.base_delay(retry).as_secs_f64();
        let stretched = base * (1.0 + r * (self.multiplier - 1.0));
        Duration::from_secs_f64(stretched.min(self.max_delay.as_secs_f64()))
    }

    /// Delay for the given retry with a freshly drawn jitter factor
    pub fn next_delay(&self, retry: u32) -> Duration {
        self.delay(retry, rand::random::<f64>())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER)
    }
}
