//! Exponential retry backoff

use std::time::Duration;

/// Exponential backoff: `initial * multiplier^attempt`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial.as_millis() as f64 * factor;

        if !millis.is_finite() || millis >= self.max.as_millis() as f64 {
            self.max
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}
