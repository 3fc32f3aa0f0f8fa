//! Reconnect policy for the explicit recovery path.
//!
//! A dropped transport leaves the session `Disconnected`; nothing in
//! the client dials out again on its own. Callers that want recovery
//! invoke [`Client::reconnect`](crate::Client::reconnect), and this
//! policy bounds how hard that call tries.

use std::time::Duration;

/// Backoff schedule for [`Client::reconnect`](crate::Client::reconnect).
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the second attempt (the first is immediate).
    pub initial_delay: Duration,
    /// Ceiling for the inter-attempt delay.
    pub max_delay: Duration,
    /// Multiplier applied per failed attempt.
    pub backoff_factor: f64,
    /// Attempts before giving up. `0` means exactly one attempt and
    /// no retries.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to sleep before attempt `attempt` (1-indexed; attempt 0
    /// never sleeps). Includes up to 25% deterministic jitter so a
    /// fleet of providers does not re-dial in lockstep.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.initial_delay.as_millis() as f64
            * self.backoff_factor.powi(attempt.saturating_sub(1).min(24) as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let jitter = capped_ms * 0.25 * fraction(attempt);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether `attempt` (0-indexed) is past the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

/// Deterministic fraction in `[0, 1)` from the attempt number. Spread,
/// not randomness, is what matters here.
fn fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2654435761);
    f64::from(hash) / f64::from(u32::MAX)
}
