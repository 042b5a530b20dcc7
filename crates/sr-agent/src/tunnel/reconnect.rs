//! Reconnect delay schedule

use std::time::Duration;

use rand::Rng;

use sr_core::config::BackoffConfig;

/// Exponential backoff with proportional jitter.
///
/// The first delay equals the initial value; each later one is multiplied
/// until capped. Jitter only ever lengthens a delay.
pub struct ExponentialBackoff {
    initial: Duration,
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Build from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Build with explicit parameters. `jitter` is clamped to `0.0..=1.0`;
    /// NaN disables it.
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        let jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
        Self {
            initial,
            next: initial,
            max,
            multiplier: multiplier.max(1.0),
            jitter,
            attempts: 0,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.attempts = self.attempts.saturating_add(1);

        let grown = base.as_secs_f64() * self.multiplier;
        self.next = Duration::from_secs_f64(grown.min(self.max.as_secs_f64()));

        if self.jitter == 0.0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        base + base.mul_f64(extra)
    }

    /// Start over from the initial delay, e.g. after a session that
    /// registered successfully
    pub fn reset(&mut self) {
        self.next = self.initial;
        self.attempts = 0;
    }

    /// Delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
