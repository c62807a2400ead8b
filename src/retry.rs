//! Reconnect backoff strategies for the push stream
//!
//! Delays are computed, never slept on: the stream client turns them into
//! deadlines so the orchestrator can wait on them alongside everything else.

use crate::data::{BackoffPolicy, ReconnectConfig};
use rand::Rng;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `None` means give up.
pub trait BackoffStrategy: Send {
    fn delay_for(&self, attempt: u32) -> Option<Duration>;
}

/// Same delay every time
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl BackoffStrategy for FixedBackoff {
    fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(self.delay),
        }
    }
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    fn base_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        raw.min(self.max_delay.as_millis() as f64)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let capped = self.base_delay_ms(attempt);
        let delay = if self.jitter_factor > 0.0 {
            let range = capped * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-range..=range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Some(Duration::from_millis(delay as u64))
    }
}

/// Build the strategy described by a reconnect config
pub fn build_backoff(config: &ReconnectConfig) -> Box<dyn BackoffStrategy> {
    match config.policy {
        BackoffPolicy::Fixed => {
            let mut backoff = FixedBackoff::new(config.delay);
            if let Some(max) = config.max_attempts {
                backoff = backoff.with_max_attempts(max);
            }
            Box::new(backoff)
        }
        BackoffPolicy::Exponential => {
            let mut backoff =
                ExponentialBackoff::new(config.delay, config.max_delay, config.multiplier)
                    .with_jitter(config.jitter_factor);
            if let Some(max) = config.max_attempts {
                backoff = backoff.with_max_attempts(max);
            }
            Box::new(backoff)
        }
    }
}
