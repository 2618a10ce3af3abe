//! Bounded exponential backoff.
//!
//! `delay(n) = min(max_delay, initial_delay * 2^(n-1))` for the n-th failed
//! attempt. With `max_retries` retries a query gets `max_retries + 1` attempts.
//! The curve itself is a jitter-free [`backon::ExponentialBuilder`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use backon::ExponentialBuilder;
use common::config::RetrySettings;

/// Retry budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Same curve with a different retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff builder yielding exactly `max_retries` delays.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_factor(2.0)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays without waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.delays().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}
