//! Request pacing and retry backoff
//!
//! This module handles:
//! - A fixed delay after every item, replaced by a longer delay at every batch boundary
//! - Bounded retry schedules (linear or exponential, capped)
//! - The `Delay` seam, so tests can observe requested sleeps without waiting

use crate::config::{BackoffStrategy, CrawlerConfig};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that can wait
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records every requested sleep and returns immediately
///
/// Lets tests inspect pacing without waiting.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

/// Bounded retry schedule for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff,
            base: Duration::from_millis(config.backoff_base_ms),
            factor: config.backoff_factor,
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Upper bound on fetch attempts for one item
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Linear => self.base.saturating_mul(retry),
            BackoffStrategy::Exponential => {
                let multiplier = self.factor.max(1).saturating_pow(retry - 1);
                self.base.saturating_mul(multiplier)
            }
        };
        delay.min(self.max)
    }
}

/// Fixed, non-adaptive spacing between items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacer {
    pub item_delay: Duration,
    pub batch_delay: Duration,
    pub batch_size: usize,
}

impl Pacer {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            item_delay: config.item_delay(),
            batch_delay: config.batch_delay(),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Delay after the item at snapshot `position`
    ///
    /// Batches are aligned to snapshot positions, so a resumed run keeps the
    /// same batch boundaries.
    pub fn delay_after(&self, position: usize) -> Duration {
        if (position + 1) % self.batch_size == 0 {
            self.batch_delay
        } else {
            self.item_delay
        }
    }
}

/// Applies pacing and backoff through a `Delay`
pub struct Scheduler {
    delay: Arc<dyn Delay>,
    retry: RetryPolicy,
    pacer: Pacer,
}

impl Scheduler {
    pub fn new(delay: Arc<dyn Delay>, retry: RetryPolicy, pacer: Pacer) -> Self {
        Self {
            delay,
            retry,
            pacer,
        }
    }

    pub fn from_config(config: &CrawlerConfig, delay: Arc<dyn Delay>) -> Self {
        Self::new(
            delay,
            RetryPolicy::from_config(config),
            Pacer::from_config(config),
        )
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Waits the pacing delay after the item at `position`
    pub async fn pace(&self, position: usize) {
        let wait = self.pacer.delay_after(position);
        if wait == self.pacer.batch_delay && wait != self.pacer.item_delay {
            tracing::debug!("Batch boundary at position {}, waiting {:?}", position, wait);
        }
        self.delay.sleep(wait).await;
    }

    /// Waits before retry number `retry`
    pub async fn backoff(&self, retry: u32) {
        self.delay.sleep(self.retry.delay_for(retry)).await;
    }
}
