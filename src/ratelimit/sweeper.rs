//! Periodic eviction of idle buckets.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use super::registry::RateLimiterRegistry;
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};

/// Background task that calls [`RateLimiterRegistry::cleanup`] on a fixed
/// interval until a shutdown signal resolves.
#[derive(Debug, Clone)]
pub struct Sweeper {
    registry: Arc<RateLimiterRegistry>,
    /// Time between sweeps
    interval: Duration,
    /// Idle time after which a bucket is evicted
    max_age: Duration,
}

impl Sweeper {
    /// Create a sweeper. Fails if `interval` is zero.
    pub fn new(
        registry: Arc<RateLimiterRegistry>,
        interval: Duration,
        max_age: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(LimiterError::InvalidInterval("interval"));
        }
        Ok(Self {
            registry,
            interval,
            max_age,
        })
    }

    /// Create a sweeper from the eviction settings of a [`LimiterConfig`].
    pub fn from_config(registry: Arc<RateLimiterRegistry>, config: &LimiterConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            registry,
            config.cleanup_interval_duration(),
            config.max_age_duration(),
        )
    }

    /// Run a single eviction pass and return how many buckets were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.registry.cleanup(self.max_age);
        if removed > 0 {
            info!(
                removed = removed,
                remaining = self.registry.len(),
                "Evicted idle rate limit buckets"
            );
        } else {
            trace!(remaining = self.registry.len(), "Sweep found no idle buckets");
        }
        removed
    }

    /// Sweep every `interval` until `shutdown` resolves.
    ///
    /// The first sweep happens one full interval after start. Returns the
    /// total number of buckets evicted.
    pub async fn run_until<F>(self, shutdown: F) -> u64
    where
        F: Future<Output = ()> + Send,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        interval.tick().await;

        tokio::pin!(shutdown);
        let mut total = 0u64;

        debug!(
            interval = ?self.interval,
            max_age = ?self.max_age,
            "Bucket sweeper started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    total += self.sweep() as u64;
                }
            }
        }

        debug!(evicted = total, "Bucket sweeper stopped");
        total
    }

    /// Spawn [`Sweeper::run_until`] onto the current tokio runtime.
    pub fn spawn<F>(self, shutdown: F) -> JoinHandle<u64>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run_until(shutdown))
    }
}
