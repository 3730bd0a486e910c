//! Per-key bucket registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::bucket::{Decision, TokenBucket};
use super::clock::{Clock, MonotonicClock};
use crate::config::LimiterConfig;
use crate::error::Result;

/// Maps keys (typically client IPs) to their token buckets.
///
/// Buckets are created lazily at full capacity on first lookup and removed
/// by [`RateLimiterRegistry::cleanup`] once idle. The registry is the only
/// long-lived owner of its buckets; callers resolve a key for each decision
/// instead of holding on to a bucket.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiterRegistry {
    /// Buckets indexed by key
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
    /// Refill rate for new buckets
    rate: f64,
    /// Capacity for new buckets
    capacity: f64,
    clock: Arc<dyn Clock>,
}

impl RateLimiterRegistry {
    /// Create a registry whose buckets refill at `rate` tokens per second up to `capacity`.
    pub fn new(rate: f64, capacity: f64) -> Result<Self> {
        Self::with_clock(rate, capacity, Arc::new(MonotonicClock))
    }

    /// Create a registry from the bucket settings of a [`LimiterConfig`].
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        Self::new(config.rate, config.capacity)
    }

    /// Create a registry driven by the given clock.
    pub fn with_clock(rate: f64, capacity: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        LimiterConfig::new(rate, capacity).validate_bucket()?;
        Ok(Self {
            buckets: RwLock::new(HashMap::new()),
            rate,
            capacity,
            clock,
        })
    }

    /// Get the bucket for `key`, creating a full one if none exists.
    ///
    /// Concurrent first lookups for the same key always observe the same
    /// bucket: a miss under the read lock is re-checked under the write lock
    /// before inserting.
    pub fn get_limiter(&self, key: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return Arc::clone(bucket);
        }

        let mut buckets = self.buckets.write();
        if let Some(bucket) = buckets.get(key) {
            return Arc::clone(bucket);
        }

        debug!(
            key = %key,
            rate = self.rate,
            capacity = self.capacity,
            "Creating new token bucket"
        );
        let bucket = Arc::new(TokenBucket::with_clock(
            self.rate,
            self.capacity,
            Arc::clone(&self.clock),
        ));
        buckets.insert(key.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Resolve `key` and spend one token if available.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Resolve `key` and return the full decision.
    pub fn check(&self, key: &str) -> Decision {
        let decision = self.get_limiter(key).check();
        if decision.allowed {
            trace!(key = %key, remaining = decision.remaining, "Request allowed");
        } else {
            debug!(key = %key, retry_after = ?decision.retry_after, "Rate limit exceeded");
        }
        decision
    }

    /// Remove every bucket that has been idle for longer than `max_age`.
    ///
    /// Returns the number of buckets removed. Only the map lock is taken;
    /// bucket timestamps are read without waiting on in-flight decisions. A
    /// caller still holding an evicted bucket finishes its decision normally;
    /// the next lookup for that key starts a fresh, full bucket.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill()) <= max_age);
        before - buckets.len()
    }

    /// Whether a bucket currently exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.buckets.read().contains_key(key)
    }

    /// Get the number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    /// Whether no buckets exist.
    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    /// Drop all buckets.
    pub fn clear(&self) {
        self.buckets.write().clear();
    }

    /// Refill rate applied to new buckets.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Capacity applied to new buckets.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

impl std::fmt::Debug for RateLimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterRegistry")
            .field("rate", &self.rate)
            .field("capacity", &self.capacity)
            .field("buckets", &self.len())
            .finish()
    }
}
