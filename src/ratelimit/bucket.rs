//! Token bucket implementation.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::clock::{Clock, MonotonicClock};

/// Outcome of a single rate decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Tokens left after this decision
    pub remaining: f64,
    /// How long until one full token is available (denials only)
    pub retry_after: Option<Duration>,
}

/// A continuously refilling token bucket for one key.
///
/// The bucket starts full. Every call to [`TokenBucket::allow`] first credits
/// `elapsed * rate` tokens (capped at `capacity`) and then tries to spend one.
/// The refill-and-spend sequence runs under a per-bucket mutex, so concurrent
/// callers can never spend the same token twice.
///
/// The refill timestamp is also published atomically, so idle checks such as
/// [`RateLimiterRegistry::cleanup`](super::RateLimiterRegistry::cleanup) never
/// wait on the mutex.
pub struct TokenBucket {
    /// Tokens added per second
    rate: f64,
    /// Maximum tokens the bucket can hold
    capacity: f64,
    /// Current tokens; the lock covers the whole refill-and-spend sequence
    tokens: Mutex<f64>,
    /// Creation instant, the origin for `last_refill_nanos`
    origin: Instant,
    /// Nanoseconds from `origin` to the last refill. Written only under `tokens`.
    last_refill_nanos: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create a full bucket driven by the process monotonic clock.
    ///
    /// Parameters are not validated here; see
    /// [`LimiterConfig::validate`](crate::config::LimiterConfig::validate).
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self::with_clock(rate, capacity, Arc::new(MonotonicClock))
    }

    /// Create a full bucket driven by the given clock.
    pub fn with_clock(rate: f64, capacity: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            rate,
            capacity,
            tokens: Mutex::new(capacity),
            origin: clock.now(),
            last_refill_nanos: AtomicU64::new(0),
            clock,
        }
    }

    /// Refill, then try to spend one token.
    ///
    /// Returns `true` if the request is allowed.
    pub fn allow(&self) -> bool {
        self.check().allowed
    }

    /// Refill, then try to spend one token, returning decision metadata.
    pub fn check(&self) -> Decision {
        let mut tokens = self.tokens.lock();
        // Read the clock under the lock so last_refill never moves backwards.
        let now = self.clock.now();
        let last_refill = self.last_refill();
        let elapsed = now.saturating_duration_since(last_refill).as_secs_f64();
        *tokens = (*tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill_nanos
            .store(self.nanos_since_origin(now), Ordering::Release);

        if *tokens >= 1.0 {
            *tokens -= 1.0;
            Decision {
                allowed: true,
                remaining: *tokens,
                retry_after: None,
            }
        } else {
            let deficit = 1.0 - *tokens;
            Decision {
                allowed: false,
                remaining: *tokens,
                retry_after: Duration::try_from_secs_f64(deficit / self.rate).ok(),
            }
        }
    }

    /// Tokens that would be available right now, without spending or
    /// updating the refill timestamp.
    pub fn available_tokens(&self) -> f64 {
        let tokens = self.tokens.lock();
        let elapsed = self.idle_for().as_secs_f64();
        (*tokens + elapsed * self.rate).min(self.capacity)
    }

    /// When tokens were last credited. Never blocks on an in-flight decision.
    pub fn last_refill(&self) -> Instant {
        self.origin + Duration::from_nanos(self.last_refill_nanos.load(Ordering::Acquire))
    }

    /// How long this bucket has gone without a decision.
    pub fn idle_for(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.last_refill())
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum tokens.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn nanos_since_origin(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.origin).as_nanos()).unwrap_or(u64::MAX)
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("capacity", &self.capacity)
            .field("tokens", &*self.tokens.lock())
            .field("last_refill", &self.last_refill())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    fn manual_bucket(rate: f64, capacity: f64) -> (TokenBucket, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let bucket = TokenBucket::with_clock(rate, capacity, clock.clone());
        (bucket, clock)
    }

    #[test]
    fn test_new_bucket_is_full() {
        let (bucket, _clock) = manual_bucket(10.0, 20.0);
        assert_eq!(bucket.available_tokens(), 20.0);
        assert_eq!(bucket.rate(), 10.0);
        assert_eq!(bucket.capacity(), 20.0);
    }

    #[test]
    fn test_burst_then_reject() {
        let (bucket, _clock) = manual_bucket(10.0, 20.0);

        for i in 0..20 {
            assert!(bucket.allow(), "request {} should be allowed", i + 1);
        }

        // The 21st request should be rejected
        assert!(!bucket.allow());
    }

    #[test]
    fn test_refill_after_wait_allows_exactly_one() {
        let (bucket, clock) = manual_bucket(10.0, 20.0);
        for _ in 0..20 {
            bucket.allow();
        }
        assert!(!bucket.allow());

        clock.advance(Duration::from_millis(100));
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[test]
    fn test_tokens_saturate_at_capacity() {
        let (bucket, clock) = manual_bucket(10.0, 20.0);
        bucket.allow();

        clock.advance(Duration::from_secs(3600));
        assert_eq!(bucket.available_tokens(), 20.0);

        for _ in 0..20 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());
    }

    #[test]
    fn test_single_token_bucket() {
        let (bucket, clock) = manual_bucket(1.0, 1.0);

        assert!(bucket.allow());
        assert!(!bucket.allow());

        clock.advance(Duration::from_secs(1));
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[test]
    fn test_fractional_refill_accumulates() {
        let (bucket, clock) = manual_bucket(2.0, 1.0);
        assert!(bucket.allow());

        // Two quarter-second steps add up to one token
        clock.advance(Duration::from_millis(250));
        assert!(!bucket.allow());
        clock.advance(Duration::from_millis(250));
        assert!(bucket.allow());
    }

    #[test]
    fn test_denied_decision_reports_retry_after() {
        let (bucket, _clock) = manual_bucket(2.0, 1.0);
        let first = bucket.check();
        assert!(first.allowed);
        assert_eq!(first.remaining, 0.0);
        assert!(first.retry_after.is_none());

        let denied = bucket.check();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0.0);
        assert_eq!(denied.retry_after, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_denial_does_not_spend() {
        let (bucket, clock) = manual_bucket(10.0, 1.0);
        assert!(bucket.allow());
        clock.advance(Duration::from_millis(50));
        assert!(!bucket.allow());
        assert!((bucket.available_tokens() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decision_updates_last_refill() {
        let (bucket, clock) = manual_bucket(1.0, 5.0);
        let created = bucket.last_refill();

        clock.advance(Duration::from_secs(7));
        assert_eq!(bucket.idle_for(), Duration::from_secs(7));
        // Reading tokens is not activity
        bucket.available_tokens();
        assert_eq!(bucket.last_refill(), created);

        bucket.allow();
        assert_eq!(bucket.last_refill(), created + Duration::from_secs(7));
        assert_eq!(bucket.idle_for(), Duration::ZERO);
    }

    #[test]
    fn test_concurrent_callers_never_double_spend() {
        let (bucket, _clock) = manual_bucket(10.0, 50.5);
        let allowed = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..20 {
                        if bucket.allow() {
                            allowed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(allowed.into_inner(), 50);
    }

    #[test]
    fn test_real_clock_refill() {
        let bucket = TokenBucket::new(10.0, 1.0);
        assert!(bucket.allow());
        assert!(!bucket.allow());

        std::thread::sleep(Duration::from_millis(120));
        assert!(bucket.allow());
    }
}
