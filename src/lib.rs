//! Gratitude Limiter - per-client token bucket rate limiting
//!
//! This crate implements the request rate limiter used by the Gratitude Jar
//! web application: a registry of continuously refilling token buckets keyed
//! by client address, a cancellable sweeper that evicts idle buckets, and an
//! axum middleware that answers `429 Too Many Requests` when a client's
//! bucket is empty.
//!
//! ```
//! use gratitude_limiter::ratelimit::RateLimiterRegistry;
//!
//! let registry = RateLimiterRegistry::new(10.0, 20.0).unwrap();
//! for _ in 0..20 {
//!     assert!(registry.allow("198.51.100.7"));
//! }
//! assert!(!registry.allow("198.51.100.7"));
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
