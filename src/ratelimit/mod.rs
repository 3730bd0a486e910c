//! Token bucket rate limiting and per-key state management.

mod bucket;
mod clock;
mod registry;
mod sweeper;

pub use bucket::{Decision, TokenBucket};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use registry::RateLimiterRegistry;
pub use sweeper::Sweeper;
