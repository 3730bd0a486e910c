//! HTTP integration: client key extraction, enforcement middleware and server.

mod client_ip;
mod middleware;
mod server;

pub use client_ip::{client_ip, UNKNOWN_CLIENT, X_FORWARDED_FOR, X_REAL_IP};
pub use middleware::{rate_limit, RateLimitState, RATE_LIMIT_MESSAGE};
pub use server::{router, HttpServer};
