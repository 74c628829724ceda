//! Outbound HTTP plumbing: the client seam, credential decorators, and
//! per-provider admission control.

mod basic;
mod client;
mod rate_limit;
pub mod auth;

pub use basic::BasicClient;
pub use client::{HttpClient, SharedClient};
pub use rate_limit::RateLimiter;
