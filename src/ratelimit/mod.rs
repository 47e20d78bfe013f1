//! Request budget enforcement
//!
//! Sliding-window limiters, one per API tier, shared by all workers

mod limiter;
mod tiers;

pub use limiter::{RateLimiter, DEFAULT_BACKOFF};
pub use tiers::{Tier, TierLimiters};
