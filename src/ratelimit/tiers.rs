//! Per-tier limiter registry

use super::RateLimiter;
use crate::config::{LimitsConfig, TierLimit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A group of endpoints sharing one request budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Unauthenticated market data endpoints
    Public,
    /// Signed account endpoints
    Private,
    /// High-frequency trading endpoints
    HighFrequency,
}

impl Tier {
    /// All tiers, in configuration order
    pub const ALL: [Tier; 3] = [Tier::Public, Tier::Private, Tier::HighFrequency];

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Public => "public",
            Tier::Private => "private",
            Tier::HighFrequency => "high_frequency",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independent limiter per tier, shared by every worker of that tier
#[derive(Debug, Clone)]
pub struct TierLimiters {
    public: Arc<RateLimiter>,
    private: Arc<RateLimiter>,
    high_frequency: Arc<RateLimiter>,
}

impl TierLimiters {
    /// Build limiters from validated configuration
    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self {
            public: Arc::new(build(Tier::Public, &limits.public)),
            private: Arc::new(build(Tier::Private, &limits.private)),
            high_frequency: Arc::new(build(Tier::HighFrequency, &limits.high_frequency)),
        }
    }

    /// Shared limiter for a tier
    pub fn get(&self, tier: Tier) -> &Arc<RateLimiter> {
        match tier {
            Tier::Public => &self.public,
            Tier::Private => &self.private,
            Tier::HighFrequency => &self.high_frequency,
        }
    }
}

fn build(tier: Tier, limit: &TierLimit) -> RateLimiter {
    RateLimiter::new(tier.as_str(), limit.capacity as usize, limit.window())
        .with_backoff(limit.backoff())
}
