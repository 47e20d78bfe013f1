//! Sliding-window admission control

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default pause between admission attempts while blocked in [`RateLimiter::acquire`]
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on admission slots reserved up front; the queue grows past it on demand
const PREALLOCATED_SLOTS: usize = 1024;

/// Thread-safe sliding-window rate limiter
///
/// At most `capacity` admissions may fall inside any trailing `window`.
/// Expired admissions are evicted lazily on every check, and eviction plus
/// insertion happen inside one critical section so two callers can never
/// both observe the same free slot.
pub struct RateLimiter {
    name: String,
    capacity: usize,
    window: Duration,
    backoff: Duration,
    /// Admission instants, oldest first
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new limiter allowing `capacity` admissions per `window`
    pub fn new(name: impl Into<String>, capacity: usize, window: Duration) -> Self {
        Self {
            name: name.into(),
            capacity,
            window,
            backoff: DEFAULT_BACKOFF,
            admissions: Mutex::new(VecDeque::with_capacity(capacity.min(PREALLOCATED_SLOTS))),
        }
    }

    /// Set the polling backoff used by [`RateLimiter::acquire`]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Limiter name, used as the `tier` label in logs and metrics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum admissions per window
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the rolling window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Polling backoff between admission attempts
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Try to take one admission without blocking
    pub fn try_acquire(&self) -> bool {
        let mut admissions = self.admissions.lock();
        // Sampled under the lock so the queue stays in chronological order
        let now = Instant::now();
        Self::admit(&mut admissions, now, self.capacity, self.window)
    }

    /// Try to take one admission as of `now`
    ///
    /// Callers must pass non-decreasing instants.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut admissions = self.admissions.lock();
        Self::admit(&mut admissions, now, self.capacity, self.window)
    }

    /// Block until an admission is granted
    ///
    /// Never fails and never times out. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut attempts: u64 = 0;

        while !self.try_acquire() {
            attempts += 1;
            if attempts == 1 {
                tracing::trace!(tier = %self.name, "Rate limit reached, waiting for a free slot");
            }
            tokio::time::sleep(self.backoff).await;
        }

        let waited = started.elapsed();
        if attempts > 0 {
            tracing::debug!(
                tier = %self.name,
                attempts,
                waited_ms = waited.as_millis() as u64,
                "Admission granted after backoff"
            );
        }
        waited
    }

    /// Number of admissions inside the trailing window as of `now`
    pub fn in_window_at(&self, now: Instant) -> usize {
        let admissions = self.admissions.lock();
        admissions
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count()
    }

    /// Number of admissions inside the trailing window
    pub fn in_window(&self) -> usize {
        self.in_window_at(Instant::now())
    }

    fn admit(
        admissions: &mut VecDeque<Instant>,
        now: Instant,
        capacity: usize,
        window: Duration,
    ) -> bool {
        while let Some(oldest) = admissions.front() {
            if now.saturating_duration_since(*oldest) >= window {
                admissions.pop_front();
            } else {
                break;
            }
        }

        if admissions.len() < capacity {
            admissions.push_back(now);
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("window", &self.window)
            .field("backoff", &self.backoff)
            .field("tracked", &self.admissions.lock().len())
            .finish()
    }
}
