//! Sliding-window rate limiter shared by every worker of a run.
//!
//! At most `max_calls` grants are handed out in any trailing window of
//! `period`. The window is a queue of grant timestamps guarded by a mutex
//! that is only held for the check-and-record step; waiting happens with
//! the lock released and is followed by a fresh check, since other callers
//! may take the slot that just freed up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub struct SlidingWindowRateLimiter {
    max_calls: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
    total_grants: AtomicU64,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
            total_grants: AtomicU64::new(0),
        }
    }

    /// Wait until a call may be made and reserve the slot for it.
    /// Returns the instant the slot was recorded at.
    pub async fn acquire(&self) -> Instant {
        loop {
            let wait = match self.try_reserve() {
                Ok(granted_at) => return granted_at,
                Err(wait) => wait,
            };

            debug!(
                "Rate limit reached ({} calls / {:?}), waiting {:?}",
                self.max_calls, self.period, wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Single locked check: either record the current instant as a grant,
    /// or report how long until the oldest grant leaves the window.
    fn try_reserve(&self) -> Result<Instant, Duration> {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        // Read the clock under the lock so the window stays in grant order
        let now = Instant::now();

        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= self.period {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_calls {
            window.push_back(now);
            self.total_grants.fetch_add(1, Ordering::Relaxed);
            return Ok(now);
        }

        // Window is full, so there is a front entry
        let oldest = window.front().copied().unwrap_or(now);
        Err((oldest + self.period).saturating_duration_since(now))
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Number of slots granted since construction
    pub fn total_grants(&self) -> u64 {
        self.total_grants.load(Ordering::Relaxed)
    }
}
