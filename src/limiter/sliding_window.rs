//! In-process sliding window counter strategy.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Decision, Limit, Strategy};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Per-key window state: the current fixed window plus the count of the one
/// before it. Two integers and a timestamp bound memory to O(1) per key no
/// matter how much traffic flows.
struct WindowState {
    window_start: Instant,
    curr_count: u64,
    prev_count: u64,
}

/// In-process sliding window counter rate limiter.
///
/// Approximates a true sliding log by weighting the previous fixed window's
/// count by the fraction of it still inside the sliding view:
///
/// ```text
/// estimate = prev_count * (period - time_in_current) / period + curr_count
/// ```
///
/// This smooths the hard-edge burst problem of fixed windows without storing
/// a timestamp per request, at the cost of being an approximation. The
/// `burst` field of [`Limit`] is ignored; this is not a burst-capable
/// strategy. Like [`super::TokenBucket`], all keys live in one table behind
/// a single lock and are never evicted.
pub struct SlidingWindow<C: Clock = SystemClock> {
    windows: Mutex<HashMap<String, WindowState>>,
    clock: C,
}

impl SlidingWindow {
    /// Create a new sliding window strategy using the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SlidingWindow<C> {
    /// Create a sliding window strategy with an explicit time source.
    pub fn with_clock(clock: C) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.windows.lock().len()
    }

    fn check(&self, key: &str, limit: Limit) -> Decision {
        let now = self.clock.now();

        let mut windows = self.windows.lock();
        let state = windows.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "Creating new window");
            WindowState {
                window_start: now,
                curr_count: 0,
                prev_count: 0,
            }
        });

        // Roll the window forward if one or more full periods have passed.
        let elapsed = now.saturating_duration_since(state.window_start);
        if elapsed >= limit.period {
            let windows_passed = (elapsed.as_secs_f64() / limit.period.as_secs_f64()) as u32;
            state.prev_count = if windows_passed == 1 {
                state.curr_count
            } else {
                // The previous window is more than a full period old.
                0
            };
            state.curr_count = 0;
            state.window_start += limit.period * windows_passed;
        }

        let time_in_current = now
            .saturating_duration_since(state.window_start)
            .as_secs_f64();
        let window_size = limit.period.as_secs_f64();
        let weight = ((window_size - time_in_current) / window_size).max(0.0);
        let estimate = state.prev_count as f64 * weight + state.curr_count as f64;

        trace!(
            key = %key,
            estimate = estimate,
            weight = weight,
            "Checking sliding window"
        );

        if estimate < limit.rate as f64 {
            state.curr_count += 1;
            Decision::allowed((limit.rate as f64 - estimate - 1.0).max(0.0) as u64)
        } else {
            // Conservative estimate: time to the end of the current window,
            // not the true minimum wait.
            let reset_after = (state.window_start + limit.period).saturating_duration_since(now);
            debug!(key = %key, estimate = estimate, "Sliding window limit exceeded");
            Decision::denied(reset_after)
        }
    }
}

#[async_trait]
impl<C: Clock> Strategy for SlidingWindow<C> {
    async fn allow(&self, key: &str, limit: Limit) -> Result<Decision> {
        Ok(self.check(key, limit))
    }
}
