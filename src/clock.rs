//! Time source abstraction for the local strategies.
//!
//! The local algorithms only ever ask "what time is it now?". Routing that
//! question through a trait lets unit tests drive the clock explicitly
//! instead of sleeping through real refill intervals.

use std::time::Instant;

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// System clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Controllable clock for tests. All clones share one time value.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct MockClock {
    current: std::sync::Arc<parking_lot::Mutex<Instant>>,
}

#[cfg(test)]
impl MockClock {
    pub(crate) fn new(start: Instant) -> Self {
        Self {
            current: std::sync::Arc::new(parking_lot::Mutex::new(start)),
        }
    }

    pub(crate) fn advance(&self, by: std::time::Duration) {
        *self.current.lock() += by;
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
