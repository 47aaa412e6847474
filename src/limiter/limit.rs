//! Value types shared by all rate limiting strategies.

use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// The rule a strategy enforces: how many permits per period, and how large
/// an instantaneous burst may be.
///
/// Callers constructing a `Limit` directly must guarantee `rate`, `period`
/// and `burst` are all non-zero; the permits-per-second math divides by the
/// period. [`Limit::new`] performs that validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    /// Permits allowed per period
    pub rate: u32,
    /// The time window the rate is measured over
    pub period: Duration,
    /// Maximum instantaneously available permits (token bucket only)
    pub burst: u32,
}

impl Limit {
    /// Create a validated limit.
    pub fn new(rate: u32, period: Duration, burst: u32) -> Result<Self> {
        if rate == 0 {
            return Err(FloodgateError::Config("rate must be positive".into()));
        }
        if period.is_zero() {
            return Err(FloodgateError::Config("period must be positive".into()));
        }
        if burst == 0 {
            return Err(FloodgateError::Config("burst must be positive".into()));
        }
        Ok(Self {
            rate,
            period,
            burst,
        })
    }

    /// Refill rate in permits per second.
    pub fn per_second(&self) -> f64 {
        self.rate as f64 / self.period.as_secs_f64()
    }
}

/// The outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the unit of work is admitted
    pub allowed: bool,
    /// Permits left after this decision (meaning is strategy-specific)
    pub remaining: u64,
    /// Suggested wait before retrying; zero on every admission
    pub reset_after: Duration,
}

impl Decision {
    /// An admitted decision with the given remaining allowance.
    pub fn allowed(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_after: Duration::ZERO,
        }
    }

    /// A denied decision with a retry hint.
    pub fn denied(reset_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_validation() {
        assert!(Limit::new(10, Duration::from_secs(1), 10).is_ok());
        assert!(Limit::new(0, Duration::from_secs(1), 10).is_err());
        assert!(Limit::new(10, Duration::ZERO, 10).is_err());
        assert!(Limit::new(10, Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn test_per_second() {
        let limit = Limit::new(5, Duration::from_secs(10), 10).unwrap();
        assert!((limit.per_second() - 0.5).abs() < f64::EPSILON);

        let limit = Limit::new(100, Duration::from_secs(60), 100).unwrap();
        assert!((limit.per_second() - 100.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_decision_constructors() {
        let d = Decision::allowed(9);
        assert!(d.allowed);
        assert_eq!(d.remaining, 9);
        assert_eq!(d.reset_after, Duration::ZERO);

        let d = Decision::denied(Duration::from_millis(200));
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_after, Duration::from_millis(200));
    }
}
