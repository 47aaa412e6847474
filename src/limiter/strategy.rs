//! Strategy trait for abstracting over admission algorithms and backends.

use async_trait::async_trait;

use super::{Decision, Limit};
use crate::error::Result;

/// Trait implemented by every rate limiting algorithm.
///
/// Call sites hold `Arc<dyn Strategy>` and can swap the local token bucket,
/// the local sliding window, or the Redis-backed bucket without changing
/// anything else. Dropping the returned future abandons any in-flight
/// backend call; a cancelled or timed-out call surfaces as an error, never
/// as a default admit or deny.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Check whether one unit of work for `key` is admitted under `limit`.
    ///
    /// Local strategies never fail; the distributed strategy fails when the
    /// backend is unreachable, and a failed call guarantees no partial
    /// state mutation was observed.
    async fn allow(&self, key: &str, limit: Limit) -> Result<Decision>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::{SlidingWindow, TokenBucket};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_strategies_are_substitutable() {
        let strategies: Vec<Arc<dyn Strategy>> = vec![
            Arc::new(TokenBucket::new()),
            Arc::new(SlidingWindow::new()),
        ];
        let limit = Limit::new(10, Duration::from_secs(1), 10).unwrap();

        for strategy in strategies {
            let decision = strategy.allow("client", limit).await.unwrap();
            assert!(decision.allowed);
        }
    }
}
