//! Redis-backed distributed token bucket strategy.
//!
//! The whole check-and-update runs as one Lua script, so concurrent callers
//! on different machines are serialized by Redis per key. Without that a
//! pair of processes could both read "tokens = 1", both admit, and both
//! decrement, overshooting the limit.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, trace};

use super::{Decision, Limit, Strategy};
use crate::error::{FloodgateError, Result};

/// Atomic token bucket transition.
///
/// The record is a hash with fields `tokens` and `last_updated` (fractional
/// epoch seconds); these names and the `{allowed, remaining, reset_after}`
/// reply shape are the wire contract shared by every process using the same
/// backend. A denied call writes nothing, so denials never cost capacity.
///
/// KEYS[1]: bucket key
/// ARGV:    [1] rate (tokens/sec), [2] capacity, [3] now (fractional epoch
///          seconds), [4] requested tokens
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])

local last_tokens = tonumber(redis.call("HGET", key, "tokens"))
local last_updated = tonumber(redis.call("HGET", key, "last_updated"))

if last_tokens == nil then
    last_tokens = capacity
    last_updated = now
end

local delta = math.max(0, now - last_updated)
local filled_tokens = math.min(capacity, last_tokens + (delta * rate))

local allowed = 0
local remaining = filled_tokens
local reset_after = 0

if filled_tokens >= requested then
    allowed = 1
    remaining = filled_tokens - requested
    redis.call("HSET", key, "tokens", remaining, "last_updated", now)
    redis.call("PEXPIRE", key, 60000)
else
    reset_after = (requested - filled_tokens) / rate
end

return {allowed, remaining, reset_after}
"#;

/// Distributed token bucket backed by Redis.
///
/// Holds no per-key state locally; the Redis record is the sole source of
/// truth and self-expires after 60 seconds of inactivity. `allow` fails when
/// the backend is unreachable; the caller decides fail-open vs fail-closed.
/// Cloning is cheap and clones share the underlying connection.
#[derive(Clone)]
pub struct RedisTokenBucket {
    conn: ConnectionManager,
    script: Script,
    call_timeout: Option<Duration>,
}

impl RedisTokenBucket {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(conn))
    }

    /// Build a strategy on an existing managed connection.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
            call_timeout: None,
        }
    }

    /// Bound every backend call by `timeout`. An expired call surfaces as
    /// [`FloodgateError::Timeout`], never as an admit or deny.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Current time as microsecond-resolution fractional epoch seconds, the
    /// precision the script's refill math expects.
    fn now_seconds() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_micros() as f64
            / 1e6
    }
}

#[async_trait]
impl Strategy for RedisTokenBucket {
    async fn allow(&self, key: &str, limit: Limit) -> Result<Decision> {
        let now = Self::now_seconds();

        trace!(
            key = %key,
            rate_per_sec = limit.per_second(),
            capacity = limit.burst,
            "Checking distributed token bucket"
        );

        let mut conn = self.conn.clone();
        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(key)
            .arg(limit.per_second())
            .arg(limit.burst)
            .arg(now)
            .arg(1);

        let call = invocation.invoke_async(&mut conn);
        let (allowed, remaining, reset_after): (i64, f64, f64) = match self.call_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| FloodgateError::Timeout(timeout))??,
            None => call.await?,
        };

        if allowed == 1 {
            Ok(Decision::allowed(remaining as u64))
        } else {
            debug!(key = %key, reset_after_secs = reset_after, "Distributed limit exceeded");
            Ok(Decision::denied(Duration::from_secs_f64(reset_after.max(0.0))))
        }
    }
}
