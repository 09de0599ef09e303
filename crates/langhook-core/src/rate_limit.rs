//! Per-source-IP sliding-window rate limiting, backed by the cache store.
//!
//! Implements the sliding-window-log algorithm (Redis sorted set, atomic
//! Lua check-and-increment) behind a simple `check(key, limit, window)`
//! contract. On a cache store outage the limiter fails open with a
//! structured warning rather than rejecting traffic.

use std::time::Duration;

use redis::{aio::ConnectionManager, AsyncCommands, Client};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after: Duration,
}

/// Sliding-window rate limiter backed by Redis (the cache store).
pub struct RateLimiter {
    conn: ConnectionManager,
    key_prefix: String,
}

const CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local max_requests = tonumber(ARGV[3])
local window_ms = tonumber(ARGV[4])

redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
local count = redis.call('ZCARD', key)

if count < max_requests then
    redis.call('ZADD', key, now, now)
    redis.call('PEXPIRE', key, window_ms)
    return max_requests - count - 1
else
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    if #oldest > 0 then
        return -(oldest[2] + window_ms - now)
    end
    return -1
end
"#;

impl RateLimiter {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key_prefix: "langhook:ratelimit".to_string(),
        })
    }

    /// Check and, if allowed, record one request for `key` within a window
    /// of `window` holding at most `limit` requests.
    ///
    /// On a Redis error this fails open (`allowed: true`) and logs a
    /// structured warning rather than propagating `CacheUnavailable` to the
    /// ingest path.
    pub async fn check(&self, key: &str, limit: u32, window: Duration) -> RateLimitDecision {
        match self.try_check(key, limit, window).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(error = %err, key, "rate limiter cache unavailable, failing open");
                RateLimitDecision {
                    allowed: true,
                    retry_after: Duration::ZERO,
                }
            }
        }
    }

    async fn try_check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, redis::RedisError> {
        let redis_key = format!("{}:{}", self.key_prefix, key);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as f64;
        let window_ms = window.as_millis() as f64;
        let window_start = now - window_ms;

        let mut conn = self.conn.clone();
        let script = redis::Script::new(CHECK_SCRIPT);
        let result: i64 = script
            .key(&redis_key)
            .arg(now)
            .arg(window_start)
            .arg(limit)
            .arg(window_ms as u64)
            .invoke_async(&mut conn)
            .await?;

        Ok(if result >= 0 {
            RateLimitDecision {
                allowed: true,
                retry_after: Duration::ZERO,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                retry_after: Duration::from_millis((-result).max(1) as u64),
            }
        })
    }

    /// Current count for a key, without recording a new request. Used by
    /// tests verifying rate-limit fairness.
    pub async fn count(&self, key: &str, window: Duration) -> Result<u32, redis::RedisError> {
        let redis_key = format!("{}:{}", self.key_prefix, key);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as f64;
        let window_start = now - window.as_millis() as f64;

        let mut conn = self.conn.clone();
        let _: () = conn.zrembyscore(&redis_key, "-inf", window_start).await?;
        conn.zcard(&redis_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_retry_after_zero_when_allowed() {
        let decision = RateLimitDecision {
            allowed: true,
            retry_after: Duration::ZERO,
        };
        assert!(decision.allowed);
        assert_eq!(decision.retry_after, Duration::ZERO);
    }

    // Exercising `check`/`count` against a live Redis requires a running
    // instance; see `langhook-server`'s integration tests for the
    // end-to-end fairness property.
}
