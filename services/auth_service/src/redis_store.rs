use deadpool_redis::{redis::Script, Pool};

use crate::errors::AuthError;

/// Atomically bumps the failed-login counter for `username` and bans it once
/// `max_attempts` is reached within the sliding window. Ban and counter live
/// on separate keys so a ban outlives the counter's own TTL.
///
/// KEYS[1] = rate key (`auth:rate:login:<username>`)
/// KEYS[2] = ban key  (`auth:ban:login:<username>`)
/// ARGV[1] = window_sec
/// ARGV[2] = ban_sec
/// ARGV[3] = max_attempts
///
/// Returns 1 if this call tipped the count over the threshold and installed
/// the ban, 0 otherwise. Run as a script so the
/// read-increment-compare-ban-clear sequence can't race across concurrent
/// login attempts for the same username. Reaching the threshold clears the
/// counter key as it installs the ban, so a fresh count starts at zero once
/// the ban expires.
const BUMP_AND_MAYBE_BAN: &str = r#"
local count = redis.call("INCR", KEYS[1])
if count == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
if count >= tonumber(ARGV[3]) then
    redis.call("SET", KEYS[2], "1", "EX", ARGV[2])
    redis.call("DEL", KEYS[1])
    return 1
end
return 0
"#;

fn rate_key(username: &str) -> String {
    format!("auth:rate:login:{username}")
}

fn ban_key(username: &str) -> String {
    format!("auth:ban:login:{username}")
}

/// Brute-force guard backed by Redis. One store per process, shared across
/// all login attempts via the connection pool.
pub struct LoginRateLimiter {
    pool: Pool,
    max_attempts: u32,
    window_sec: u64,
    ban_sec: u64,
}

impl LoginRateLimiter {
    pub fn new(pool: Pool, max_attempts: u32, window_sec: u64, ban_sec: u64) -> Self {
        Self {
            pool,
            max_attempts,
            window_sec,
            ban_sec,
        }
    }

    pub async fn is_banned(&self, username: &str) -> Result<bool, AuthError> {
        let mut conn = self.pool.get().await.map_err(|e| AuthError::Internal(e.to_string()))?;
        let exists: bool = deadpool_redis::redis::cmd("EXISTS")
            .arg(ban_key(username))
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(exists)
    }

    /// Records a failed attempt; returns `true` if this attempt just tipped
    /// the account into a ban.
    pub async fn record_failure(&self, username: &str) -> Result<bool, AuthError> {
        let mut conn = self.pool.get().await.map_err(|e| AuthError::Internal(e.to_string()))?;
        let banned: i64 = Script::new(BUMP_AND_MAYBE_BAN)
            .key(rate_key(username))
            .key(ban_key(username))
            .arg(self.window_sec)
            .arg(self.ban_sec)
            .arg(self.max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(banned == 1)
    }

    pub async fn reset(&self, username: &str) -> Result<(), AuthError> {
        let mut conn = self.pool.get().await.map_err(|e| AuthError::Internal(e.to_string()))?;
        deadpool_redis::redis::cmd("DEL")
            .arg(rate_key(username))
            .arg(ban_key(username))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(())
    }
}
