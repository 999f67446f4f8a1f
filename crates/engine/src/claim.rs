//! In-flight dispatch claims: short-lived Redis locks per record.
//!
//! A claim is taken before dispatching a creation event so that a redelivered
//! event arriving while the first dispatch is still running does not send a
//! second push. The conditional commit in the store stays the authoritative
//! guard; the claim only narrows the window for duplicate sends.
//!
//! Uses Redis `SET NX EX` for atomic check-and-set with automatic TTL expiry.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use manna_common::error::AppError;

#[derive(Clone)]
pub struct DispatchClaim {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl DispatchClaim {
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    /// Try to claim a record for dispatch.
    ///
    /// Returns `true` if this caller now holds the claim.
    /// Returns `false` if another dispatch already holds it.
    pub async fn acquire(&self, notification_id: Uuid) -> Result<bool, AppError> {
        let key = Self::key(notification_id);
        let mut redis = self.redis.clone();

        // SET key "1" NX EX ttl
        // Returns Some("OK") if the key was set, None if it already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut redis)
            .await?;

        let acquired = result.is_some();

        if !acquired {
            tracing::debug!(
                notification_id = %notification_id,
                ttl_secs = self.ttl_secs,
                "Dispatch already in flight"
            );
        }

        Ok(acquired)
    }

    /// Drop a claim so a redelivered event can dispatch again.
    pub async fn release(&self, notification_id: Uuid) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        redis.del::<_, ()>(Self::key(notification_id)).await?;
        Ok(())
    }

    fn key(notification_id: Uuid) -> String {
        format!("notification:inflight:{}", notification_id)
    }
}
