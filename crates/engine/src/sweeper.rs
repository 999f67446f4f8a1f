//! Retention sweeper: deletes notification records past the retention window.
//!
//! Age alone decides eligibility; processed and unprocessed records are
//! treated alike. Re-running after a sweep deletes nothing new.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use manna_common::error::AppError;

use crate::store::DocumentStore;

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

pub struct RetentionSweeper {
    store: Arc<dyn DocumentStore>,
    retention: Duration,
}

impl RetentionSweeper {
    /// Windows shorter than one day are raised to one day.
    pub fn new(store: Arc<dyn DocumentStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention: Duration::try_days(retention_days.max(1)).unwrap_or(Duration::MAX),
        }
    }

    /// Records created strictly before the returned instant are expired.
    ///
    /// A window reaching past the earliest representable time expires nothing.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Sweep relative to the current time.
    pub async fn sweep(&self) -> Result<u64, AppError> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = self.cutoff(now);
        let deleted = self.store.delete_created_before(cutoff).await?;

        tracing::info!(deleted, cutoff = %cutoff, "Deleted old notifications");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, make_record};
    use manna_common::types::NotificationRecord;

    fn aged(kind: &str, now: DateTime<Utc>, age: Duration, processed: bool) -> NotificationRecord {
        let mut record = make_record(kind);
        record.created_at = now - age;
        record.processed = processed;
        record
    }

    #[tokio::test]
    async fn test_sweep_deletes_exactly_expired_records() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let old_processed = aged("PENDING_APPROVAL", now, Duration::days(8), true);
        let old_unprocessed = aged("APPROVAL_GRANTED", now, Duration::days(30), false);
        let fresh_processed = aged("PENDING_APPROVAL", now, Duration::days(6), true);
        let fresh_unprocessed = aged("APPROVAL_GRANTED", now, Duration::hours(1), false);
        for record in [&old_processed, &old_unprocessed, &fresh_processed, &fresh_unprocessed] {
            store.insert(record.clone());
        }

        let sweeper = RetentionSweeper::new(store.clone(), DEFAULT_RETENTION_DAYS);
        let deleted = sweeper.sweep_at(now).await.unwrap();

        assert_eq!(deleted, 2);
        let mut remaining = store.notification_ids();
        remaining.sort();
        let mut expected = vec![fresh_processed.id, fresh_unprocessed.id];
        expected.sort();
        assert_eq!(remaining, expected);
    }

    #[tokio::test]
    async fn test_record_exactly_at_cutoff_is_kept() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let boundary = aged("PENDING_APPROVAL", now, Duration::days(7), false);
        store.insert(boundary.clone());

        let sweeper = RetentionSweeper::new(store.clone(), DEFAULT_RETENTION_DAYS);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 0);
        assert!(store.notification(boundary.id).is_some());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.insert(aged("PENDING_APPROVAL", now, Duration::days(10), true));

        let sweeper = RetentionSweeper::new(store.clone(), DEFAULT_RETENTION_DAYS);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 1);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_huge_window_expires_nothing() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let ancient = aged("APPROVAL_GRANTED", now, Duration::days(3650), true);
        store.insert(ancient.clone());

        let sweeper = RetentionSweeper::new(store.clone(), 1_000_000_000);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 0);
        assert!(store.notification(ancient.id).is_some());
    }

    #[tokio::test]
    async fn test_negative_window_keeps_fresh_records() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let fresh = aged("PENDING_APPROVAL", now, Duration::minutes(1), false);
        store.insert(fresh.clone());

        let sweeper = RetentionSweeper::new(store.clone(), -5);
        assert_eq!(sweeper.cutoff(now), now - Duration::days(1));
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 0);
        assert!(store.notification(fresh.id).is_some());
    }

    #[test]
    fn test_cutoff_uses_retention_window() {
        let sweeper = RetentionSweeper::new(Arc::new(MemoryStore::new()), 7);
        let now = Utc::now();
        assert_eq!(now - sweeper.cutoff(now), Duration::days(7));
    }
}
