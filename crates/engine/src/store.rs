//! Document store seam.
//!
//! The dispatcher, resolver and sweeper only ever talk to `DocumentStore`.
//! `PgDocumentStore` maps the `notifications`, `users` and `groups`
//! collections onto PostgreSQL tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use manna_common::error::AppError;
use manna_common::types::{DispatchReport, GroupRecord, NotificationRecord, UserRecord};

/// Result of the conditional write that commits a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This invocation flipped `processed` to true.
    Committed,
    /// Another invocation got there first, or the record is gone.
    AlreadyProcessed,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError>;

    async fn get_group(&self, id: &str) -> Result<Option<GroupRecord>, AppError>;

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, AppError>;

    /// Mark a record processed, only if it is not processed yet.
    ///
    /// `processed_at` is stamped with the store's clock.
    async fn commit_dispatch(
        &self,
        id: Uuid,
        report: &DispatchReport,
    ) -> Result<CommitOutcome, AppError>;

    /// Delete every record created strictly before `cutoff` in one atomic
    /// statement. Returns the number of deleted records.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Oldest unprocessed records, at most `limit`.
    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<NotificationRecord>, AppError>;
}

/// PostgreSQL-backed document store.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError> {
        let record: Option<NotificationRecord> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn get_group(&self, id: &str) -> Result<Option<GroupRecord>, AppError> {
        let group: Option<GroupRecord> = sqlx::query_as("SELECT id, admin_id FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(group)
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        let user: Option<UserRecord> = sqlx::query_as("SELECT id, fcm_token FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn commit_dispatch(
        &self,
        id: Uuid,
        report: &DispatchReport,
    ) -> Result<CommitOutcome, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET processed = true,
                processed_at = NOW(),
                success_count = $2,
                failure_count = $3,
                error = $4
            WHERE id = $1 AND processed = false
            "#,
        )
        .bind(id)
        .bind(report.success_count.map(|c| c as i32))
        .bind(report.failure_count.map(|c| c as i32))
        .bind(report.error.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(CommitOutcome::AlreadyProcessed)
        } else {
            Ok(CommitOutcome::Committed)
        }
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<NotificationRecord>, AppError> {
        let records: Vec<NotificationRecord> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE processed = false
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
