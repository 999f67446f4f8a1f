use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgListener;
use uuid::Uuid;

use manna_common::error::AppError;
use manna_common::types::NotificationRecord;
use manna_engine::claim::DispatchClaim;
use manna_engine::{DispatchEngine, DispatchOutcome, DocumentStore};

/// Channel the `notifications` insert trigger publishes record ids on.
pub const NOTIFICATION_CHANNEL: &str = "notification_created";

/// Turns "notification created" events into dispatches.
///
/// Delivery is at-least-once: the same record may arrive from a live event,
/// the startup backlog and a reconnect replay. Duplicates are absorbed by the
/// in-flight claim, the `processed` check and the conditional commit.
#[derive(Clone)]
pub struct TriggerAdapter {
    store: Arc<dyn DocumentStore>,
    engine: Arc<DispatchEngine>,
    claim: Option<DispatchClaim>,
    backlog_limit: i64,
}

impl TriggerAdapter {
    pub fn new(store: Arc<dyn DocumentStore>, engine: Arc<DispatchEngine>, backlog_limit: i64) -> Self {
        Self {
            store,
            engine,
            claim: None,
            backlog_limit,
        }
    }

    /// Guard dispatches with a Redis in-flight claim.
    pub fn with_claim(mut self, claim: DispatchClaim) -> Self {
        self.claim = Some(claim);
        self
    }

    /// Handle the creation of `notifications/{id}`.
    ///
    /// Returns `Ok(None)` when nothing was dispatched (record gone, or another
    /// dispatch holds the claim). An `Err` is a failed write-back.
    pub async fn on_created(&self, id: Uuid) -> Result<Option<DispatchOutcome>, AppError> {
        let Some(record) = self.store.get_notification(id).await? else {
            tracing::warn!(notification_id = %id, "Notification not found, ignoring event");
            return Ok(None);
        };

        self.handle(record).await
    }

    async fn handle(&self, record: NotificationRecord) -> Result<Option<DispatchOutcome>, AppError> {
        if let Some(claim) = &self.claim {
            match claim.acquire(record.id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(
                        notification_id = %record.id,
                        "Duplicate event while dispatch in flight, skipping"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = %record.id,
                        error = %e,
                        "Dispatch claim unavailable, dispatching unguarded"
                    );
                }
            }
        }

        let result = self.engine.dispatch(&record).await;

        if result.is_err()
            && let Some(claim) = &self.claim
            && let Err(e) = claim.release(record.id).await
        {
            tracing::warn!(
                notification_id = %record.id,
                error = %e,
                "Failed to release dispatch claim"
            );
        }

        result.map(Some)
    }

    /// Dispatch records that are still unprocessed, oldest first.
    ///
    /// Covers events published while this process was not listening.
    pub async fn replay_backlog(&self) -> Result<usize, AppError> {
        let records = self.store.find_unprocessed(self.backlog_limit).await?;
        let count = records.len();

        if count > 0 {
            tracing::info!(count, "Replaying unprocessed notifications");
        }

        for record in records {
            let id = record.id;
            if let Err(e) = self.handle(record).await {
                tracing::error!(notification_id = %id, error = %e, "Backlog dispatch failed");
            }
        }

        Ok(count)
    }

    /// Open a listener on the creation channel.
    ///
    /// Subscribe before replaying the backlog so no event falls between the two.
    pub async fn subscribe(&self, pool: &PgPool) -> anyhow::Result<PgListener> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(NOTIFICATION_CHANNEL).await?;

        tracing::info!(channel = NOTIFICATION_CHANNEL, "Listening for new notifications");
        Ok(listener)
    }

    /// Receive creation events until the listener fails.
    ///
    /// Each event is dispatched on its own task. When the connection drops,
    /// events may have been missed, so the backlog is replayed after the
    /// listener reconnects.
    pub async fn run(&self, mut listener: PgListener) -> anyhow::Result<()> {
        loop {
            let Some(event) = listener.try_recv().await? else {
                tracing::warn!("Listener connection lost, replaying backlog after reconnect");
                if let Err(e) = self.replay_backlog().await {
                    tracing::error!(error = %e, "Backlog replay failed");
                }
                continue;
            };

            let Some(id) = Self::parse_payload(event.payload()) else {
                tracing::warn!(payload = event.payload(), "Ignoring malformed notification event");
                continue;
            };

            let adapter = self.clone();
            tokio::spawn(async move {
                if let Err(e) = adapter.on_created(id).await {
                    tracing::error!(
                        notification_id = %id,
                        error = %e,
                        "Notification write-back failed, record left unprocessed"
                    );
                }
            });
        }
    }

    pub fn parse_payload(payload: &str) -> Option<Uuid> {
        Uuid::parse_str(payload.trim()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manna_engine::testing::{MemoryStore, RecordingGateway, make_record};

    fn adapter(store: &Arc<MemoryStore>, gateway: &Arc<RecordingGateway>) -> TriggerAdapter {
        let engine = Arc::new(DispatchEngine::new(store.clone(), gateway.clone()));
        TriggerAdapter::new(store.clone(), engine, 100)
    }

    #[tokio::test]
    async fn test_on_created_dispatches_record() {
        let store = Arc::new(
            MemoryStore::new()
                .with_group("g1", "u1")
                .with_user("u1", Some("TOK1")),
        );
        let gateway = Arc::new(RecordingGateway::succeeding());

        let mut record = make_record("PENDING_APPROVAL");
        record.group_id = Some("g1".to_string());
        record.user_name = Some("Kim".to_string());
        store.insert(record.clone());

        let outcome = adapter(&store, &gateway).on_created(record.id).await.unwrap();
        assert!(matches!(outcome, Some(DispatchOutcome::Committed(_))));
        assert_eq!(gateway.calls().len(), 1);
        assert!(store.notification(record.id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_redelivered_event_does_not_resend() {
        let store = Arc::new(MemoryStore::new().with_user("u2", Some("TOK2")));
        let gateway = Arc::new(RecordingGateway::succeeding());

        let mut record = make_record("APPROVAL_GRANTED");
        record.user_id = Some("u2".to_string());
        store.insert(record.clone());

        let adapter = adapter(&store, &gateway);
        adapter.on_created(record.id).await.unwrap();
        let second = adapter.on_created(record.id).await.unwrap();

        assert_eq!(second, Some(DispatchOutcome::Skipped));
        assert_eq!(gateway.calls().len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingGateway::succeeding());

        let outcome = adapter(&store, &gateway).on_created(Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, None);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_back_fault_surfaces_from_event() {
        let store = Arc::new(MemoryStore::new().with_user("u2", Some("TOK2")).failing_commits());
        let gateway = Arc::new(RecordingGateway::succeeding());

        let mut record = make_record("APPROVAL_GRANTED");
        record.user_id = Some("u2".to_string());
        store.insert(record.clone());

        assert!(adapter(&store, &gateway).on_created(record.id).await.is_err());
        assert!(!store.notification(record.id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_replay_backlog_processes_only_unprocessed() {
        let store = Arc::new(MemoryStore::new().with_user("u2", Some("TOK2")));
        let gateway = Arc::new(RecordingGateway::succeeding());

        let mut pending = make_record("APPROVAL_GRANTED");
        pending.user_id = Some("u2".to_string());
        let mut done = make_record("APPROVAL_GRANTED");
        done.user_id = Some("u2".to_string());
        done.processed = true;
        store.insert(pending.clone());
        store.insert(done.clone());

        let replayed = adapter(&store, &gateway).replay_backlog().await.unwrap();

        assert_eq!(replayed, 1);
        assert_eq!(gateway.calls().len(), 1);
        assert!(store.notification(pending.id).unwrap().processed);
    }

    #[test]
    fn test_parse_payload() {
        let id = Uuid::new_v4();
        assert_eq!(TriggerAdapter::parse_payload(&id.to_string()), Some(id));
        assert_eq!(TriggerAdapter::parse_payload(" not-a-uuid "), None);
    }
}
