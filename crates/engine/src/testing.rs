//! In-memory store and recording gateway for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use manna_common::error::AppError;
use manna_common::types::{
    DispatchReport, GroupRecord, MulticastMessage, MulticastResponse, NotificationKind,
    NotificationRecord, UserRecord,
};
use manna_notifier::PushGateway;

use crate::store::{CommitOutcome, DocumentStore};

pub fn make_record(kind: &str) -> NotificationRecord {
    NotificationRecord {
        id: Uuid::new_v4(),
        kind: NotificationKind::from(kind),
        group_id: None,
        user_id: None,
        user_name: None,
        group_name: None,
        processed: false,
        processed_at: None,
        success_count: None,
        failure_count: None,
        error: None,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    notifications: Mutex<HashMap<Uuid, NotificationRecord>>,
    users: HashMap<String, UserRecord>,
    groups: HashMap<String, GroupRecord>,
    fail_reads: AtomicBool,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, fcm_token: Option<&str>) -> Self {
        self.users.insert(
            id.to_string(),
            UserRecord {
                id: id.to_string(),
                fcm_token: fcm_token.map(String::from),
            },
        );
        self
    }

    pub fn with_group(mut self, id: &str, admin_id: &str) -> Self {
        self.groups.insert(
            id.to_string(),
            GroupRecord {
                id: id.to_string(),
                admin_id: admin_id.to_string(),
            },
        );
        self
    }

    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_commits(self) -> Self {
        self.fail_commits.store(true, Ordering::SeqCst);
        self
    }

    /// Toggle commit failures on a shared store.
    pub fn set_failing_commits(&self, failing: bool) {
        self.fail_commits.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, record: NotificationRecord) {
        self.notifications.lock().unwrap().insert(record.id, record);
    }

    pub fn notification(&self, id: Uuid) -> Option<NotificationRecord> {
        self.notifications.lock().unwrap().get(&id).cloned()
    }

    pub fn notification_ids(&self) -> Vec<Uuid> {
        self.notifications.lock().unwrap().keys().copied().collect()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Internal("connection reset by store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>, AppError> {
        self.check_reads()?;
        Ok(self.notification(id))
    }

    async fn get_group(&self, id: &str) -> Result<Option<GroupRecord>, AppError> {
        self.check_reads()?;
        Ok(self.groups.get(id).cloned())
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        self.check_reads()?;
        Ok(self.users.get(id).cloned())
    }

    async fn commit_dispatch(
        &self,
        id: Uuid,
        report: &DispatchReport,
    ) -> Result<CommitOutcome, AppError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(AppError::Internal("write rejected".to_string()));
        }

        let mut notifications = self.notifications.lock().unwrap();
        match notifications.get_mut(&id) {
            Some(record) if !record.processed => {
                record.processed = true;
                record.processed_at = Some(Utc::now());
                record.success_count = report.success_count.map(|c| c as i32);
                record.failure_count = report.failure_count.map(|c| c as i32);
                record.error = report.error.clone();
                self.commits.fetch_add(1, Ordering::SeqCst);
                Ok(CommitOutcome::Committed)
            }
            _ => Ok(CommitOutcome::AlreadyProcessed),
        }
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut notifications = self.notifications.lock().unwrap();
        let before = notifications.len();
        notifications.retain(|_, record| record.created_at >= cutoff);
        Ok((before - notifications.len()) as u64)
    }

    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<NotificationRecord>, AppError> {
        self.check_reads()?;
        let mut records: Vec<NotificationRecord> = self
            .notifications
            .lock()
            .unwrap()
            .values()
            .filter(|record| !record.processed)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

enum GatewayBehavior {
    DeliverAll,
    Respond(MulticastResponse),
    Fail,
}

/// Gateway fake that records every multicast it is handed.
pub struct RecordingGateway {
    calls: Mutex<Vec<MulticastMessage>>,
    behavior: GatewayBehavior,
}

impl RecordingGateway {
    fn with_behavior(behavior: GatewayBehavior) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behavior,
        }
    }

    /// Reports every token as delivered.
    pub fn succeeding() -> Self {
        Self::with_behavior(GatewayBehavior::DeliverAll)
    }

    pub fn responding(response: MulticastResponse) -> Self {
        Self::with_behavior(GatewayBehavior::Respond(response))
    }

    /// Fails the whole send.
    pub fn failing() -> Self {
        Self::with_behavior(GatewayBehavior::Fail)
    }

    pub fn calls(&self) -> Vec<MulticastMessage> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<MulticastResponse, AppError> {
        self.calls.lock().unwrap().push(message.clone());

        match self.behavior {
            GatewayBehavior::DeliverAll => Ok(MulticastResponse {
                success_count: message.tokens.len() as u32,
                failure_count: 0,
            }),
            GatewayBehavior::Respond(response) => Ok(response),
            GatewayBehavior::Fail => Err(AppError::Gateway("FCM unavailable".to_string())),
        }
    }
}
