//! Recipient resolver: maps a notification record to device tokens and text.
//!
//! Each variant has its own lookup:
//! - `PENDING_APPROVAL` → the admin of `group_id`
//! - `APPROVAL_GRANTED` → the user `user_id`
//! - anything else → nobody
//!
//! Resolution only reads from the store. Read faults propagate to the caller.

use std::sync::Arc;

use manna_common::error::AppError;
use manna_common::types::{NotificationKind, NotificationRecord};

use crate::store::DocumentStore;

/// Title and body shown on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushContent {
    pub title: String,
    pub body: String,
}

/// Outcome of resolving one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub tokens: Vec<String>,
    pub content: PushContent,
}

pub struct RecipientResolver {
    store: Arc<dyn DocumentStore>,
}

impl RecipientResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, record: &NotificationRecord) -> Result<Recipients, AppError> {
        let tokens = match &record.kind {
            NotificationKind::PendingApproval => self.group_admin_tokens(record).await?,
            NotificationKind::ApprovalGranted => self.requester_tokens(record).await?,
            NotificationKind::Other(tag) => {
                tracing::debug!(
                    notification_id = %record.id,
                    kind = %tag,
                    "Unknown notification type, no recipients"
                );
                Vec::new()
            }
        };

        Ok(Recipients {
            tokens,
            content: Self::render(record),
        })
    }

    /// Derive the push title and body from the record's type and payload.
    pub fn render(record: &NotificationRecord) -> PushContent {
        match &record.kind {
            NotificationKind::PendingApproval => PushContent {
                title: "new join request".to_string(),
                body: format!(
                    "{} requested to join your group.",
                    record.user_name.as_deref().unwrap_or_default()
                ),
            },
            NotificationKind::ApprovalGranted => PushContent {
                title: "approval complete".to_string(),
                body: format!(
                    "Your request to join {} has been approved.",
                    record.group_name.as_deref().unwrap_or_default()
                ),
            },
            NotificationKind::Other(_) => PushContent::default(),
        }
    }

    async fn group_admin_tokens(&self, record: &NotificationRecord) -> Result<Vec<String>, AppError> {
        let Some(group_id) = record.group_id.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(group) = self.store.get_group(group_id).await? else {
            tracing::debug!(notification_id = %record.id, group_id, "Group not found");
            return Ok(Vec::new());
        };

        self.user_tokens(&group.admin_id).await
    }

    async fn requester_tokens(&self, record: &NotificationRecord) -> Result<Vec<String>, AppError> {
        match record.user_id.as_deref() {
            Some(user_id) => self.user_tokens(user_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn user_tokens(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let user = self.store.get_user(user_id).await?;

        Ok(user
            .as_ref()
            .and_then(|u| u.push_token())
            .map(|token| vec![token.to_string()])
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, make_record};

    #[tokio::test]
    async fn test_pending_approval_resolves_group_admin() {
        let store = MemoryStore::new()
            .with_group("g1", "u1")
            .with_user("u1", Some("TOK1"));
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("PENDING_APPROVAL");
        record.group_id = Some("g1".to_string());
        record.user_name = Some("Kim".to_string());

        let recipients = resolver.resolve(&record).await.unwrap();
        assert_eq!(recipients.tokens, vec!["TOK1".to_string()]);
        assert_eq!(recipients.content.title, "new join request");
        assert!(recipients.content.body.contains("Kim"));
    }

    #[tokio::test]
    async fn test_pending_approval_missing_group_is_empty() {
        let store = MemoryStore::new().with_user("u1", Some("TOK1"));
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("PENDING_APPROVAL");
        record.group_id = Some("nope".to_string());

        let recipients = resolver.resolve(&record).await.unwrap();
        assert!(recipients.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_pending_approval_admin_without_token_is_empty() {
        let store = MemoryStore::new()
            .with_group("g1", "u1")
            .with_user("u1", None);
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("PENDING_APPROVAL");
        record.group_id = Some("g1".to_string());

        assert!(resolver.resolve(&record).await.unwrap().tokens.is_empty());
    }

    #[tokio::test]
    async fn test_approval_granted_resolves_requester() {
        let store = MemoryStore::new().with_user("u2", Some("TOK2"));
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("APPROVAL_GRANTED");
        record.user_id = Some("u2".to_string());
        record.group_name = Some("Morning Walkers".to_string());

        let recipients = resolver.resolve(&record).await.unwrap();
        assert_eq!(recipients.tokens, vec!["TOK2".to_string()]);
        assert_eq!(recipients.content.title, "approval complete");
        assert!(recipients.content.body.contains("Morning Walkers"));
    }

    #[tokio::test]
    async fn test_approval_granted_empty_token_is_empty() {
        let store = MemoryStore::new().with_user("u2", Some(""));
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("APPROVAL_GRANTED");
        record.user_id = Some("u2".to_string());

        assert!(resolver.resolve(&record).await.unwrap().tokens.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_has_no_recipients_or_text() {
        let store = MemoryStore::new().with_user("u1", Some("TOK1"));
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("GROUP_DISBANDED");
        record.user_id = Some("u1".to_string());

        let recipients = resolver.resolve(&record).await.unwrap();
        assert_eq!(recipients, Recipients::default());
    }

    #[tokio::test]
    async fn test_store_fault_propagates() {
        let store = MemoryStore::new().with_group("g1", "u1").failing_reads();
        let resolver = RecipientResolver::new(Arc::new(store));

        let mut record = make_record("PENDING_APPROVAL");
        record.group_id = Some("g1".to_string());

        assert!(resolver.resolve(&record).await.is_err());
    }
}
