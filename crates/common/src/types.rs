use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variant tag of a notification record.
///
/// Tags this service does not know about are carried through as `Other` and
/// resolve to zero recipients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    PendingApproval,
    ApprovalGranted,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::PendingApproval => "PENDING_APPROVAL",
            NotificationKind::ApprovalGranted => "APPROVAL_GRANTED",
            NotificationKind::Other(tag) => tag,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "PENDING_APPROVAL" => NotificationKind::PendingApproval,
            "APPROVAL_GRANTED" => NotificationKind::ApprovalGranted,
            _ => NotificationKind::Other(tag),
        }
    }
}

impl From<&str> for NotificationKind {
    fn from(tag: &str) -> Self {
        NotificationKind::from(tag.to_string())
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pending push-notification intent, one row of `notifications`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: NotificationKind,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    /// Idempotency guard, set exactly once by the dispatcher.
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub success_count: Option<i32>,
    pub failure_count: Option<i32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A user profile. Read-only to this service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub fcm_token: Option<String>,
}

impl UserRecord {
    /// The device token exactly as stored, if one is registered and not blank.
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

/// A group. Read-only to this service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupRecord {
    pub id: String,
    pub admin_id: String,
}

/// A single multicast push request handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub tokens: Vec<String>,
}

/// Per-token outcome tally of a multicast send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastResponse {
    pub success_count: u32,
    pub failure_count: u32,
}

/// Terminal fields written back onto a notification record.
///
/// Counts are `None` when the gateway was never called.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub success_count: Option<u32>,
    pub failure_count: Option<u32>,
    pub error: Option<String>,
}

impl DispatchReport {
    pub fn delivered(response: MulticastResponse) -> Self {
        Self {
            success_count: Some(response.success_count),
            failure_count: Some(response.failure_count),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success_count: None,
            failure_count: None,
            error: Some(error.into()),
        }
    }
}
