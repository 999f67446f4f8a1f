//! Dispatch engine: one delivery attempt per notification record.
//!
//! Pipeline for a single record:
//! 1. Skip records already marked `processed`
//! 2. Resolve recipients (via `RecipientResolver`)
//! 3. Send one multicast through the `PushGateway`
//! 4. Commit the outcome with a conditional write on `processed`
//!
//! Resolution and gateway faults are recorded on the record, not retried.
//! Only a failed commit is returned to the caller, so the event can be
//! redelivered.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use manna_common::error::AppError;
use manna_common::types::{DispatchReport, MulticastMessage, NotificationRecord};
use manna_notifier::PushGateway;

use crate::resolver::{RecipientResolver, Recipients};
use crate::store::{CommitOutcome, DocumentStore};

/// Faults recorded on the record's `error` field.
#[derive(Debug, Error)]
pub enum DispatchFault {
    #[error("{0}")]
    Resolution(AppError),

    #[error("No tokens found")]
    NoRecipients,

    #[error("{0}")]
    Gateway(AppError),
}

impl DispatchFault {
    fn into_report(self) -> DispatchReport {
        match self {
            // The gateway was called, so counts are recorded as zero
            DispatchFault::Gateway(_) => DispatchReport {
                success_count: Some(0),
                failure_count: Some(0),
                error: Some(self.to_string()),
            },
            _ => DispatchReport::failed(self.to_string()),
        }
    }
}

/// What a single `dispatch` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The record was already processed on entry; nothing was sent or written.
    Skipped,
    /// This call committed the record's terminal state.
    Committed(DispatchReport),
    /// A concurrent call committed first; this call's report was discarded.
    LostRace(DispatchReport),
}

pub struct DispatchEngine {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PushGateway>,
    resolver: RecipientResolver,
}

impl DispatchEngine {
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self {
            resolver: RecipientResolver::new(store.clone()),
            store,
            gateway,
        }
    }

    /// Deliver one record and commit its terminal state.
    ///
    /// Returns `Err` only when the final write-back fails; the record is then
    /// still unprocessed and may be dispatched again.
    pub async fn dispatch(&self, record: &NotificationRecord) -> Result<DispatchOutcome, AppError> {
        if record.processed {
            tracing::debug!(notification_id = %record.id, "Notification already processed");
            return Ok(DispatchOutcome::Skipped);
        }

        let report = match self.deliver(record).await {
            Ok(report) => report,
            Err(fault) => {
                tracing::warn!(
                    notification_id = %record.id,
                    kind = %record.kind,
                    error = %fault,
                    "Notification not delivered"
                );
                fault.into_report()
            }
        };

        let outcome = self.store.commit_dispatch(record.id, &report).await?;

        match outcome {
            CommitOutcome::Committed => {
                tracing::info!(
                    notification_id = %record.id,
                    kind = %record.kind,
                    success_count = report.success_count,
                    failure_count = report.failure_count,
                    error = report.error.as_deref(),
                    "Notification processed"
                );
                Ok(DispatchOutcome::Committed(report))
            }
            CommitOutcome::AlreadyProcessed => {
                tracing::warn!(
                    notification_id = %record.id,
                    "Notification committed by a concurrent dispatch, discarding result"
                );
                Ok(DispatchOutcome::LostRace(report))
            }
        }
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<DispatchReport, DispatchFault> {
        let recipients = self
            .resolver
            .resolve(record)
            .await
            .map_err(DispatchFault::Resolution)?;

        if recipients.tokens.is_empty() {
            return Err(DispatchFault::NoRecipients);
        }

        let message = Self::build_message(record, recipients);
        let response = self
            .gateway
            .send_multicast(&message)
            .await
            .map_err(DispatchFault::Gateway)?;

        let reported = u64::from(response.success_count) + u64::from(response.failure_count);
        if reported > message.tokens.len() as u64 {
            return Err(DispatchFault::Gateway(AppError::Gateway(format!(
                "gateway reported {} outcomes for {} tokens",
                reported,
                message.tokens.len()
            ))));
        }

        Ok(DispatchReport::delivered(response))
    }

    /// Build the multicast request for resolved recipients.
    ///
    /// The data payload always carries `type`, `groupId` and `userId`, with
    /// absent ids sent as empty strings.
    pub fn build_message(record: &NotificationRecord, recipients: Recipients) -> MulticastMessage {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), record.kind.to_string());
        data.insert(
            "groupId".to_string(),
            record.group_id.clone().unwrap_or_default(),
        );
        data.insert(
            "userId".to_string(),
            record.user_id.clone().unwrap_or_default(),
        );

        MulticastMessage {
            title: recipients.content.title,
            body: recipients.content.body,
            data,
            tokens: recipients.tokens,
        }
    }
}
