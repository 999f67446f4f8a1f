//! FCM HTTP v1 push gateway.
//!
//! The v1 API has no multicast endpoint, so a multicast is fanned out as one
//! `messages:send` call per token with bounded concurrency. A failed token is
//! counted, never raised.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use manna_common::error::AppError;
use manna_common::types::{MulticastMessage, MulticastResponse};

use crate::PushGateway;
use crate::credentials::{AccessTokenProvider, ServiceAccount};

const FCM_API_BASE: &str = "https://fcm.googleapis.com/v1";
const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Push gateway backed by Firebase Cloud Messaging.
pub struct FcmGateway {
    client: reqwest::Client,
    tokens: AccessTokenProvider,
    send_url: String,
    concurrency: usize,
}

impl FcmGateway {
    /// Build a gateway for a service account.
    ///
    /// `project_id` overrides the project named in the key file.
    pub fn new(
        account: ServiceAccount,
        project_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build reqwest client: {}", e)))?;

        let project_id = project_id.unwrap_or_else(|| account.project_id.clone());
        let send_url = format!("{}/projects/{}/messages:send", FCM_API_BASE, project_id);

        tracing::info!(project_id = %project_id, "FCM gateway configured");

        Ok(Self {
            tokens: AccessTokenProvider::new(account, client.clone()),
            client,
            send_url,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    /// Set the maximum number of in-flight per-token sends.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn send_one(&self, access_token: &str, token: &str, message: &MulticastMessage) -> bool {
        let request = build_request(token, message);

        let response = match self
            .client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "FCM send request failed");
                return false;
            }
        };

        let status = response.status();
        if status.is_success() {
            return true;
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = %status,
            body = %body,
            "FCM rejected message for token"
        );
        false
    }
}

fn build_request<'a>(token: &'a str, message: &'a MulticastMessage) -> SendRequest<'a> {
    SendRequest {
        message: FcmMessage {
            token,
            notification: FcmNotification {
                title: &message.title,
                body: &message.body,
            },
            data: &message.data,
        },
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<MulticastResponse, AppError> {
        if message.tokens.is_empty() {
            return Ok(MulticastResponse::default());
        }

        // Failing to authenticate fails the whole multicast
        let access_token = self.tokens.access_token().await?;

        let access_token = &access_token;
        let outcomes: Vec<bool> = stream::iter(message.tokens.clone())
            .map(|token| async move { self.send_one(access_token, &token, message).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let success_count = outcomes.iter().filter(|ok| **ok).count() as u32;
        let response = MulticastResponse {
            success_count,
            failure_count: outcomes.len() as u32 - success_count,
        };

        tracing::info!(
            tokens = message.tokens.len(),
            success_count = response.success_count,
            failure_count = response.failure_count,
            "FCM multicast sent"
        );

        Ok(response)
    }
}
