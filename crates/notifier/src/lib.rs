//! Push delivery.
//!
//! `PushGateway` is the seam the dispatcher sends through; `FcmGateway` is the
//! production implementation backed by the FCM HTTP v1 API.

pub mod credentials;
pub mod fcm;

use async_trait::async_trait;

use manna_common::error::AppError;
use manna_common::types::{MulticastMessage, MulticastResponse};

pub use fcm::FcmGateway;

/// A push service able to deliver one message to many device tokens.
///
/// Individual token failures are tallied in the response. An `Err` means the
/// send as a whole could not be attempted.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<MulticastResponse, AppError>;
}
