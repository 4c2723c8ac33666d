//! Push-notification gateway boundary.
//!
//! Delivery is best-effort. The service only needs a multicast call that
//! reports how many tokens accepted the message.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    pub tokens: Vec<String>,
    pub notification: PushNotification,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PushSummary {
    pub success_count: usize,
    pub failure_count: usize,
}

impl PushSummary {
    fn absorb(&mut self, other: PushSummary) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: PushMessage) -> Result<PushSummary, AppError>;
}

/// Gateway used when no transport is configured: records the delivery in the
/// log and reports every token as accepted.
#[derive(Debug, Default)]
pub struct LoggingPushGateway;

#[async_trait]
impl PushGateway for LoggingPushGateway {
    async fn send(&self, message: PushMessage) -> Result<PushSummary, AppError> {
        info!(
            tokens = message.tokens.len(),
            title = %message.notification.title,
            "push delivered to log gateway"
        );

        Ok(PushSummary {
            success_count: message.tokens.len(),
            failure_count: 0,
        })
    }
}

/// Sends one multicast per `chunk_size` tokens and sums the results.
/// The first gateway error aborts the remaining chunks.
pub async fn send_chunked(
    gateway: &dyn PushGateway,
    tokens: &[String],
    chunk_size: usize,
    notification: PushNotification,
    data: HashMap<String, String>,
) -> Result<PushSummary, AppError> {
    let mut summary = PushSummary::default();

    for chunk in tokens.chunks(chunk_size.max(1)) {
        let result = gateway
            .send(PushMessage {
                tokens: chunk.to_vec(),
                notification: notification.clone(),
                data: data.clone(),
            })
            .await?;
        summary.absorb(result);
    }

    Ok(summary)
}
