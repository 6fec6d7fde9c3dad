//! Hand-off of new-message notifications for recipients that are offline.

use crate::models::{MessageId, UserId};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub content: Option<String>,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub to_user: UserId,
    pub from_user: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub extra_data: NewMessagePayload,
}

impl NotificationRequest {
    pub fn new_message(
        to_user: UserId,
        from_user: UserId,
        content: Option<String>,
        message_id: MessageId,
    ) -> Self {
        Self {
            to_user,
            from_user,
            kind: NotificationKind::NewMessage,
            extra_data: NewMessagePayload {
                content,
                message_id,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification service rejected request with status {0}")]
    Rejected(u16),

    #[error("notification timed out after {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_and_send(&self, request: NotificationRequest) -> Result<(), NotificationError>;
}

/// Posts notifications to the notification service.
pub struct HttpNotificationSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/internal/notifications", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn create_and_send(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }

        tracing::debug!(
            to_user = %request.to_user,
            message_id = %request.extra_data.message_id,
            "notification accepted"
        );
        Ok(())
    }
}

/// Used when no notification service is configured.
#[derive(Default)]
pub struct LogOnlyNotificationSink;

#[async_trait]
impl NotificationSink for LogOnlyNotificationSink {
    async fn create_and_send(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        tracing::info!(
            to_user = %request.to_user,
            from_user = %request.from_user,
            message_id = %request.extra_data.message_id,
            "notification service not configured; dropping NEW_MESSAGE notification"
        );
        Ok(())
    }
}
