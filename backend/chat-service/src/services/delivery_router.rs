//! Send, read and delete orchestration across store, presence and sockets.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageId, MessageView, NewMessage, UserId};
use crate::services::notification_sink::{NotificationError, NotificationRequest, NotificationSink};
use crate::services::presence::PresenceRegistry;
use crate::store::MessageStore;
use crate::websocket::message_types::WsOutboundEvent;
use crate::websocket::{ConnectionHandle, ConnectionRegistry};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const SEND_FAILED: &str = "Failed to send message";
pub const READ_FAILED: &str = "Failed to mark message as read";
pub const DELETE_FAILED: &str = "Failed to delete message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Pushed to the recipient's live connections.
    Delivered,
    /// Handed to the notification sink; the message stays SENT.
    QueuedForNotification,
    /// Persisted only: the notification sink failed or timed out.
    Stored,
}

#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message: Message,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub notification_timeout: Duration,
    pub surface_read_errors: bool,
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            notification_timeout: config.notification_timeout,
            surface_read_errors: config.surface_read_errors,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            notification_timeout: Duration::from_secs(3),
            surface_read_errors: false,
        }
    }
}

pub struct DeliveryRouter {
    store: Arc<dyn MessageStore>,
    presence: Arc<dyn PresenceRegistry>,
    connections: ConnectionRegistry,
    notifications: Arc<dyn NotificationSink>,
    settings: RouterSettings,
}

impl DeliveryRouter {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<dyn PresenceRegistry>,
        connections: ConnectionRegistry,
        notifications: Arc<dyn NotificationSink>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            store,
            presence,
            connections,
            notifications,
            settings,
        }
    }

    /// Persists and routes one message, then answers `origin` with either a
    /// `message_sent` ack or an `error` event.
    pub async fn send(
        &self,
        origin: ConnectionHandle,
        input: NewMessage,
    ) -> AppResult<SendReceipt> {
        let sender = input.sender_id.clone();
        match self.route(input).await {
            Ok(receipt) => {
                let ack = WsOutboundEvent::MessageSent {
                    message_id: receipt.message.id,
                    status: receipt.message.status,
                    outcome: receipt.outcome,
                };
                self.connections.push([origin], &ack).await;
                Ok(receipt)
            }
            Err(e) => {
                let message = match &e {
                    AppError::Validation(reason) => reason.clone(),
                    _ => SEND_FAILED.to_string(),
                };
                tracing::error!(user_id = %sender, error = %e, "error sending message");
                self.connections
                    .push([origin], &WsOutboundEvent::error(message))
                    .await;
                Err(e)
            }
        }
    }

    async fn route(&self, input: NewMessage) -> AppResult<SendReceipt> {
        input.validate()?;
        let message = self.store.create(input).await?;

        if self.is_present(&message.receiver_id).await {
            if let Some(delivered) = self.push_live(&message).await? {
                return Ok(SendReceipt {
                    message: delivered,
                    outcome: DeliveryOutcome::Delivered,
                });
            }
            tracing::warn!(
                message_id = %message.id,
                receiver_id = %message.receiver_id,
                "recipient present but no local connection accepted the push"
            );
        }

        let outcome = match self.notify(&message).await {
            Ok(()) => DeliveryOutcome::QueuedForNotification,
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    receiver_id = %message.receiver_id,
                    error = %e,
                    "notification not handed off; message kept for history"
                );
                DeliveryOutcome::Stored
            }
        };
        Ok(SendReceipt { message, outcome })
    }

    /// Pushes to the receiver's connections held by this process. The message
    /// is marked DELIVERED only once at least one of them accepted it.
    async fn push_live(&self, message: &Message) -> AppResult<Option<Message>> {
        let targets = self.connections_for(&message.receiver_id).await;
        if targets.is_empty() {
            return Ok(None);
        }

        let mut outgoing = message.clone();
        outgoing.mark_delivered(Utc::now());
        let pushed = self
            .connections
            .push(targets, &WsOutboundEvent::ReceiveMessage(MessageView::from(outgoing)))
            .await;
        if pushed == 0 {
            return Ok(None);
        }
        self.store.set_delivered(message.id).await.map(Some)
    }

    async fn notify(&self, message: &Message) -> Result<(), NotificationError> {
        let request = NotificationRequest::new_message(
            message.receiver_id.clone(),
            message.sender_id.clone(),
            message.content.clone(),
            message.id,
        );
        let timeout = self.settings.notification_timeout;
        tokio::time::timeout(timeout, self.notifications.create_and_send(request))
            .await
            .map_err(|_| NotificationError::TimedOut(timeout))?
    }

    /// Marks `message_id` read and tells the sender's connections. Failures are
    /// logged; they reach `origin` only when `surface_read_errors` is set.
    pub async fn read(&self, origin: ConnectionHandle, message_id: &str, reader: &UserId) {
        let result: AppResult<Message> = async {
            let id: MessageId = message_id.parse()?;
            self.store.mark_read(id).await
        }
        .await;

        match result {
            Ok(message) => {
                let targets = self.connections_for(&message.sender_id).await;
                self.connections
                    .push(targets, &WsOutboundEvent::MessageRead {
                        message_id: message.id,
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    user_id = %reader,
                    message_id,
                    error = %e,
                    "error marking message as read"
                );
                if self.settings.surface_read_errors {
                    self.connections
                        .push([origin], &WsOutboundEvent::error(READ_FAILED))
                        .await;
                }
            }
        }
    }

    /// Soft-deletes and notifies the recorded receiver plus `origin` exactly once.
    pub async fn delete(&self, origin: ConnectionHandle, message_id: &str, requester: &UserId) {
        let result: AppResult<Message> = async {
            let id: MessageId = message_id.parse()?;
            self.store.mark_deleted(id, requester).await
        }
        .await;

        match result {
            Ok(message) => {
                let event = WsOutboundEvent::MessageDeleted {
                    message_id: message.id,
                };
                let mut targets = self.connections_for(&message.receiver_id).await;
                targets.remove(&origin);
                self.connections.push(targets, &event).await;
                self.connections.push([origin], &event).await;
            }
            Err(e) => {
                tracing::error!(
                    user_id = %requester,
                    message_id,
                    error = %e,
                    "error deleting message"
                );
                self.connections
                    .push([origin], &WsOutboundEvent::error(DELETE_FAILED))
                    .await;
            }
        }
    }

    /// Relays a typing flag; nothing is stored or acknowledged.
    pub async fn typing(&self, from: &UserId, to: &UserId, is_typing: bool) {
        let targets = self.connections_for(to).await;
        self.connections
            .push(targets, &WsOutboundEvent::UserTyping {
                user_id: from.clone(),
                is_typing,
            })
            .await;
    }

    async fn is_present(&self, user: &UserId) -> bool {
        self.presence.is_present(user).await.unwrap_or_else(|e| {
            tracing::warn!(
                user_id = %user,
                error = %e,
                "presence lookup failed; treating user as offline"
            );
            false
        })
    }

    async fn connections_for(&self, user: &UserId) -> HashSet<ConnectionHandle> {
        self.presence.connections_for(user).await.unwrap_or_else(|e| {
            tracing::warn!(user_id = %user, error = %e, "presence lookup failed");
            HashSet::new()
        })
    }
}
