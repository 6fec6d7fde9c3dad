//! Per-connection event handling, independent of the socket transport.

use super::message_types::{event_names, parse_inbound, WsInboundEvent, WsOutboundEvent};
use super::{ConnectionHandle, ConnectionRegistry};
use crate::models::UserId;
use crate::services::delivery_router::DeliveryRouter;
use crate::services::presence::PresenceRegistry;
use crate::state::AppState;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined(UserId),
    Disconnected,
}

/// How the `userId` carried by an event relates to the identity bound at join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Act as the payload says, even before join or after a mismatch.
    #[default]
    TrustPayload,
    /// Reject events whose `userId` is not the joined identity.
    RequireBoundIdentity,
}

pub struct SessionHandler {
    handle: ConnectionHandle,
    state: SessionState,
    router: Arc<DeliveryRouter>,
    presence: Arc<dyn PresenceRegistry>,
    connections: ConnectionRegistry,
    identity: IdentityPolicy,
}

impl SessionHandler {
    pub fn new(handle: ConnectionHandle, app: &AppState) -> Self {
        let identity = if app.config.enforce_bound_identity {
            IdentityPolicy::RequireBoundIdentity
        } else {
            IdentityPolicy::TrustPayload
        };
        Self {
            handle,
            state: SessionState::Unjoined,
            router: app.router.clone(),
            presence: app.presence.clone(),
            connections: app.connections.clone(),
            identity,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Entry point for one text frame.
    pub async fn handle_text(&mut self, text: &str) {
        if self.state == SessionState::Disconnected {
            return;
        }
        match parse_inbound(text) {
            Ok(event) => self.handle_event(event).await,
            Err(err) if err.event.as_deref() == Some(event_names::SEND_MESSAGE) => {
                tracing::warn!(
                    connection = %self.handle,
                    reason = %err.reason,
                    "malformed send_message frame"
                );
                self.reply(WsOutboundEvent::error("Invalid message payload"))
                    .await;
            }
            Err(err) => {
                tracing::warn!(
                    connection = %self.handle,
                    event = err.event.as_deref().unwrap_or("<unknown>"),
                    reason = %err.reason,
                    "dropping undecodable frame"
                );
            }
        }
    }

    pub async fn handle_event(&mut self, event: WsInboundEvent) {
        if self.state == SessionState::Disconnected {
            tracing::debug!(connection = %self.handle, "event after disconnect ignored");
            return;
        }
        if let Some(claimed) = event.claimed_user() {
            if !self.identity_allows(claimed) {
                if !matches!(event, WsInboundEvent::Typing { .. }) {
                    self.reply(WsOutboundEvent::error("userId does not match joined user"))
                        .await;
                }
                return;
            }
        }

        match event {
            WsInboundEvent::Join { user_id } => self.join(user_id).await,
            WsInboundEvent::SendMessage(payload) => match payload.into_new_message() {
                Ok(input) => {
                    // The router already answered the sender on both paths.
                    let _ = self.router.send(self.handle, input).await;
                }
                Err(e) => {
                    tracing::debug!(connection = %self.handle, error = %e, "send_message rejected");
                    self.reply(WsOutboundEvent::error(e.to_string())).await;
                }
            },
            WsInboundEvent::ReadMessage {
                message_id,
                user_id,
            } => self.router.read(self.handle, &message_id, &user_id).await,
            WsInboundEvent::DeleteMessage {
                message_id,
                user_id,
            } => self.router.delete(self.handle, &message_id, &user_id).await,
            WsInboundEvent::Typing {
                receiver_id,
                user_id,
                is_typing,
            } => self.router.typing(&user_id, &receiver_id, is_typing).await,
        }
    }

    async fn join(&mut self, user: UserId) {
        if !user.is_well_formed() {
            self.reply(WsOutboundEvent::error("Invalid user ID format"))
                .await;
            return;
        }
        match self.presence.register(self.handle, &user).await {
            Ok(()) => {
                tracing::info!(connection = %self.handle, user_id = %user, "User connected");
                self.state = SessionState::Joined(user);
            }
            Err(e) => {
                tracing::error!(
                    connection = %self.handle,
                    user_id = %user,
                    error = %e,
                    "join failed"
                );
                self.reply(WsOutboundEvent::error("Failed to join")).await;
            }
        }
    }

    /// Re-arms this connection's presence entry while it stays joined.
    pub async fn refresh_presence(&self) {
        let SessionState::Joined(user) = &self.state else {
            return;
        };
        if let Err(e) = self.presence.refresh(self.handle, user).await {
            tracing::warn!(
                connection = %self.handle,
                user_id = %user,
                error = %e,
                "presence refresh failed"
            );
        }
    }

    fn identity_allows(&self, claimed: &str) -> bool {
        let bound = match &self.state {
            SessionState::Joined(bound) if bound.as_str() == claimed => return true,
            SessionState::Joined(bound) => Some(bound),
            _ => None,
        };
        match self.identity {
            IdentityPolicy::TrustPayload => {
                match bound {
                    Some(bound) => tracing::warn!(
                        connection = %self.handle,
                        joined = %bound,
                        claimed,
                        "event userId differs from joined identity"
                    ),
                    None => {
                        tracing::debug!(connection = %self.handle, claimed, "event before join")
                    }
                }
                true
            }
            IdentityPolicy::RequireBoundIdentity => {
                tracing::warn!(
                    connection = %self.handle,
                    claimed,
                    "event rejected: identity not bound"
                );
                false
            }
        }
    }

    /// Transport closed. Removes exactly this connection from presence.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        if let Err(e) = self.presence.unregister(self.handle).await {
            tracing::error!(connection = %self.handle, error = %e, "presence unregister failed");
        }
        self.connections.remove_connection(self.handle).await;
        if let SessionState::Joined(user) = &self.state {
            tracing::info!(connection = %self.handle, user_id = %user, "User disconnected");
        }
        self.state = SessionState::Disconnected;
    }

    async fn reply(&self, event: WsOutboundEvent) {
        self.connections.push([self.handle], &event).await;
    }
}
