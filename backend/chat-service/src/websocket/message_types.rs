use crate::error::AppResult;
use crate::models::message::is_well_formed_user_id;
use crate::models::{MessageId, MessageStatus, MessageView, NewMessage, UserId};
use crate::services::delivery_router::DeliveryOutcome;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

pub mod event_names {
    pub const JOIN: &str = "join";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const READ_MESSAGE: &str = "read_message";
    pub const DELETE_MESSAGE: &str = "delete_message";
    pub const TYPING: &str = "typing";
}

/// Frames sent by clients: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum WsInboundEvent {
    Join {
        user_id: UserId,
    },
    SendMessage(SendMessagePayload),
    ReadMessage {
        message_id: String,
        user_id: UserId,
    },
    DeleteMessage {
        message_id: String,
        user_id: UserId,
    },
    Typing {
        receiver_id: UserId,
        user_id: UserId,
        is_typing: bool,
    },
}

impl WsInboundEvent {
    /// The identity the client claims for this event.
    pub fn claimed_user(&self) -> Option<&str> {
        match self {
            WsInboundEvent::Join { .. } => None,
            WsInboundEvent::SendMessage(payload) => Some(payload.user_id.as_str()),
            WsInboundEvent::ReadMessage { user_id, .. }
            | WsInboundEvent::DeleteMessage { user_id, .. }
            | WsInboundEvent::Typing { user_id, .. } => Some(user_id.as_str()),
        }
    }
}

/// A frame that could not be decoded. `event` is set when at least the
/// event name was readable.
#[derive(Debug)]
pub struct InboundFrameError {
    pub event: Option<String>,
    pub reason: String,
}

#[derive(Deserialize)]
struct FrameHeader {
    event: String,
}

pub fn parse_inbound(text: &str) -> Result<WsInboundEvent, InboundFrameError> {
    serde_json::from_str::<WsInboundEvent>(text).map_err(|e| InboundFrameError {
        event: serde_json::from_str::<FrameHeader>(text)
            .ok()
            .map(|h| h.event),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessagePayload {
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    #[validate(custom(function = "validate_receiver_id"))]
    pub receiver_id: String,
    pub content: Option<String>,
    #[validate(custom(function = "validate_message_type"))]
    pub message_type: String,
    pub media_url: Option<String>,
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn validate_receiver_id(raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(invalid("required", "receiverId is required"));
    }
    if !is_well_formed_user_id(raw) {
        return Err(invalid("format", "Invalid receiver ID format"));
    }
    Ok(())
}

fn validate_message_type(raw: &str) -> Result<(), ValidationError> {
    match raw {
        "" => Err(invalid("required", "messageType is required")),
        "text" | "image" | "video" | "document" | "audio" => Ok(()),
        _ => Err(invalid(
            "one_of",
            "messageType must be one of [text, image, video, document, audio]",
        )),
    }
}

/// Flattens validator output into one stable, human-readable line.
pub fn describe_validation(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

impl SendMessagePayload {
    pub fn into_new_message(self) -> AppResult<NewMessage> {
        self.validate()?;
        let message_type = self.message_type.parse()?;
        let message = NewMessage::new(
            UserId::new(self.user_id),
            UserId::new(self.receiver_id),
            message_type,
            self.content,
            self.media_url,
        );
        message.validate()?;
        Ok(message)
    }
}

/// Frames pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum WsOutboundEvent {
    ReceiveMessage(MessageView),
    MessageSent {
        message_id: MessageId,
        status: MessageStatus,
        outcome: DeliveryOutcome,
    },
    MessageRead {
        message_id: MessageId,
    },
    MessageDeleted {
        message_id: MessageId,
    },
    UserTyping {
        user_id: UserId,
        is_typing: bool,
    },
    Error {
        message: String,
    },
}

impl WsOutboundEvent {
    pub fn error(message: impl Into<String>) -> Self {
        WsOutboundEvent::Error {
            message: message.into(),
        }
    }
}
