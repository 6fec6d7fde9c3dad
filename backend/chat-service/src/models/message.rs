use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_USER_ID_LEN: usize = 64;

/// Opaque user identifier issued by the user service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 1..=64 characters from `[A-Za-z0-9_-]`.
    pub fn is_well_formed(&self) -> bool {
        is_well_formed_user_id(&self.0)
    }
}

pub fn is_well_formed_user_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_USER_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Time-ordered message id (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AppError::Validation(format!("invalid message id: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Document,
    Audio,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Audio => "audio",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "video" => Ok(MessageType::Video),
            "document" => Ok(MessageType::Document),
            "audio" => Ok(MessageType::Audio),
            other => Err(AppError::Validation(format!("unknown message type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Deleted => "deleted",
        }
    }

    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sent => 0,
            MessageStatus::Delivered => 1,
            MessageStatus::Read => 2,
            MessageStatus::Deleted => 3,
        }
    }

    /// SENT -> DELIVERED -> READ only move forward; any live status may become DELETED.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Deleted, _) => false,
            (_, MessageStatus::Deleted) => true,
            (from, to) => to.rank() > from.rank(),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "deleted" => Ok(MessageStatus::Deleted),
            other => {
                tracing::error!(status = other, "unknown message status in store");
                Err(AppError::Internal)
            }
        }
    }
}

/// Canonical key for the unordered pair of participants.
pub fn conversation_id(a: &UserId, b: &UserId) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn conversation_id(&self) -> String {
        conversation_id(&self.sender_id, &self.receiver_id)
    }

    /// The participant that is not `user`.
    pub fn counterpart_of(&self, user: &UserId) -> &UserId {
        if &self.sender_id == user {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `false` when the message is already delivered or past it.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_advance_to(MessageStatus::Delivered) {
            return false;
        }
        self.status = MessageStatus::Delivered;
        self.updated_at = now;
        true
    }

    pub fn mark_read(&mut self, now: DateTime<Utc>) -> AppResult<bool> {
        match self.status {
            MessageStatus::Read => Ok(false),
            MessageStatus::Deleted => Err(AppError::InvalidTransition {
                from: MessageStatus::Deleted,
                to: MessageStatus::Read,
            }),
            _ => {
                self.status = MessageStatus::Read;
                self.read_at = Some(now);
                self.updated_at = now;
                Ok(true)
            }
        }
    }

    /// Repeated deletes keep the first `deletedAt`/`deletedBy`.
    pub fn mark_deleted(&mut self, by: &UserId, now: DateTime<Utc>) -> bool {
        if self.status == MessageStatus::Deleted {
            return false;
        }
        self.status = MessageStatus::Deleted;
        self.read_at = None;
        self.deleted_at = Some(now);
        self.deleted_by = Some(by.clone());
        self.updated_at = now;
        true
    }
}

/// Wire form of a message, carrying the derived conversation key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub conversation_id: String,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        let conversation_id = message.conversation_id();
        Self {
            message,
            conversation_id,
        }
    }
}

/// Input for [`crate::store::MessageStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub media_url: Option<String>,
}

impl NewMessage {
    /// Empty strings are treated as absent.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        message_type: MessageType,
        content: Option<String>,
        media_url: Option<String>,
    ) -> Self {
        Self {
            sender_id,
            receiver_id,
            message_type,
            content: content.filter(|c| !c.is_empty()),
            media_url: media_url.filter(|m| !m.is_empty()),
        }
    }

    pub fn text(sender_id: UserId, receiver_id: UserId, content: impl Into<String>) -> Self {
        Self::new(
            sender_id,
            receiver_id,
            MessageType::Text,
            Some(content.into()),
            None,
        )
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.sender_id.is_well_formed() {
            return Err(AppError::Validation("Invalid sender ID format".into()));
        }
        if !self.receiver_id.is_well_formed() {
            return Err(AppError::Validation("Invalid receiver ID format".into()));
        }
        let has = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
        match self.message_type {
            MessageType::Text if !has(&self.content) => Err(AppError::Validation(
                "content is required for text messages".into(),
            )),
            MessageType::Text => Ok(()),
            other if !has(&self.media_url) => Err(AppError::Validation(format!(
                "mediaUrl is required for {other} messages"
            ))),
            _ => Ok(()),
        }
    }
}
