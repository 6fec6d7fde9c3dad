use super::{DeletedFilter, MessageStore};
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageId, MessageStatus, NewMessage, Page, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    messages: HashMap<MessageId, Message>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing so insertion order is never ambiguous.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn get_mut(&mut self, id: MessageId) -> AppResult<&mut Message> {
        self.messages.get_mut(&id).ok_or(AppError::NotFound)
    }
}

/// Message store kept in process memory. All writes go through one lock.
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: RwLock<Inner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn newest_first(a: &Message, b: &Message) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

fn window(messages: Vec<Message>, page: Page) -> Vec<Message> {
    messages
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, input: NewMessage) -> AppResult<Message> {
        input.validate()?;
        let mut inner = self.inner.write().await;
        let now = inner.next_timestamp();
        let message = Message {
            id: MessageId::generate(),
            sender_id: input.sender_id,
            receiver_id: input.receiver_id,
            content: input.content,
            media_url: input.media_url,
            message_type: input.message_type,
            status: MessageStatus::Sent,
            read_at: None,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        };
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find(&self, id: MessageId) -> AppResult<Option<Message>> {
        Ok(self.inner.read().await.messages.get(&id).cloned())
    }

    async fn set_delivered(&self, id: MessageId) -> AppResult<Message> {
        let mut inner = self.inner.write().await;
        let message = inner.get_mut(id)?;
        message.mark_delivered(Utc::now());
        Ok(message.clone())
    }

    async fn mark_read(&self, id: MessageId) -> AppResult<Message> {
        let mut inner = self.inner.write().await;
        let message = inner.get_mut(id)?;
        message.mark_read(Utc::now())?;
        Ok(message.clone())
    }

    async fn mark_deleted(&self, id: MessageId, by: &UserId) -> AppResult<Message> {
        let mut inner = self.inner.write().await;
        let message = inner.get_mut(id)?;
        message.mark_deleted(by, Utc::now());
        Ok(message.clone())
    }

    async fn latest_per_counterpart(
        &self,
        user: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut involved: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| (&m.sender_id == user || &m.receiver_id == user) && deleted.admits(m))
            .cloned()
            .collect();
        drop(inner);
        involved.sort_by(newest_first);

        let mut seen = HashSet::new();
        let latest = involved
            .into_iter()
            .filter(|m| seen.insert(m.counterpart_of(user).clone()))
            .collect();
        Ok(window(latest, page))
    }

    async fn between(
        &self,
        user: &UserId,
        counterpart: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| {
                let forward = &m.sender_id == user && &m.receiver_id == counterpart;
                let backward = &m.sender_id == counterpart && &m.receiver_id == user;
                (forward || backward) && deleted.admits(m)
            })
            .cloned()
            .collect();
        drop(inner);
        messages.sort_by(newest_first);
        Ok(window(messages, page))
    }
}
