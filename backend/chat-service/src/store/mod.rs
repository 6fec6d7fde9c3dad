//! Durable record of direct messages and their lifecycle.
//!
//! Two backends share the same contract: [`InMemoryMessageStore`] for
//! development and tests, [`PgMessageStore`] for production.

use crate::error::AppResult;
use crate::models::{Message, MessageId, NewMessage, Page, UserId};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::PgMessageStore;

/// Whether soft-deleted messages take part in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedFilter {
    #[default]
    Exclude,
    Include,
}

impl DeletedFilter {
    pub fn admits(&self, message: &Message) -> bool {
        matches!(self, DeletedFilter::Include) || !message.is_deleted()
    }
}

/// Queries order by `createdAt` descending, ties broken by id descending.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a new message with status SENT. Fails with `Validation` when
    /// the payload required by its type is missing.
    async fn create(&self, input: NewMessage) -> AppResult<Message>;

    async fn find(&self, id: MessageId) -> AppResult<Option<Message>>;

    /// SENT -> DELIVERED. A no-op for messages already past SENT.
    async fn set_delivered(&self, id: MessageId) -> AppResult<Message>;

    async fn mark_read(&self, id: MessageId) -> AppResult<Message>;

    async fn mark_deleted(&self, id: MessageId, by: &UserId) -> AppResult<Message>;

    /// Most recent message per counterpart of `user`, paginated over counterparts.
    async fn latest_per_counterpart(
        &self,
        user: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>>;

    /// Messages exchanged between the two users in either direction.
    async fn between(
        &self,
        user: &UserId,
        counterpart: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>>;
}
