use super::{DeletedFilter, MessageStore};
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageId, NewMessage, Page, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, media_url, message_type, \
     status, read_at, deleted_at, deleted_by, created_at, updated_at";

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: String,
    receiver_id: String,
    content: Option<String>,
    media_url: Option<String>,
    message_type: String,
    status: String,
    read_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from_uuid(row.id),
            sender_id: UserId::new(row.sender_id),
            receiver_id: UserId::new(row.receiver_id),
            content: row.content,
            media_url: row.media_url,
            message_type: row.message_type.parse()?,
            status: row.status.parse()?,
            read_at: row.read_at,
            deleted_at: row.deleted_at,
            deleted_by: row.deleted_by.map(UserId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> AppResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

fn limit_offset(page: Page) -> (i64, i64) {
    (
        i64::from(page.limit),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

/// Postgres-backed message store (`chat_messages`).
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the row under `FOR UPDATE`, applies `apply`, and writes back
    /// the lifecycle columns when it reports a change.
    async fn transition<F>(&self, id: MessageId, apply: F) -> AppResult<Message>
    where
        F: FnOnce(&mut Message, DateTime<Utc>) -> AppResult<bool> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        let mut message = Message::try_from(row)?;
        if apply(&mut message, Utc::now())? {
            sqlx::query(
                r#"
                UPDATE chat_messages
                SET status = $2, read_at = $3, deleted_at = $4, deleted_by = $5, updated_at = $6
                WHERE id = $1
                "#,
            )
            .bind(id.as_uuid())
            .bind(message.status.as_str())
            .bind(message.read_at)
            .bind(message.deleted_at)
            .bind(message.deleted_by.as_ref().map(UserId::as_str))
            .bind(message.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(message)
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, input: NewMessage) -> AppResult<Message> {
        input.validate()?;
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO chat_messages
                (id, sender_id, receiver_id, content, media_url, message_type, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'sent')
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(MessageId::generate().as_uuid())
        .bind(input.sender_id.as_str())
        .bind(input.receiver_id.as_str())
        .bind(input.content.as_deref())
        .bind(input.media_url.as_deref())
        .bind(input.message_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        let message = Message::try_from(row)?;
        tracing::debug!(message_id = %message.id, "message persisted");
        Ok(message)
    }

    async fn find(&self, id: MessageId) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Message::try_from).transpose()
    }

    async fn set_delivered(&self, id: MessageId) -> AppResult<Message> {
        self.transition(id, |m, now| Ok(m.mark_delivered(now))).await
    }

    async fn mark_read(&self, id: MessageId) -> AppResult<Message> {
        self.transition(id, |m, now| m.mark_read(now)).await
    }

    async fn mark_deleted(&self, id: MessageId, by: &UserId) -> AppResult<Message> {
        let by = by.clone();
        self.transition(id, move |m, now| Ok(m.mark_deleted(&by, now)))
            .await
    }

    async fn latest_per_counterpart(
        &self,
        user: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT DISTINCT ON (CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END)
                    {MESSAGE_COLUMNS}
                FROM chat_messages
                WHERE (sender_id = $1 OR receiver_id = $1)
                  AND ($2 OR deleted_at IS NULL)
                ORDER BY CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END,
                         created_at DESC, id DESC
            ) latest
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user.as_str())
        .bind(deleted == DeletedFilter::Include)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }

    async fn between(
        &self,
        user: &UserId,
        counterpart: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM chat_messages
            WHERE ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
              AND ($3 OR deleted_at IS NULL)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(user.as_str())
        .bind(counterpart.as_str())
        .bind(deleted == DeletedFilter::Include)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }
}
