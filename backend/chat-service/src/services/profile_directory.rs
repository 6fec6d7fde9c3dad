//! Read-only lookup of counterpart profiles.

use crate::error::AppResult;
use crate::models::{UserId, UserProfile};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Missing users are simply absent from the map.
    async fn profiles(&self, ids: &[UserId]) -> AppResult<HashMap<UserId, UserProfile>>;
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    username: Option<String>,
    avatar_location: Option<String>,
}

/// Reads the user service's `users` and `files` tables.
#[derive(Clone)]
pub struct PgProfileDirectory {
    pool: PgPool,
}

impl PgProfileDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileDirectory for PgProfileDirectory {
    async fn profiles(&self, ids: &[UserId]) -> AppResult<HashMap<UserId, UserProfile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT u.id::text AS id, u.username, f.location AS avatar_location
            FROM users u
            LEFT JOIN files f ON f.id = u.avatar_file_id
            WHERE u.id::text = ANY($1)
            "#,
        )
        .bind(&keys)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = UserId::new(row.id);
                let profile = UserProfile {
                    id: id.clone(),
                    username: row.username,
                    avatar_location: row.avatar_location,
                };
                (id, profile)
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProfileDirectory {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn profiles(&self, ids: &[UserId]) -> AppResult<HashMap<UserId, UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}
