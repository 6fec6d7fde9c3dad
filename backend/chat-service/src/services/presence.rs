//! Which users are online, and through which connections.

use crate::error::AppResult;
use crate::models::UserId;
use crate::redis_client::RedisClient;
use crate::websocket::ConnectionHandle;
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Binds `handle` to `user`. Re-registering a handle moves it to the new user.
    async fn register(&self, handle: ConnectionHandle, user: &UserId) -> AppResult<()>;

    /// Removes exactly this handle; the user's other connections stay present.
    async fn unregister(&self, handle: ConnectionHandle) -> AppResult<()>;

    async fn is_present(&self, user: &UserId) -> AppResult<bool>;

    async fn connections_for(&self, user: &UserId) -> AppResult<HashSet<ConnectionHandle>>;

    /// Keeps a live handle's entry from lapsing. A no-op for backends whose
    /// entries never expire.
    async fn refresh(&self, _handle: ConnectionHandle, _user: &UserId) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct PresenceMaps {
    by_handle: HashMap<ConnectionHandle, UserId>,
    by_user: HashMap<UserId, HashSet<ConnectionHandle>>,
}

impl PresenceMaps {
    fn detach(&mut self, handle: ConnectionHandle) -> Option<UserId> {
        let user = self.by_handle.remove(&handle)?;
        if let Some(handles) = self.by_user.get_mut(&user) {
            handles.remove(&handle);
            if handles.is_empty() {
                self.by_user.remove(&user);
            }
        }
        Some(user)
    }
}

/// Process-local registry. Both directions of the mapping share one lock.
#[derive(Default)]
pub struct InMemoryPresenceRegistry {
    maps: RwLock<PresenceMaps>,
}

impl InMemoryPresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn online_users(&self) -> usize {
        self.maps.read().await.by_user.len()
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresenceRegistry {
    async fn register(&self, handle: ConnectionHandle, user: &UserId) -> AppResult<()> {
        let mut maps = self.maps.write().await;
        if let Some(previous) = maps.detach(handle) {
            if &previous != user {
                tracing::debug!(
                    connection = %handle,
                    from = %previous,
                    to = %user,
                    "connection rebound"
                );
            }
        }
        maps.by_handle.insert(handle, user.clone());
        maps.by_user.entry(user.clone()).or_default().insert(handle);
        Ok(())
    }

    async fn unregister(&self, handle: ConnectionHandle) -> AppResult<()> {
        self.maps.write().await.detach(handle);
        Ok(())
    }

    async fn is_present(&self, user: &UserId) -> AppResult<bool> {
        Ok(self
            .maps
            .read()
            .await
            .by_user
            .get(user)
            .is_some_and(|handles| !handles.is_empty()))
    }

    async fn connections_for(&self, user: &UserId) -> AppResult<HashSet<ConnectionHandle>> {
        Ok(self
            .maps
            .read()
            .await
            .by_user
            .get(user)
            .cloned()
            .unwrap_or_default())
    }
}

const KEY_PREFIX: &str = "chat:presence";

fn handle_key(handle: ConnectionHandle) -> String {
    format!("{KEY_PREFIX}:conn:{handle}")
}

fn user_key(user: &UserId) -> String {
    format!("{KEY_PREFIX}:user:{user}")
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Binds `handle` to `user` until `now + ttl` (unix millis), detaching it
/// from `previous` when the handle is being moved.
fn bind_pipeline(
    handle: ConnectionHandle,
    user: &UserId,
    previous: Option<&str>,
    now: i64,
    ttl: Duration,
) -> redis::Pipeline {
    let ttl_ms = ttl_millis(ttl);
    let member = handle.to_string();
    let set_key = user_key(user);

    let mut pipe = redis::pipe();
    pipe.atomic();
    if let Some(previous) = previous.filter(|p| *p != user.as_str()) {
        pipe.cmd("ZREM")
            .arg(user_key(&UserId::from(previous)))
            .arg(&member)
            .ignore();
    }
    pipe.cmd("SET")
        .arg(handle_key(handle))
        .arg(user.as_str())
        .arg("PX")
        .arg(ttl_ms)
        .ignore()
        .cmd("ZADD")
        .arg(&set_key)
        .arg(now.saturating_add(ttl_ms))
        .arg(&member)
        .ignore()
        .cmd("ZREMRANGEBYSCORE")
        .arg(&set_key)
        .arg("-inf")
        .arg(now)
        .ignore()
        .cmd("PEXPIRE")
        .arg(&set_key)
        .arg(ttl_ms)
        .ignore();
    pipe
}

fn unbind_pipeline(handle: ConnectionHandle, user: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("DEL")
        .arg(handle_key(handle))
        .ignore()
        .cmd("ZREM")
        .arg(user_key(&UserId::from(user)))
        .arg(handle.to_string())
        .ignore();
    pipe
}

/// Exclusive lower bound on the expiry score of a live member.
fn live_after(now: i64) -> String {
    format!("({now}")
}

/// Presence shared through redis so several processes agree on who is online.
/// Pushes still reach only the connections owned by this process.
///
/// Each handle is a member of `chat:presence:user:<id>` scored by its expiry,
/// next to a `chat:presence:conn:<handle>` key with the same TTL. Entries of a
/// process that died without unregistering lapse once the TTL passes.
#[derive(Clone)]
pub struct RedisPresenceRegistry {
    redis: RedisClient,
    ttl: Duration,
}

impl RedisPresenceRegistry {
    pub fn new(redis: RedisClient, ttl: Duration) -> Self {
        Self { redis, ttl }
    }
}

#[async_trait]
impl PresenceRegistry for RedisPresenceRegistry {
    async fn register(&self, handle: ConnectionHandle, user: &UserId) -> AppResult<()> {
        let mut conn = self.redis.connection();
        let previous: Option<String> = conn.get(handle_key(handle)).await?;

        bind_pipeline(handle, user, previous.as_deref(), Utc::now().timestamp_millis(), self.ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn unregister(&self, handle: ConnectionHandle) -> AppResult<()> {
        let mut conn = self.redis.connection();
        let previous: Option<String> = conn.get(handle_key(handle)).await?;
        let Some(previous) = previous else {
            return Ok(());
        };

        unbind_pipeline(handle, &previous)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_present(&self, user: &UserId) -> AppResult<bool> {
        let mut conn = self.redis.connection();
        let count: usize = redis::cmd("ZCOUNT")
            .arg(user_key(user))
            .arg(live_after(Utc::now().timestamp_millis()))
            .arg("+inf")
            .query_async(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn connections_for(&self, user: &UserId) -> AppResult<HashSet<ConnectionHandle>> {
        let mut conn = self.redis.connection();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(user_key(user))
            .arg(live_after(Utc::now().timestamp_millis()))
            .arg("+inf")
            .query_async(&mut conn)
            .await?;
        Ok(members
            .iter()
            .filter_map(|raw| match raw.parse() {
                Ok(handle) => Some(handle),
                Err(_) => {
                    tracing::warn!(member = %raw, "discarding malformed presence entry");
                    None
                }
            })
            .collect())
    }

    async fn refresh(&self, handle: ConnectionHandle, user: &UserId) -> AppResult<()> {
        let mut conn = self.redis.connection();
        bind_pipeline(handle, user, None, Utc::now().timestamp_millis(), self.ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(id: &str) -> UserId {
        UserId::from(id)
    }

    #[tokio::test]
    async fn multi_device_presence() {
        let presence = InMemoryPresenceRegistry::new();
        let phone = ConnectionHandle::new();
        let laptop = ConnectionHandle::new();
        presence.register(phone, &uid("A1")).await.unwrap();
        presence.register(laptop, &uid("A1")).await.unwrap();

        assert!(presence.is_present(&uid("A1")).await.unwrap());
        assert_eq!(presence.connections_for(&uid("A1")).await.unwrap().len(), 2);

        presence.unregister(phone).await.unwrap();
        assert!(presence.is_present(&uid("A1")).await.unwrap());
        let remaining = presence.connections_for(&uid("A1")).await.unwrap();
        assert_eq!(remaining, HashSet::from([laptop]));

        presence.unregister(laptop).await.unwrap();
        assert!(!presence.is_present(&uid("A1")).await.unwrap());
        assert_eq!(presence.online_users().await, 0);
    }

    #[tokio::test]
    async fn re_register_moves_handle() {
        let presence = InMemoryPresenceRegistry::new();
        let handle = ConnectionHandle::new();
        presence.register(handle, &uid("A1")).await.unwrap();
        presence.register(handle, &uid("B1")).await.unwrap();

        assert!(!presence.is_present(&uid("A1")).await.unwrap());
        assert!(presence.is_present(&uid("B1")).await.unwrap());
    }

    #[tokio::test]
    async fn unregister_unknown_handle_is_noop() {
        let presence = InMemoryPresenceRegistry::new();
        presence.register(ConnectionHandle::new(), &uid("A1")).await.unwrap();
        presence.unregister(ConnectionHandle::new()).await.unwrap();
        assert!(presence.is_present(&uid("A1")).await.unwrap());
    }

    fn packed(pipe: &redis::Pipeline) -> String {
        String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned()
    }

    fn bulk(word: &str) -> String {
        format!("${}\r\n{word}\r\n", word.len())
    }

    #[tokio::test]
    async fn memory_refresh_keeps_presence() {
        let presence = InMemoryPresenceRegistry::new();
        let handle = ConnectionHandle::new();
        presence.register(handle, &uid("A1")).await.unwrap();
        presence.refresh(handle, &uid("A1")).await.unwrap();
        assert_eq!(
            presence.connections_for(&uid("A1")).await.unwrap(),
            HashSet::from([handle])
        );
    }

    #[test]
    fn bind_expires_both_keys() {
        let handle = ConnectionHandle::new();
        let raw = packed(&bind_pipeline(
            handle,
            &uid("B1"),
            None,
            1_000,
            Duration::from_secs(60),
        ));

        assert!(raw.contains(&bulk("MULTI")) && raw.contains(&bulk("EXEC")));
        let set = format!(
            "{}{}{}{}{}",
            bulk("SET"),
            bulk(&handle_key(handle)),
            bulk("B1"),
            bulk("PX"),
            bulk("60000")
        );
        assert!(raw.contains(&set), "{raw}");
        let zadd = format!(
            "{}{}{}{}",
            bulk("ZADD"),
            bulk("chat:presence:user:B1"),
            bulk("61000"),
            bulk(&handle.to_string())
        );
        assert!(raw.contains(&zadd), "{raw}");
        let prune = format!(
            "{}{}{}{}",
            bulk("ZREMRANGEBYSCORE"),
            bulk("chat:presence:user:B1"),
            bulk("-inf"),
            bulk("1000")
        );
        assert!(raw.contains(&prune), "{raw}");
        let expire = format!(
            "{}{}{}",
            bulk("PEXPIRE"),
            bulk("chat:presence:user:B1"),
            bulk("60000")
        );
        assert!(raw.contains(&expire), "{raw}");
        assert!(!raw.contains(&bulk("ZREM")));
    }

    #[test]
    fn bind_detaches_from_previous_user_only_when_moving() {
        let handle = ConnectionHandle::new();
        let ttl = Duration::from_secs(60);

        let moved = packed(&bind_pipeline(handle, &uid("B1"), Some("A1"), 0, ttl));
        let detach = format!(
            "{}{}{}",
            bulk("ZREM"),
            bulk("chat:presence:user:A1"),
            bulk(&handle.to_string())
        );
        assert!(moved.contains(&detach), "{moved}");

        let same = packed(&bind_pipeline(handle, &uid("B1"), Some("B1"), 0, ttl));
        assert!(!same.contains(&bulk("ZREM")));
    }

    #[test]
    fn unbind_drops_handle_key_and_member() {
        let handle = ConnectionHandle::new();
        let raw = packed(&unbind_pipeline(handle, "A1"));
        assert!(raw.contains(&format!("{}{}", bulk("DEL"), bulk(&handle_key(handle)))));
        assert!(raw.contains(&format!(
            "{}{}{}",
            bulk("ZREM"),
            bulk("chat:presence:user:A1"),
            bulk(&handle.to_string())
        )));
    }

    #[test]
    fn expired_members_are_not_live() {
        assert_eq!(live_after(1_000), "(1000");
    }

    #[test]
    fn redis_keys_are_namespaced() {
        let handle = ConnectionHandle::new();
        assert_eq!(handle_key(handle), format!("chat:presence:conn:{handle}"));
        assert_eq!(user_key(&uid("B1")), "chat:presence:user:B1");
    }
}
