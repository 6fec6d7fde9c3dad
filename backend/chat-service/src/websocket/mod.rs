use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod message_types;
pub mod session;

/// Opaque identifier of one live socket.
///
/// Presence and delivery are keyed by handle so that closing one device never
/// affects another device of the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(Uuid);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Outbound channels of the sockets owned by this process.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionHandle, UnboundedSender<String>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for the new socket and the receiver its writer drains.
    pub async fn add_connection(&self) -> (ConnectionHandle, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let handle = ConnectionHandle::new();

        let mut guard = self.inner.write().await;
        guard.insert(handle, tx);
        tracing::debug!(connection = %handle, total = guard.len(), "connection added");

        (handle, rx)
    }

    /// Must be called when a socket closes.
    pub async fn remove_connection(&self, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        if guard.remove(&handle).is_some() {
            tracing::debug!(connection = %handle, remaining = guard.len(), "connection removed");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns `false` if the connection is gone; dead senders are dropped.
    pub async fn send(&self, handle: ConnectionHandle, text: String) -> bool {
        self.send_many(std::iter::once(handle), text).await == 1
    }

    /// Serializes `event` once and pushes it to every live handle given.
    /// Returns how many connections accepted it.
    pub async fn push<E, I>(&self, handles: I, event: &E) -> usize
    where
        E: Serialize,
        I: IntoIterator<Item = ConnectionHandle>,
    {
        match serde_json::to_string(event) {
            Ok(text) => self.send_many(handles, text).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound event");
                0
            }
        }
    }

    async fn send_many<I>(&self, handles: I, text: String) -> usize
    where
        I: IntoIterator<Item = ConnectionHandle>,
    {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let guard = self.inner.read().await;
            for handle in handles {
                let Some(sender) = guard.get(&handle) else {
                    continue;
                };
                if sender.send(text.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(handle);
                }
            }
        }

        if !dead.is_empty() {
            let mut guard = self.inner.write().await;
            for handle in dead {
                // A closed receiver never reopens, so the entry is still dead.
                if guard.get(&handle).is_some_and(|sender| sender.is_closed()) {
                    guard.remove(&handle);
                    tracing::debug!(connection = %handle, "dead sender cleaned up");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_reaches_only_listed_connections() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = registry.add_connection().await;
        let (_b, mut rx_b) = registry.add_connection().await;

        let sent = registry
            .push([a], &serde_json::json!({"event": "ping"}))
            .await;
        assert_eq!(sent, 1);
        assert_eq!(rx_a.recv().await.unwrap(), r#"{"event":"ping"}"#);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_senders_are_cleaned_up() {
        let registry = ConnectionRegistry::new();
        let (handle, rx) = registry.add_connection().await;
        drop(rx);

        assert!(!registry.send(handle, "x".into()).await);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn removed_connection_receives_nothing() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = registry.add_connection().await;
        registry.remove_connection(handle).await;
        assert!(!registry.send(handle, "x".into()).await);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_pushes_share_the_registry() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let (handle, rx) = registry.add_connection().await;
            handles.push(handle);
            receivers.push(rx);
        }
        let (dead, dead_rx) = registry.add_connection().await;
        drop(dead_rx);

        let pushes = handles.iter().map(|&handle| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .push([handle, dead], &serde_json::json!({"event": "ping"}))
                    .await
            })
        });
        for task in pushes.collect::<Vec<_>>() {
            assert_eq!(task.await.unwrap(), 1);
        }

        for rx in &mut receivers {
            assert_eq!(rx.recv().await.unwrap(), r#"{"event":"ping"}"#);
        }
        assert_eq!(registry.connection_count().await, 8);
    }

    #[test]
    fn handle_round_trips_through_text() {
        let handle = ConnectionHandle::new();
        let parsed: ConnectionHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
    }
}
