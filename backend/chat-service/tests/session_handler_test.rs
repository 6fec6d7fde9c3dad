mod common;

use async_trait::async_trait;
use chat_service::config::Config;
use chat_service::error::AppResult;
use chat_service::models::{MessageStatus, NewMessage, UserId};
use chat_service::services::notification_sink::LogOnlyNotificationSink;
use chat_service::services::presence::{InMemoryPresenceRegistry, PresenceRegistry};
use chat_service::services::profile_directory::InMemoryProfileDirectory;
use chat_service::state::AppState;
use chat_service::store::{InMemoryMessageStore, MessageStore};
use chat_service::websocket::session::{SessionHandler, SessionState};
use chat_service::websocket::ConnectionHandle;
use common::{text_message, Harness, SinkBehavior};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory presence that counts refreshes.
#[derive(Default)]
struct CountingPresence {
    inner: InMemoryPresenceRegistry,
    refreshes: AtomicUsize,
}

#[async_trait]
impl PresenceRegistry for CountingPresence {
    async fn register(&self, handle: ConnectionHandle, user: &UserId) -> AppResult<()> {
        self.inner.register(handle, user).await
    }

    async fn unregister(&self, handle: ConnectionHandle) -> AppResult<()> {
        self.inner.unregister(handle).await
    }

    async fn is_present(&self, user: &UserId) -> AppResult<bool> {
        self.inner.is_present(user).await
    }

    async fn connections_for(&self, user: &UserId) -> AppResult<HashSet<ConnectionHandle>> {
        self.inner.connections_for(user).await
    }

    async fn refresh(&self, handle: ConnectionHandle, user: &UserId) -> AppResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.inner.register(handle, user).await
    }
}

#[tokio::test]
async fn lifecycle_moves_from_unjoined_to_disconnected() {
    let h = Harness::new();
    let mut client = h.connect().await;
    assert_eq!(client.session.state(), &SessionState::Unjoined);

    client.emit("join", serde_json::json!({ "userId": "B1" })).await;
    assert_eq!(client.session.state(), &SessionState::Joined(UserId::from("B1")));
    assert!(h.presence.is_present(&UserId::from("B1")).await.unwrap());

    client.session.disconnect().await;
    assert_eq!(client.session.state(), &SessionState::Disconnected);
    assert!(!h.presence.is_present(&UserId::from("B1")).await.unwrap());
    assert_eq!(h.state.connections.connection_count().await, 0);

    client.emit("send_message", text_message("B1", "A1", "late")).await;
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn rejoin_rebinds_the_connection() {
    let h = Harness::new();
    let mut client = h.join("A1").await;
    client.emit("join", serde_json::json!({ "userId": "A2" })).await;

    assert_eq!(client.session.state(), &SessionState::Joined(UserId::from("A2")));
    assert!(!h.presence.is_present(&UserId::from("A1")).await.unwrap());
    assert!(h.presence.is_present(&UserId::from("A2")).await.unwrap());
}

#[tokio::test]
async fn join_with_malformed_id_is_refused() {
    let h = Harness::new();
    let mut client = h.connect().await;
    client.emit("join", serde_json::json!({ "userId": "" })).await;

    assert_eq!(client.session.state(), &SessionState::Unjoined);
    let errors = client.events_named("error");
    assert_eq!(errors[0]["data"]["message"], "Invalid user ID format");
}

#[tokio::test]
async fn typing_is_relayed_without_ack() {
    let h = Harness::new();
    let mut a1 = h.join("A1").await;
    let mut b1 = h.join("B1").await;
    let mut c1 = h.join("C1").await;

    a1.emit(
        "typing",
        serde_json::json!({ "receiverId": "B1", "userId": "A1", "isTyping": true }),
    )
    .await;

    let relayed = b1.drain();
    assert_eq!(
        relayed,
        vec![serde_json::json!({
            "event": "user_typing",
            "data": { "userId": "A1", "isTyping": true }
        })]
    );
    assert!(a1.drain().is_empty());
    assert!(c1.drain().is_empty());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn unknown_frames_are_dropped_quietly() {
    let h = Harness::new();
    let mut client = h.join("A1").await;
    client.session.handle_text("{\"event\":\"dance\",\"data\":{}}").await;
    client.session.handle_text("not json").await;
    assert!(client.drain().is_empty());
}

#[tokio::test]
async fn payload_identity_is_trusted_by_default() {
    let h = Harness::new();
    let mut unjoined = h.connect().await;
    unjoined.emit("send_message", text_message("A1", "B1", "before join")).await;

    let mut joined = h.join("A1").await;
    joined.emit("send_message", text_message("Z9", "B1", "spoofed")).await;

    assert_eq!(h.store.len().await, 2);
    assert_eq!(unjoined.events_named("message_sent").len(), 1);
    assert_eq!(joined.events_named("message_sent").len(), 1);
    let senders: Vec<String> = h
        .sink
        .calls()
        .iter()
        .map(|c| c.from_user.to_string())
        .collect();
    assert_eq!(senders, vec!["A1", "Z9"]);
}

#[tokio::test]
async fn bound_identity_rejects_mismatched_events() {
    let mut config = Config::test_defaults();
    config.enforce_bound_identity = true;
    let h = Harness::with(config, SinkBehavior::Accept);
    let mut b1 = h.join("B1").await;
    let mut a1 = h.join("A1").await;

    a1.emit("send_message", text_message("Z9", "B1", "spoofed")).await;
    let errors = a1.events_named("error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["data"]["message"], "userId does not match joined user");
    assert!(h.store.is_empty().await);

    a1.emit(
        "typing",
        serde_json::json!({ "receiverId": "B1", "userId": "Z9", "isTyping": true }),
    )
    .await;
    assert!(b1.drain().is_empty());
    assert!(a1.drain().is_empty());

    a1.emit("send_message", text_message("A1", "B1", "legit")).await;
    assert_eq!(a1.events_named("message_sent").len(), 1);
    assert_eq!(b1.events_named("receive_message").len(), 1);
}

#[tokio::test]
async fn bound_identity_rejects_events_before_join() {
    let mut config = Config::test_defaults();
    config.enforce_bound_identity = true;
    let h = Harness::with(config, SinkBehavior::Accept);
    let mut client = h.connect().await;

    client.emit("send_message", text_message("A1", "B1", "x")).await;

    assert_eq!(client.events_named("error").len(), 1);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn concurrent_presence_churn_leaves_no_ghosts() {
    let h = Harness::new();
    let stay = ConnectionHandle::new();
    h.presence.register(stay, &UserId::from("A1")).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let presence = h.presence.clone();
        tasks.push(tokio::spawn(async move {
            let handle = ConnectionHandle::new();
            let user = UserId::from("A1");
            presence.register(handle, &user).await.unwrap();
            tokio::task::yield_now().await;
            presence.unregister(handle).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let remaining = h.presence.connections_for(&UserId::from("A1")).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.contains(&stay));
}

#[tokio::test]
async fn concurrent_read_and_delete_end_deleted() {
    let h = Harness::new();
    let message = h
        .store
        .create(NewMessage::text("A1".into(), "B1".into(), "race"))
        .await
        .unwrap();

    let id = message.id;
    let store: Arc<dyn MessageStore> = h.store.clone();
    let reader = {
        let store = store.clone();
        tokio::spawn(async move { store.mark_read(id).await })
    };
    let deleter = {
        let store = store.clone();
        tokio::spawn(async move { store.mark_deleted(id, &UserId::from("A1")).await })
    };
    let _ = reader.await.unwrap();
    deleter.await.unwrap().unwrap();

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Deleted);
    assert!(stored.read_at.is_none());
}

#[tokio::test]
async fn presence_is_refreshed_only_while_joined() {
    let presence = Arc::new(CountingPresence::default());
    let state = AppState::new(
        Arc::new(Config::test_defaults()),
        Arc::new(InMemoryMessageStore::new()),
        presence.clone(),
        Arc::new(InMemoryProfileDirectory::new()),
        Arc::new(LogOnlyNotificationSink),
    );
    let (handle, _rx) = state.connections.add_connection().await;
    let mut session = SessionHandler::new(handle, &state);

    session.refresh_presence().await;
    assert_eq!(presence.refreshes.load(Ordering::SeqCst), 0);

    session
        .handle_text(r#"{"event":"join","data":{"userId":"B1"}}"#)
        .await;
    session.refresh_presence().await;
    assert_eq!(presence.refreshes.load(Ordering::SeqCst), 1);

    session.disconnect().await;
    session.refresh_presence().await;
    assert_eq!(presence.refreshes.load(Ordering::SeqCst), 1);
    assert!(!presence.is_present(&UserId::from("B1")).await.unwrap());
}
