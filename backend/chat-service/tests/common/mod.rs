#![allow(dead_code)]

use async_trait::async_trait;
use chat_service::config::Config;
use chat_service::error::{AppError, AppResult};
use chat_service::models::{Message, MessageId, NewMessage, Page, UserId};
use chat_service::services::notification_sink::{
    NotificationError, NotificationRequest, NotificationSink,
};
use chat_service::services::presence::InMemoryPresenceRegistry;
use chat_service::services::profile_directory::InMemoryProfileDirectory;
use chat_service::state::AppState;
use chat_service::store::{DeletedFilter, InMemoryMessageStore, MessageStore};
use chat_service::websocket::session::SessionHandler;
use chat_service::websocket::ConnectionHandle;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const JWT_SECRET: &str = "test-secret";

#[derive(Debug, Clone, Copy)]
pub enum SinkBehavior {
    Accept,
    Fail,
    Hang(Duration),
}

/// Notification sink double that records every request it sees.
pub struct RecordingSink {
    behavior: SinkBehavior,
    calls: Mutex<Vec<NotificationRequest>>,
}

impl RecordingSink {
    pub fn new(behavior: SinkBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<NotificationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn create_and_send(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        self.calls.lock().unwrap().push(request);
        match self.behavior {
            SinkBehavior::Accept => Ok(()),
            SinkBehavior::Fail => Err(NotificationError::Rejected(500)),
            SinkBehavior::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

/// Store operations to fail with `StoreUnavailable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFaults {
    pub create: bool,
    pub set_delivered: bool,
}

/// Memory store that fails the operations named in its [`StoreFaults`].
pub struct FaultyStore {
    inner: Arc<InMemoryMessageStore>,
    faults: StoreFaults,
}

fn unavailable() -> AppError {
    AppError::StoreUnavailable("connection refused".into())
}

#[async_trait]
impl MessageStore for FaultyStore {
    async fn create(&self, input: NewMessage) -> AppResult<Message> {
        if self.faults.create {
            return Err(unavailable());
        }
        self.inner.create(input).await
    }

    async fn find(&self, id: MessageId) -> AppResult<Option<Message>> {
        self.inner.find(id).await
    }

    async fn set_delivered(&self, id: MessageId) -> AppResult<Message> {
        if self.faults.set_delivered {
            return Err(unavailable());
        }
        self.inner.set_delivered(id).await
    }

    async fn mark_read(&self, id: MessageId) -> AppResult<Message> {
        self.inner.mark_read(id).await
    }

    async fn mark_deleted(&self, id: MessageId, by: &UserId) -> AppResult<Message> {
        self.inner.mark_deleted(id, by).await
    }

    async fn latest_per_counterpart(
        &self,
        user: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        self.inner.latest_per_counterpart(user, deleted, page).await
    }

    async fn between(
        &self,
        user: &UserId,
        counterpart: &UserId,
        deleted: DeletedFilter,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        self.inner.between(user, counterpart, deleted, page).await
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<InMemoryMessageStore>,
    pub presence: Arc<InMemoryPresenceRegistry>,
    pub profiles: Arc<InMemoryProfileDirectory>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Config::test_defaults(), SinkBehavior::Accept)
    }

    pub fn with(config: Config, behavior: SinkBehavior) -> Self {
        Self::build(config, behavior, StoreFaults::default())
    }

    /// `store` still reads the underlying memory store; only the router and
    /// queries see the faults.
    pub fn with_store_faults(faults: StoreFaults) -> Self {
        Self::build(Config::test_defaults(), SinkBehavior::Accept, faults)
    }

    fn build(config: Config, behavior: SinkBehavior, faults: StoreFaults) -> Self {
        let store = Arc::new(InMemoryMessageStore::new());
        let faulty: Arc<dyn MessageStore> = Arc::new(FaultyStore {
            inner: store.clone(),
            faults,
        });
        let presence = Arc::new(InMemoryPresenceRegistry::new());
        let profiles = Arc::new(InMemoryProfileDirectory::new());
        let sink = Arc::new(RecordingSink::new(behavior));
        let state = AppState::new(
            Arc::new(config),
            faulty,
            presence.clone(),
            profiles.clone(),
            sink.clone(),
        );
        Self {
            state,
            store,
            presence,
            profiles,
            sink,
        }
    }

    pub async fn connect(&self) -> TestClient {
        let (handle, rx) = self.state.connections.add_connection().await;
        TestClient {
            handle,
            rx,
            session: SessionHandler::new(handle, &self.state),
        }
    }

    /// Connects and joins as `user`. Join has no acknowledgement.
    pub async fn join(&self, user: &str) -> TestClient {
        let mut client = self.connect().await;
        client.emit("join", serde_json::json!({ "userId": user })).await;
        client
    }
}

/// One simulated socket: the session handler plus the frames pushed to it.
pub struct TestClient {
    pub handle: ConnectionHandle,
    pub rx: UnboundedReceiver<String>,
    pub session: SessionHandler,
}

impl TestClient {
    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = serde_json::json!({ "event": event, "data": data }).to_string();
        self.session.handle_text(&frame).await;
    }

    /// Everything pushed so far, parsed.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    pub fn events_named(&mut self, name: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|frame| frame["event"] == name)
            .collect()
    }
}

pub fn text_message(from: &str, to: &str, content: &str) -> Value {
    serde_json::json!({
        "userId": from,
        "receiverId": to,
        "content": content,
        "messageType": "text",
    })
}
