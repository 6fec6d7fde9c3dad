use crate::config::{Config, PresenceBackend};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::redis_client::RedisClient;
use crate::services::{
    conversation_service::ConversationService,
    delivery_router::{DeliveryRouter, RouterSettings},
    notification_sink::{HttpNotificationSink, LogOnlyNotificationSink, NotificationSink},
    presence::{InMemoryPresenceRegistry, PresenceRegistry, RedisPresenceRegistry},
    profile_directory::{InMemoryProfileDirectory, PgProfileDirectory, ProfileDirectory},
};
use crate::store::{InMemoryMessageStore, MessageStore, PgMessageStore};
use crate::websocket::ConnectionRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: ConnectionRegistry,
    pub presence: Arc<dyn PresenceRegistry>,
    pub router: Arc<DeliveryRouter>,
    pub conversations: Arc<ConversationService>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn MessageStore>,
        presence: Arc<dyn PresenceRegistry>,
        profiles: Arc<dyn ProfileDirectory>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let connections = ConnectionRegistry::new();
        let router = Arc::new(DeliveryRouter::new(
            store.clone(),
            presence.clone(),
            connections.clone(),
            notifications,
            RouterSettings::from_config(&config),
        ));
        let conversations = Arc::new(ConversationService::new(
            store,
            profiles,
            config.file_base_url.clone(),
        ));
        Self {
            config,
            connections,
            presence,
            router,
            conversations,
        }
    }

    /// Picks every backend from configuration.
    pub async fn from_config(config: Arc<Config>) -> AppResult<Self> {
        let (store, profiles): (Arc<dyn MessageStore>, Arc<dyn ProfileDirectory>) =
            match &config.database_url {
                Some(url) => {
                    let pool = db::init_pool(url, config.database_max_connections)
                        .await
                        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
                    let store: Arc<dyn MessageStore> =
                        Arc::new(PgMessageStore::new(pool.clone()));
                    let profiles: Arc<dyn ProfileDirectory> =
                        Arc::new(PgProfileDirectory::new(pool));
                    (store, profiles)
                }
                None => {
                    tracing::warn!("DATABASE_URL not set; messages are kept in memory only");
                    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
                    let profiles: Arc<dyn ProfileDirectory> =
                        Arc::new(InMemoryProfileDirectory::new());
                    (store, profiles)
                }
            };

        let presence: Arc<dyn PresenceRegistry> = match config.presence_backend {
            PresenceBackend::Memory => Arc::new(InMemoryPresenceRegistry::new()),
            PresenceBackend::Redis => {
                let redis = RedisClient::from_url(&config.redis_url)
                    .await
                    .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;
                Arc::new(RedisPresenceRegistry::new(redis, config.presence_ttl))
            }
        };

        let notifications: Arc<dyn NotificationSink> = match &config.notification_service_url {
            Some(url) => Arc::new(
                HttpNotificationSink::new(url, config.notification_timeout)
                    .map_err(|e| AppError::StartServer(format!("notification client: {e}")))?,
            ),
            None => {
                tracing::warn!(
                    "NOTIFICATION_SERVICE_URL not set; offline notifications are only logged"
                );
                Arc::new(LogOnlyNotificationSink)
            }
        };

        Ok(Self::new(config, store, presence, profiles, notifications))
    }
}
