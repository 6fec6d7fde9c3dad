pub mod conversation_service;
pub mod delivery_router;
pub mod notification_sink;
pub mod presence;
pub mod profile_directory;

pub use conversation_service::ConversationService;
pub use delivery_router::{DeliveryOutcome, DeliveryRouter, RouterSettings, SendReceipt};
pub use notification_sink::{NotificationError, NotificationRequest, NotificationSink};
pub use presence::{InMemoryPresenceRegistry, PresenceRegistry, RedisPresenceRegistry};
pub use profile_directory::{InMemoryProfileDirectory, ProfileDirectory};
