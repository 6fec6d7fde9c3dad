pub mod conversation;
pub mod message;
pub mod page;

pub use conversation::{avatar_url, ConversationSummary, CounterpartProfile, UserProfile};
pub use message::{
    conversation_id, Message, MessageId, MessageStatus, MessageType, MessageView, NewMessage,
    UserId,
};
pub use page::{Page, PageQuery};
