pub mod api;
pub mod models;
pub mod store;

pub use models::{Conversation, Members, Message, NewMessage, SameMemberError, UserId};
pub use store::{
    ConversationStore, HandleDirectory, MessageBatch, StoreError, Subscription, WatermarkStore,
};

/// Milliseconds since the Unix epoch. All `created_at` and watermark values
/// use this unit.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
