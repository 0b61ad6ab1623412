use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{Conversation, Members, Message, NewMessage, UserId};

/// A batch of messages delivered by one change notification.
pub type MessageBatch = Vec<Message>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("handle @{0} is already taken")]
    AlreadyTaken(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Handle to a live change feed.
///
/// Each subscription owns one realtime connection on the store side. It is
/// released by `unsubscribe` or, failing that, when the handle is dropped;
/// the release hook runs exactly once either way.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(
        id: u64,
        rx: mpsc::UnboundedReceiver<T>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            rx,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next batch, or `None` once the producer side is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Persistent, subscribable conversation store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the conversation for `members`. Idempotent per canonical pair:
    /// if one already exists it is returned unchanged, seed included.
    async fn create_conversation(
        &self,
        members: Members,
        seed: Vec<u8>,
    ) -> Result<Conversation, StoreError>;

    async fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Conversations `member` belongs to, newest first.
    async fn conversations_for(&self, member: &UserId) -> Result<Vec<Conversation>, StoreError>;

    /// Append a message; the store assigns `id` and `created_at`.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> Result<Message, StoreError>;

    /// Live feed of a conversation's messages. The first batch is the
    /// existing history in `created_at` order, followed by one batch per
    /// append.
    async fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Subscription<MessageBatch>, StoreError>;
}

/// Username directory with an atomic uniqueness claim.
#[async_trait]
pub trait HandleDirectory: Send + Sync {
    /// Claim `handle` for `identity`. Fails with `AlreadyTaken` if another
    /// identity owns it. Never retried here.
    async fn claim_handle(&self, handle: &str, identity: &UserId) -> Result<(), StoreError>;

    async fn resolve_handle(&self, handle: &str) -> Result<Option<UserId>, StoreError>;

    async fn handle_of(&self, identity: &UserId) -> Result<Option<String>, StoreError>;
}

/// Client-local "read up to" timestamps, keyed by conversation.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn last_seen(&self, conversation_id: &str) -> Result<Option<i64>, StoreError>;

    /// Raise the watermark to `at`. Never moves it backward.
    async fn set_last_seen(&self, conversation_id: &str, at: i64) -> Result<(), StoreError>;
}

/// Storage key used for a conversation's watermark.
pub fn watermark_key(conversation_id: &str) -> String {
    format!("lastSeen:{conversation_id}")
}
