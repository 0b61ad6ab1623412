use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;
use uuid::Uuid;

use qchat_types::{
    Conversation, ConversationStore, HandleDirectory, Members, Message, MessageBatch, NewMessage,
    StoreError, Subscription, UserId, WatermarkStore, now_millis,
};

use crate::Database;
use crate::models::MessageRow;
use crate::queries::Claim;

/// `Database` exposed through the store capability traits. Cheap to clone;
/// all clones share one connection and one change feed.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(Database::open(path)?)))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(Database::open_in_memory()?)))
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn active_subscriptions(&self) -> usize {
        self.db.active_subscriptions()
    }

    /// Run blocking DB work off the async runtime
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Backend(e.to_string())
            })?
            .map_err(backend)
    }
}

fn backend(e: anyhow::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(
        &self,
        members: Members,
        seed: Vec<u8>,
    ) -> Result<Conversation, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.blocking(move |db| {
            db.create_conversation(&id, &members, &seed, now_millis())?
                .into_conversation()
        })
        .await
    }

    async fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let id = id.to_string();
        self.blocking(move |db| {
            db.get_conversation(&id)?
                .map(|row| row.into_conversation())
                .transpose()
        })
        .await
    }

    async fn conversations_for(&self, member: &UserId) -> Result<Vec<Conversation>, StoreError> {
        let member = member.clone();
        self.blocking(move |db| {
            db.conversations_for(&member)?
                .into_iter()
                .map(|row| row.into_conversation())
                .collect()
        })
        .await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let cid = conversation_id.to_string();
        let mid = Uuid::new_v4().to_string();
        let row = self
            .blocking(move |db| {
                db.insert_message(
                    &mid,
                    &cid,
                    &message.sender_id,
                    &message.iv,
                    &message.ciphertext,
                    now_millis(),
                )
            })
            .await?
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        MessageRow::into_message(row).map_err(backend)
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Subscription<MessageBatch>, StoreError> {
        let cid = conversation_id.to_string();
        self.blocking(move |db| db.subscribe_messages(&cid))
            .await?
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))
    }
}

#[async_trait]
impl HandleDirectory for SqliteStore {
    async fn claim_handle(&self, handle: &str, identity: &UserId) -> Result<(), StoreError> {
        let h = handle.to_string();
        let identity = identity.clone();
        match self.blocking(move |db| db.claim_handle(&h, &identity)).await? {
            Claim::Claimed => Ok(()),
            Claim::Taken => Err(StoreError::AlreadyTaken(handle.to_string())),
        }
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<UserId>, StoreError> {
        let handle = handle.to_string();
        self.blocking(move |db| db.resolve_handle(&handle)).await
    }

    async fn handle_of(&self, identity: &UserId) -> Result<Option<String>, StoreError> {
        let identity = identity.clone();
        self.blocking(move |db| db.handle_of(&identity)).await
    }
}

#[async_trait]
impl WatermarkStore for SqliteStore {
    async fn last_seen(&self, conversation_id: &str) -> Result<Option<i64>, StoreError> {
        let cid = conversation_id.to_string();
        self.blocking(move |db| db.last_seen(&cid)).await
    }

    async fn set_last_seen(&self, conversation_id: &str, at: i64) -> Result<(), StoreError> {
        let cid = conversation_id.to_string();
        self.blocking(move |db| db.set_last_seen(&cid, at)).await
    }
}
