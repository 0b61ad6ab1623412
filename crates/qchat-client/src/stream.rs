use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use qchat_types::{Message, MessageBatch, Subscription, UserId};

use crate::{ChatError, ChatSession};

/// Rendered in place of a message that failed authentication.
pub const DECRYPT_ERROR_TEXT: &str = "[decrypt error]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Failed to authenticate under the session key. Other messages in
    /// the stream are unaffected.
    Undecryptable,
    /// Arrived while no key was available; `unlock` retries it.
    Locked,
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBody::Text(text) => f.write_str(text),
            MessageBody::Undecryptable => f.write_str(DECRYPT_ERROR_TEXT),
            MessageBody::Locked => f.write_str("…"),
        }
    }
}

/// One decrypted entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: UserId,
    pub created_at: i64,
    /// Authored by the local identity.
    pub mine: bool,
    pub body: MessageBody,
}

/// A newly placed entry and its index in the ordered history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub position: usize,
    pub message: ChatMessage,
}

/// Decrypting, ordered view over a conversation's live feed.
///
/// History is kept sorted by `(created_at, id)` and deduplicated by
/// message id, so a local send that is echoed back by the store renders
/// once.
pub struct MessageStream {
    session: ChatSession,
    subscription: Subscription<MessageBatch>,
    history: Vec<ChatMessage>,
    seen: HashSet<String>,
    locked: HashMap<String, Message>,
}

impl MessageStream {
    /// Subscribe to the session's conversation.
    pub async fn subscribe(session: &ChatSession) -> Result<Self, ChatError> {
        let subscription = session
            .store()
            .subscribe_messages(session.conversation_id())
            .await?;
        debug!(
            "Message stream {} opened on {}",
            subscription.id(),
            session.conversation_id()
        );

        Ok(Self {
            session: session.clone(),
            subscription,
            history: Vec::new(),
            seen: HashSet::new(),
            locked: HashMap::new(),
        })
    }

    pub fn conversation_id(&self) -> &str {
        self.session.conversation_id()
    }

    /// Ordered history delivered so far.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Wait for the next batch carrying anything new and place it.
    /// Batches made only of duplicates are skipped. `None` once the feed
    /// has ended.
    ///
    /// Locked entries are retried in place once the session is ready, so
    /// their bodies in `history` update without a new `Delivered`.
    pub async fn next(&mut self) -> Option<Vec<Delivered>> {
        loop {
            self.unlock().await;
            let batch = self.subscription.recv().await?;
            let delivered = self.place(batch).await;
            self.unlock().await;
            if !delivered.is_empty() {
                return Some(delivered);
            }
        }
    }

    /// Send through the session and place the stored message right away.
    /// The store's echo of it is later dropped as a duplicate.
    pub async fn send(&mut self, text: &str) -> Result<Delivered, ChatError> {
        let stored = self.session.send(text).await?;
        let position = self.insert(ChatMessage {
            id: stored.id.clone(),
            sender_id: stored.sender_id.clone(),
            created_at: stored.created_at,
            mine: true,
            body: MessageBody::Text(text.trim().to_string()),
        });

        match position {
            Some(position) => Ok(Delivered {
                position,
                message: self.history[position].clone(),
            }),
            // Echo arrived first.
            None => {
                let position = self
                    .history
                    .iter()
                    .position(|m| m.id == stored.id)
                    .ok_or_else(|| ChatError::Store(format!("message {} vanished", stored.id)))?;
                Ok(Delivered {
                    position,
                    message: self.history[position].clone(),
                })
            }
        }
    }

    /// Retry decryption of entries that arrived before the key was ready.
    /// Returns how many were unlocked.
    pub async fn unlock(&mut self) -> usize {
        if self.locked.is_empty() || !self.session.state().is_ready() {
            return 0;
        }

        let mut unlocked = 0;
        let pending: Vec<Message> = self.locked.drain().map(|(_, m)| m).collect();
        for message in pending {
            let body = self.decrypt(&message).await;
            if body == MessageBody::Locked {
                self.locked.insert(message.id.clone(), message);
                continue;
            }
            if let Some(entry) = self.history.iter_mut().find(|m| m.id == message.id) {
                entry.body = body;
                unlocked += 1;
            }
        }
        unlocked
    }

    /// Release the underlying subscription.
    pub fn unsubscribe(self) {
        debug!("Message stream on {} released", self.conversation_id());
        self.subscription.unsubscribe();
    }

    async fn place(&mut self, mut batch: MessageBatch) -> Vec<Delivered> {
        batch.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let mut delivered = Vec::with_capacity(batch.len());
        for message in batch {
            if self.seen.contains(&message.id) {
                continue;
            }
            let body = self.decrypt(&message).await;
            if body == MessageBody::Locked {
                self.locked.insert(message.id.clone(), message.clone());
            }
            let entry = ChatMessage {
                id: message.id.clone(),
                mine: message.sender_id == *self.session.local_identity(),
                sender_id: message.sender_id,
                created_at: message.created_at,
                body,
            };
            if let Some(position) = self.insert(entry) {
                delivered.push(Delivered {
                    position,
                    message: self.history[position].clone(),
                });
            }
        }
        delivered
    }

    async fn decrypt(&self, message: &Message) -> MessageBody {
        match self
            .session
            .decrypt_incoming(&message.iv, &message.ciphertext)
            .await
        {
            Ok(text) => MessageBody::Text(text),
            Err(ChatError::DecryptError) => {
                warn!(
                    "Message {} in {} failed to decrypt",
                    message.id, message.conversation_id
                );
                MessageBody::Undecryptable
            }
            Err(_) => MessageBody::Locked,
        }
    }

    /// Insert in `(created_at, id)` order. `None` if the id is already
    /// present.
    fn insert(&mut self, entry: ChatMessage) -> Option<usize> {
        if !self.seen.insert(entry.id.clone()) {
            return None;
        }
        let key = (entry.created_at, entry.id.as_str());
        let position = self
            .history
            .partition_point(|m| (m.created_at, m.id.as_str()) < key);
        self.history.insert(position, entry);
        Some(position)
    }
}
