use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use qchat_types::{Message, MessageBatch, Subscription};

/// Fans appended messages out to every live subscription on the same
/// conversation.
#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    next_id: AtomicU64,

    /// subscription id -> (conversation id, sender)
    subscribers: Mutex<HashMap<u64, (String, mpsc::UnboundedSender<MessageBatch>)>>,
}

impl FeedInner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, (String, mpsc::UnboundedSender<MessageBatch>)>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Feed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a subscriber and hand it `snapshot` as its first batch.
    pub fn register(&self, conversation_id: &str, snapshot: MessageBatch) -> Subscription<MessageBatch> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(snapshot);

        self.inner
            .subscribers()
            .insert(id, (conversation_id.to_string(), tx));
        debug!("Subscription {} opened on conversation {}", id, conversation_id);

        let weak: Weak<FeedInner> = Arc::downgrade(&self.inner);
        Subscription::new(id, rx, move || {
            if let Some(inner) = weak.upgrade() {
                if inner.subscribers().remove(&id).is_some() {
                    debug!("Subscription {} released", id);
                }
            }
        })
    }

    /// Deliver one appended message to its conversation's subscribers.
    /// Subscribers whose receiver is gone are pruned.
    pub fn publish(&self, message: &Message) {
        self.inner.subscribers().retain(|_, (conversation_id, tx)| {
            if *conversation_id != message.conversation_id {
                return true;
            }
            tx.send(vec![message.clone()]).is_ok()
        });
    }

    pub fn active(&self) -> usize {
        self.inner.subscribers().len()
    }
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}
