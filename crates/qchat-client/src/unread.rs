use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use qchat_types::{ConversationStore, Message, UserId, WatermarkStore};

use crate::ChatError;

/// Unread bookkeeping for one conversation.
///
/// Counts peer messages strictly newer than the watermark. The watermark
/// only moves forward.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounter {
    watermark: i64,
    /// Newest `created_at` delivered so far, own messages included.
    newest: i64,
    /// message id -> created_at
    unread: HashMap<String, i64>,
}

impl UnreadCounter {
    pub fn new(watermark: i64) -> Self {
        Self {
            watermark,
            newest: watermark,
            unread: HashMap::new(),
        }
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    pub fn count(&self) -> usize {
        self.unread.len()
    }

    /// Account for one delivered message. Returns whether it counts as
    /// unread. Own messages, old messages and repeats never do.
    pub fn observe(&mut self, message: &Message, local: &UserId) -> bool {
        self.newest = self.newest.max(message.created_at);
        if message.sender_id == *local || message.created_at <= self.watermark {
            return false;
        }
        self.unread
            .insert(message.id.clone(), message.created_at)
            .is_none()
    }

    /// Everything delivered so far is seen. The watermark moves to `now`,
    /// or past the newest delivered message if the store clock runs ahead,
    /// and never backward. Returns the effective watermark.
    pub fn mark_seen(&mut self, now: i64) -> i64 {
        self.watermark = self.watermark.max(now).max(self.newest);
        self.unread.clear();
        self.watermark
    }
}

struct TrackerInner {
    local: UserId,
    store: Arc<dyn ConversationStore>,
    watermarks: Arc<dyn WatermarkStore>,
    counters: Mutex<HashMap<String, UnreadCounter>>,
    counts: watch::Sender<HashMap<String, usize>>,
}

impl TrackerInner {
    fn counters(&self) -> MutexGuard<'_, HashMap<String, UnreadCounter>> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, counters: &HashMap<String, UnreadCounter>) {
        let snapshot = counters
            .iter()
            .map(|(id, counter)| (id.clone(), counter.count()))
            .collect();
        self.counts.send_replace(snapshot);
    }

    /// Load the persisted watermark for a conversation not yet counted.
    /// The store is read before the counters lock is taken.
    async fn ensure_counter(&self, conversation_id: &str) -> Result<(), ChatError> {
        if self.counters().contains_key(conversation_id) {
            return Ok(());
        }
        let watermark = self
            .watermarks
            .last_seen(conversation_id)
            .await?
            .unwrap_or(0);
        self.counters()
            .entry(conversation_id.to_string())
            .or_insert_with(|| UnreadCounter::new(watermark));
        Ok(())
    }
}

/// Unread counts for every conversation in the list.
///
/// Each tracked conversation gets its own store subscription and a task
/// draining it, independent of any open `MessageStream`.
pub struct UnreadTracker {
    inner: Arc<TrackerInner>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl UnreadTracker {
    pub fn new(
        local: UserId,
        store: Arc<dyn ConversationStore>,
        watermarks: Arc<dyn WatermarkStore>,
    ) -> Self {
        let (counts, _) = watch::channel(HashMap::new());
        Self {
            inner: Arc::new(TrackerInner {
                local,
                store,
                watermarks,
                counters: Mutex::new(HashMap::new()),
                counts,
            }),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start counting unread messages in `conversation_id`. No-op if it is
    /// already tracked.
    pub async fn track(&self, conversation_id: &str) -> Result<(), ChatError> {
        if self.tasks().contains_key(conversation_id) {
            return Ok(());
        }

        self.inner.ensure_counter(conversation_id).await?;
        {
            let counters = self.inner.counters();
            self.inner.publish(&counters);
        }

        let mut subscription = self.inner.store.subscribe_messages(conversation_id).await?;

        let mut tasks = self.tasks();
        if tasks.contains_key(conversation_id) {
            // Lost a race with a concurrent track; ours is released on drop.
            return Ok(());
        }

        let inner = self.inner.clone();
        let cid = conversation_id.to_string();
        let handle = tokio::spawn(async move {
            while let Some(batch) = subscription.recv().await {
                let mut counters = inner.counters();
                let Some(counter) = counters.get_mut(&cid) else {
                    break;
                };
                let added = batch
                    .iter()
                    .filter(|m| counter.observe(m, &inner.local))
                    .count();
                if added > 0 {
                    debug!("{} new unread in {}", added, cid);
                    inner.publish(&counters);
                }
            }
        });
        tasks.insert(conversation_id.to_string(), handle);
        Ok(())
    }

    /// Stop tracking and release the subscription before returning.
    pub async fn untrack(&self, conversation_id: &str) {
        let handle = self.tasks().remove(conversation_id);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        let mut counters = self.inner.counters();
        if counters.remove(conversation_id).is_some() {
            self.inner.publish(&counters);
        }
    }

    /// Make the tracked set exactly `conversation_ids`.
    pub async fn sync(&self, conversation_ids: &[String]) -> Result<(), ChatError> {
        let stale: Vec<String> = self
            .tasks()
            .keys()
            .filter(|id| !conversation_ids.contains(id))
            .cloned()
            .collect();
        for id in stale {
            self.untrack(&id).await;
        }
        for id in conversation_ids {
            self.track(id).await?;
        }
        Ok(())
    }

    pub fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn unread_count(&self, conversation_id: &str) -> usize {
        self.inner
            .counters()
            .get(conversation_id)
            .map_or(0, UnreadCounter::count)
    }

    /// Current counts by conversation id, updated on every change.
    pub fn counts(&self) -> watch::Receiver<HashMap<String, usize>> {
        self.inner.counts.subscribe()
    }

    /// Record that the user has seen everything delivered in
    /// `conversation_id`. The count drops to zero and the effective
    /// watermark is persisted; a failed write is logged and the in-memory
    /// reset still holds. Returns the effective watermark.
    pub async fn mark_seen(&self, conversation_id: &str, now: i64) -> Result<i64, ChatError> {
        self.inner.ensure_counter(conversation_id).await?;
        let watermark = {
            let mut counters = self.inner.counters();
            let watermark = counters
                .get_mut(conversation_id)
                .map(|counter| counter.mark_seen(now))
                .ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))?;
            self.inner.publish(&counters);
            watermark
        };

        if let Err(e) = self
            .inner
            .watermarks
            .set_last_seen(conversation_id, watermark)
            .await
        {
            warn!("Persisting watermark for {} failed: {}", conversation_id, e);
        }
        Ok(watermark)
    }

    /// Abort every tracking task and wait for their subscriptions to be
    /// released.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for UnreadTracker {
    fn drop(&mut self) {
        for (_, handle) in self.tasks().drain() {
            handle.abort();
        }
    }
}
