use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use qchat_crypto::{Sealed, SessionKey, decrypt_message, derive_session_key, encrypt_message};
use qchat_quantum::KeyAgreement;
use qchat_types::{ConversationStore, Message, NewMessage, UserId, now_millis};

use crate::ChatError;

/// Lifecycle of a per-conversation session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Uninitialized,
    KeyPending,
    Ready(SessionInfo),
    Closed,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready(_))
    }
}

/// What the user is shown once a key is in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub conversation_id: String,
    pub peer: UserId,
    pub qber: f64,
    pub kept: u32,
    pub discarded: u32,
    pub derived_at: i64,
}

#[derive(Clone)]
struct Established {
    key: Arc<SessionKey>,
    info: SessionInfo,
}

type PendingOpen = Shared<BoxFuture<'static, Result<Established, ChatError>>>;

#[derive(Default)]
struct Slot {
    /// Bumped by `close`; results from an older epoch are discarded.
    epoch: u64,
    pending: Option<PendingOpen>,
    ready: Option<Established>,
}

struct SessionInner {
    conversation_id: String,
    local: UserId,
    store: Arc<dyn ConversationStore>,
    agreement: Arc<dyn KeyAgreement>,
    n_bits: u32,
    slot: Mutex<Slot>,
    state: watch::Sender<SessionState>,
}

impl SessionInner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The per-conversation crypto context.
///
/// Holds at most one session key, derived on `open` from the conversation
/// seed and a BB84 agreement over it. Concurrent `open` calls share one
/// derivation. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(
        conversation_id: impl Into<String>,
        local: UserId,
        store: Arc<dyn ConversationStore>,
        agreement: Arc<dyn KeyAgreement>,
        n_bits: u32,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(SessionInner {
                conversation_id: conversation_id.into(),
                local,
                store,
                agreement,
                n_bits,
                slot: Mutex::new(Slot::default()),
                state,
            }),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    pub fn local_identity(&self) -> &UserId {
        &self.inner.local
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch state transitions, e.g. to render "deriving key" while the
    /// agreement is in flight.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.inner.slot().ready.as_ref().map(|r| r.info.clone())
    }

    pub(crate) fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.inner.store
    }

    /// Derive the session key, or return the existing one.
    ///
    /// Callers arriving while a derivation is in flight join it instead of
    /// starting another. Dropping the returned future abandons the wait
    /// without affecting other callers. If the session is closed before the
    /// derivation lands, its result is discarded and this returns
    /// `SessionClosed`.
    pub async fn open(&self) -> Result<SessionInfo, ChatError> {
        let (epoch, pending) = {
            let mut slot = self.inner.slot();
            if let Some(ready) = &slot.ready {
                return Ok(ready.info.clone());
            }
            let pending = match slot.pending.clone() {
                Some(pending) => pending,
                None => {
                    let pending = establish(
                        self.inner.conversation_id.clone(),
                        self.inner.local.clone(),
                        self.inner.store.clone(),
                        self.inner.agreement.clone(),
                        self.inner.n_bits,
                    )
                    .boxed()
                    .shared();
                    slot.pending = Some(pending.clone());
                    self.inner.state.send_replace(SessionState::KeyPending);
                    pending
                }
            };
            (slot.epoch, pending)
        };

        let result = pending.clone().await;

        let mut slot = self.inner.slot();
        if slot.epoch != epoch {
            debug!(
                "Discarding key derivation for closed session {}",
                self.inner.conversation_id
            );
            return Err(ChatError::SessionClosed);
        }
        if slot.pending.as_ref().is_some_and(|p| p.ptr_eq(&pending)) {
            slot.pending = None;
        }

        match result {
            Ok(established) => {
                let ready = slot.ready.get_or_insert(established);
                let info = ready.info.clone();
                self.inner.state.send_replace(SessionState::Ready(info.clone()));
                Ok(info)
            }
            Err(e) => {
                if slot.ready.is_none() && slot.pending.is_none() {
                    self.inner.state.send_replace(SessionState::Uninitialized);
                }
                Err(e)
            }
        }
    }

    /// Drop the key and mark the session closed. Any in-flight open
    /// resolves to `SessionClosed`. A closed session can be reopened.
    pub fn close(&self) {
        let mut slot = self.inner.slot();
        slot.epoch += 1;
        slot.pending = None;
        slot.ready = None;
        self.inner.state.send_replace(SessionState::Closed);
        debug!("Session {} closed", self.inner.conversation_id);
    }

    /// The established key. While a derivation is in flight this waits for
    /// it; with no key and nothing pending it fails fast.
    async fn established(&self) -> Result<Established, ChatError> {
        let pending = {
            let slot = self.inner.slot();
            if let Some(ready) = &slot.ready {
                return Ok(ready.clone());
            }
            slot.pending.is_some()
        };
        if !pending {
            return Err(ChatError::SessionNotReady);
        }

        self.open().await.map_err(|_| ChatError::SessionNotReady)?;
        self.inner
            .slot()
            .ready
            .clone()
            .ok_or(ChatError::SessionNotReady)
    }

    pub async fn encrypt_outgoing(&self, plaintext: &str) -> Result<Sealed, ChatError> {
        let established = self.established().await?;
        Ok(encrypt_message(&established.key, plaintext)?)
    }

    pub async fn decrypt_incoming(&self, iv: &[u8], ciphertext: &[u8]) -> Result<String, ChatError> {
        let established = self.established().await?;
        Ok(decrypt_message(&established.key, iv, ciphertext)?)
    }

    /// Encrypt `text` and append it to the conversation. Whitespace-only
    /// input is rejected. Store failures are surfaced, never retried.
    pub async fn send(&self, text: &str) -> Result<Message, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let sealed = self.encrypt_outgoing(text).await?;
        let message = NewMessage {
            sender_id: self.inner.local.clone(),
            iv: sealed.iv.to_vec(),
            ciphertext: sealed.ciphertext,
        };

        self.inner
            .store
            .append_message(&self.inner.conversation_id, message)
            .await
            .map_err(|e| {
                warn!("Send to {} failed: {}", self.inner.conversation_id, e);
                ChatError::from(e)
            })
    }
}

async fn establish(
    conversation_id: String,
    local: UserId,
    store: Arc<dyn ConversationStore>,
    agreement: Arc<dyn KeyAgreement>,
    n_bits: u32,
) -> Result<Established, ChatError> {
    let conversation = store
        .conversation(&conversation_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(conversation_id.clone()))?;

    let peer = conversation
        .members
        .peer_of(&local)
        .cloned()
        .ok_or_else(|| ChatError::NotAMember(local.clone(), conversation_id.clone()))?;

    let agreed = agreement
        .agree(&conversation.seed, n_bits)
        .await
        .map_err(|e| {
            warn!("Key agreement for {} failed: {}", conversation_id, e);
            ChatError::from(e)
        })?;

    let key = derive_session_key(&agreed.sifted_key, &conversation.seed)?;
    info!(
        "Session key ready for {} (qber {:.3}, kept {})",
        conversation_id, agreed.qber, agreed.kept
    );

    Ok(Established {
        key: Arc::new(key),
        info: SessionInfo {
            conversation_id,
            peer,
            qber: agreed.qber,
            kept: agreed.kept,
            discarded: agreed.discarded,
            derived_at: now_millis(),
        },
    })
}
