use std::sync::Arc;

use tracing::{info, warn};

use qchat_quantum::{KeyAgreement, SeedSource, ServiceConfig};
use qchat_types::{
    Conversation, ConversationStore, HandleDirectory, Members, UserId, WatermarkStore, now_millis,
};

use crate::handle::parse_handle;
use crate::{ChatError, ChatSession, MessageStream, SessionInfo, UnreadTracker};

/// Shown when a peer has no claimed handle.
pub const FALLBACK_PEER_LABEL: &str = "user";

/// Backends the inbox talks to.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ConversationStore>,
    pub directory: Arc<dyn HandleDirectory>,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub seeds: Arc<dyn SeedSource>,
    pub agreement: Arc<dyn KeyAgreement>,
}

/// An opened conversation: its session and live message view.
pub struct OpenConversation {
    pub session: ChatSession,
    pub stream: MessageStream,
    pub info: SessionInfo,
}

impl std::fmt::Debug for OpenConversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenConversation")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl OpenConversation {
    /// Release the subscription and drop the key.
    pub fn close(self) {
        self.stream.unsubscribe();
        self.session.close();
    }
}

/// The signed-in user's view: conversation list, unread counts, and the
/// entry points for starting and opening conversations.
pub struct Inbox {
    local: UserId,
    services: Services,
    seed_bytes: usize,
    n_bits: u32,
    unread: UnreadTracker,
}

impl Inbox {
    pub fn new(local: UserId, services: Services, config: &ServiceConfig) -> Self {
        let unread = UnreadTracker::new(
            local.clone(),
            services.store.clone(),
            services.watermarks.clone(),
        );
        Self {
            local,
            services,
            seed_bytes: config.seed_bytes,
            n_bits: config.n_bits,
            unread,
        }
    }

    pub fn local_identity(&self) -> &UserId {
        &self.local
    }

    pub fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    /// Normalize, validate and claim a handle for the local identity.
    pub async fn claim_handle(&self, raw: &str) -> Result<String, ChatError> {
        let handle = parse_handle(raw)?;
        self.services
            .directory
            .claim_handle(&handle, &self.local)
            .await?;
        info!("{} claimed @{}", self.local, handle);
        Ok(handle)
    }

    /// Start (or find) the conversation with the owner of `peer_handle`.
    ///
    /// A fresh QRNG seed is fetched first. If the pair already has a
    /// conversation the store returns it and the new seed is discarded.
    pub async fn start_conversation(&self, peer_handle: &str) -> Result<Conversation, ChatError> {
        let handle = parse_handle(peer_handle)?;
        let peer = self
            .services
            .directory
            .resolve_handle(&handle)
            .await?
            .ok_or_else(|| ChatError::UnknownHandle(handle.clone()))?;

        let members =
            Members::new(self.local.clone(), peer).map_err(|_| ChatError::SelfConversation)?;

        let seed = self
            .services
            .seeds
            .generate_seed(self.seed_bytes)
            .await
            .map_err(|e| {
                warn!("Seed for conversation with @{} unavailable: {}", handle, e);
                ChatError::from(e)
            })?;

        let conversation = self
            .services
            .store
            .create_conversation(members, seed)
            .await?;
        info!("Conversation {} with @{} ready", conversation.id, handle);

        self.unread.mark_seen(&conversation.id, now_millis()).await?;
        self.unread.track(&conversation.id).await?;
        Ok(conversation)
    }

    /// Reload the conversation list (newest first) and track exactly those
    /// conversations for unread counts.
    pub async fn refresh(&self) -> Result<Vec<Conversation>, ChatError> {
        let conversations = self.services.store.conversations_for(&self.local).await?;
        let ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();
        self.unread.sync(&ids).await?;
        Ok(conversations)
    }

    /// Display label for the other member: their handle, or a generic
    /// fallback if they have none or the lookup fails.
    pub async fn peer_label(&self, conversation: &Conversation) -> String {
        let Some(peer) = conversation.members.peer_of(&self.local) else {
            return FALLBACK_PEER_LABEL.to_string();
        };
        match self.services.directory.handle_of(peer).await {
            Ok(Some(handle)) => handle,
            Ok(None) => FALLBACK_PEER_LABEL.to_string(),
            Err(e) => {
                warn!("Handle lookup for {} failed: {}", peer, e);
                FALLBACK_PEER_LABEL.to_string()
            }
        }
    }

    /// Open a conversation: mark it seen, derive its session key and
    /// subscribe to its messages.
    pub async fn open_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<OpenConversation, ChatError> {
        self.unread.mark_seen(conversation_id, now_millis()).await?;

        let session = ChatSession::new(
            conversation_id,
            self.local.clone(),
            self.services.store.clone(),
            self.services.agreement.clone(),
            self.n_bits,
        );
        let info = session.open().await?;
        let stream = MessageStream::subscribe(&session).await?;

        Ok(OpenConversation {
            session,
            stream,
            info,
        })
    }

    /// Stop all unread tracking.
    pub async fn shutdown(&self) {
        self.unread.shutdown().await;
    }
}
