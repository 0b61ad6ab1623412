//! Client error taxonomy.

use thiserror::Error;

use qchat_crypto::CryptoError;
use qchat_quantum::QuantumError;
use qchat_types::{StoreError, UserId};

/// Errors surfaced by sessions, streams and the inbox.
///
/// `Clone` so one in-flight key derivation can hand the same outcome to
/// every caller joined on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The QRNG could not be reached or returned malformed data.
    #[error("random seed source unavailable: {0}")]
    SourceUnavailable(String),

    /// The BB84 simulation service failed.
    #[error("key agreement failed: {0}")]
    AgreementFailed(String),

    /// Conversation metadata is missing.
    #[error("conversation {0} not found")]
    NotFound(String),

    /// Authentication failure on one message.
    #[error("message could not be decrypted")]
    DecryptError,

    /// Handle claim conflict. A validation error, not a fault.
    #[error("@{0} is already taken")]
    AlreadyTaken(String),

    /// Encrypt/decrypt attempted outside the `Ready` state.
    #[error("session is not ready")]
    SessionNotReady,

    /// The session was closed before an in-flight open completed.
    #[error("session closed")]
    SessionClosed,

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("user @{0} not found")]
    UnknownHandle(String),

    #[error("{0} is not a member of conversation {1}")]
    NotAMember(UserId, String),

    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    #[error("message is empty")]
    EmptyMessage,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConversationNotFound(id) => ChatError::NotFound(id),
            StoreError::AlreadyTaken(handle) => ChatError::AlreadyTaken(handle),
            StoreError::Backend(msg) => ChatError::Store(msg),
        }
    }
}

impl From<QuantumError> for ChatError {
    fn from(e: QuantumError) -> Self {
        match e {
            QuantumError::SourceUnavailable(msg) => ChatError::SourceUnavailable(msg),
            QuantumError::AgreementFailed(msg) => ChatError::AgreementFailed(msg),
            QuantumError::Client(msg) => ChatError::Service(msg),
        }
    }
}

impl From<CryptoError> for ChatError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Decrypt(_) => ChatError::DecryptError,
            other => ChatError::Crypto(other.to_string()),
        }
    }
}
