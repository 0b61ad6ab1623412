//! Client side of the quantum-seeded chat: per-conversation sessions,
//! decrypting message streams, unread tracking and the inbox that ties
//! them to the store and the quantum backend.

pub mod error;
pub mod handle;
pub mod inbox;
pub mod session;
pub mod stream;
pub mod unread;
pub mod watermark;

pub use error::ChatError;
pub use handle::{normalize_handle, parse_handle, validate_handle};
pub use inbox::{FALLBACK_PEER_LABEL, Inbox, OpenConversation, Services};
pub use session::{ChatSession, SessionInfo, SessionState};
pub use stream::{ChatMessage, DECRYPT_ERROR_TEXT, Delivered, MessageBody, MessageStream};
pub use unread::{UnreadCounter, UnreadTracker};
pub use watermark::MemoryWatermarks;
