use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identity issued by the identity provider (e.g. an auth uid).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a conversation needs two distinct members, got {0} twice")]
pub struct SameMemberError(pub UserId);

/// The two participants of a conversation, sorted so that the same pair
/// always produces the same value regardless of who initiated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<UserId>", into = "Vec<UserId>")]
pub struct Members([UserId; 2]);

impl Members {
    pub fn new(a: UserId, b: UserId) -> Result<Self, SameMemberError> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self([a, b])),
            std::cmp::Ordering::Greater => Ok(Self([b, a])),
            std::cmp::Ordering::Equal => Err(SameMemberError(a)),
        }
    }

    pub fn first(&self) -> &UserId {
        &self.0[0]
    }

    pub fn second(&self) -> &UserId {
        &self.0[1]
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.0.contains(id)
    }

    /// The member that is not `local`, or `None` if `local` is not a member.
    pub fn peer_of(&self, local: &UserId) -> Option<&UserId> {
        if !self.contains(local) {
            return None;
        }
        self.0.iter().find(|m| *m != local)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter()
    }
}

impl TryFrom<Vec<UserId>> for Members {
    type Error = String;

    fn try_from(ids: Vec<UserId>) -> Result<Self, Self::Error> {
        let [a, b]: [UserId; 2] = ids
            .try_into()
            .map_err(|v: Vec<UserId>| format!("expected 2 members, got {}", v.len()))?;
        Members::new(a, b).map_err(|e| e.to_string())
    }
}

impl From<Members> for Vec<UserId> {
    fn from(members: Members) -> Self {
        members.0.into()
    }
}

/// Conversation metadata. Immutable after creation; messages hang off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub members: Members,
    pub seed: Vec<u8>,
    pub created_at: i64,
}

/// Messages stored by the backend are always encrypted.
/// The store only sees ciphertext, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: UserId,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    /// Store-assigned, strictly increasing per conversation.
    pub created_at: i64,
}

/// An outgoing message before the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}
