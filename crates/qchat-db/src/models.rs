use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};

use qchat_types::{Conversation, Members, Message, UserId};

// SQLite row shapes. Payload bytes stay base64 until converted.

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub member_a: String,
    pub member_b: String,
    pub seed_b64: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub iv_b64: String,
    pub ciphertext_b64: String,
    pub created_at: i64,
}

impl ConversationRow {
    pub fn into_conversation(self) -> Result<Conversation> {
        let members = Members::new(UserId::new(self.member_a), UserId::new(self.member_b))
            .map_err(|e| anyhow!("Corrupt members on conversation '{}': {}", self.id, e))?;
        let seed = B64
            .decode(&self.seed_b64)
            .map_err(|e| anyhow!("Corrupt seed on conversation '{}': {}", self.id, e))?;
        Ok(Conversation {
            id: self.id,
            members,
            seed,
            created_at: self.created_at,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let iv = B64
            .decode(&self.iv_b64)
            .map_err(|e| anyhow!("Corrupt iv on message '{}': {}", self.id, e))?;
        let ciphertext = B64
            .decode(&self.ciphertext_b64)
            .map_err(|e| anyhow!("Corrupt ciphertext on message '{}': {}", self.id, e))?;
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: UserId::new(self.sender_id),
            iv,
            ciphertext,
            created_at: self.created_at,
        })
    }
}
