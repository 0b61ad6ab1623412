use serde::{Deserialize, Serialize};

use crate::models::UserId;

// -- QRNG --

#[derive(Debug, Deserialize)]
pub struct QrngQuery {
    #[serde(default = "default_seed_bytes")]
    pub n: usize,
}

fn default_seed_bytes() -> usize {
    32
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrngResponse {
    pub base64: String,
}

// -- BB84 --

#[derive(Debug, Deserialize)]
pub struct Bb84Query {
    #[serde(default = "default_n_bits")]
    pub n_bits: u32,
    pub seed_b64: String,
    #[serde(default)]
    pub eavesdrop: bool,
}

fn default_n_bits() -> u32 {
    2048
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bb84Response {
    pub base64_key: String,
    pub qber: f64,
    pub kept: u32,
    pub discarded: u32,
}

// -- Envelope encryption --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WrapRequest {
    /// Raw AES-256-GCM key, base64.
    pub wrap_key_b64: String,
    pub plaintext_b64: String,
    /// Server generates a fresh nonce when absent.
    #[serde(default)]
    pub iv_b64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WrapResponse {
    pub iv_b64: String,
    pub ct_b64: String,
    pub tag_included: bool,
}

// -- Server-side chats and messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub members: Vec<UserId>,
    pub q_seed_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChatResponse {
    pub chat_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub sender_uid: UserId,
    pub iv_b64: String,
    pub ct_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub chat_id: String,
    pub sender_uid: UserId,
    pub iv_b64: String,
    pub ct_b64: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub chat_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
