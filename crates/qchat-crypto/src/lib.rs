/// QChat Crypto Library
///
/// Per-conversation AES-256-GCM keys derived with HKDF-SHA256 from the
/// sifted BB84 key material (IKM) and the conversation seed (salt).
/// Every message gets a fresh random 96-bit nonce; there is no associated
/// data, padding or compression.

pub mod encrypt;
pub mod keys;

use thiserror::Error;

pub use encrypt::{IV_SIZE, Sealed, TAG_SIZE, decrypt_message, encrypt_message, seal_with_key};
pub use keys::{KEY_SIZE, SessionKey, b64_decode, b64_encode, derive_session_key};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: {0}")]
    Decrypt(DecryptFailure),

    #[error("invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    KeyLength(usize),

    #[error("invalid nonce length: expected {IV_SIZE} bytes, got {0}")]
    NonceLength(usize),

    #[error("HKDF expansion failed")]
    Derivation,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecryptFailure {
    #[error("nonce must be {IV_SIZE} bytes")]
    BadNonce,
    #[error("GCM authentication failed, data corrupted or wrong key")]
    Authentication,
    #[error("plaintext is not valid UTF-8")]
    NotUtf8,
}
