use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};

use crate::keys::{KEY_SIZE, SessionKey};
use crate::{CryptoError, DecryptFailure};

pub const IV_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// One encrypted chat message: nonce plus ciphertext with the GCM tag
/// appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; IV_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypt a plaintext message with AES-256-GCM under a fresh random nonce.
pub fn encrypt_message(key: &SessionKey, plaintext: &str) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(Sealed { iv, ciphertext })
}

/// Decrypt and authenticate a message. Any tampering with `iv` or
/// `ciphertext`, or a wrong key, yields `CryptoError::Decrypt`.
pub fn decrypt_message(
    key: &SessionKey,
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::Decrypt(DecryptFailure::BadNonce));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Decrypt(DecryptFailure::Authentication))?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt(DecryptFailure::NotUtf8))
}

/// Envelope-encrypt arbitrary bytes under a caller-supplied raw key and
/// nonce. A fresh nonce is drawn when `iv` is `None`.
pub fn seal_with_key(
    raw_key: &[u8],
    iv: Option<&[u8]>,
    plaintext: &[u8],
) -> Result<Sealed, CryptoError> {
    if raw_key.len() != KEY_SIZE {
        return Err(CryptoError::KeyLength(raw_key.len()));
    }
    let iv: [u8; IV_SIZE] = match iv {
        Some(bytes) => bytes
            .try_into()
            .map_err(|_| CryptoError::NonceLength(bytes.len()))?,
        None => {
            let mut fresh = [0u8; IV_SIZE];
            OsRng.fill_bytes(&mut fresh);
            fresh
        }
    };

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(raw_key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(Sealed { iv, ciphertext })
}
