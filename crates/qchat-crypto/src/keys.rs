use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::CryptoError;

pub const KEY_SIZE: usize = 32;

/// A 256-bit AES-GCM key. Lives in memory only and is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    bytes: [u8; KEY_SIZE],
}

impl SessionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::KeyLength(bytes.len()))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// HKDF-SHA256(ikm = sifted key, salt = seed, info = "") -> 32 bytes.
///
/// Pure: identical inputs always give the identical key. The key is only as
/// strong as the entropy of `sifted_key`.
pub fn derive_session_key(sifted_key: &[u8], seed: &[u8]) -> Result<SessionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(seed), sifted_key);
    let mut okm = [0u8; KEY_SIZE];
    hk.expand(&[], &mut okm)
        .map_err(|_| CryptoError::Derivation)?;
    let key = SessionKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}

pub fn b64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn b64_decode(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(BASE64.decode(encoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_vector_for_placeholder_seed() {
        // seed "AAAA" (QUFBQQ==), sifted key "BBBB" (QkJCQg==)
        let seed = b64_decode("QUFBQQ==").unwrap();
        let sifted = b64_decode("QkJCQg==").unwrap();
        let key = derive_session_key(&sifted, &seed).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "9f0539c511618e164c126024a23ce1da6a1f7733dee282cf94ff3c72bfc3ec3f"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_session_key(b"sifted bits", b"seed").unwrap();
        let b = derive_session_key(b"sifted bits", b"seed").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_and_ikm_both_matter() {
        let base = derive_session_key(b"sifted", b"seed-1").unwrap();
        assert_ne!(base, derive_session_key(b"sifted", b"seed-2").unwrap());
        assert_ne!(base, derive_session_key(b"sifted!", b"seed-1").unwrap());
    }

    #[test]
    fn empty_sifted_key_still_derives() {
        let key = derive_session_key(&[], b"seed").unwrap();
        assert_eq!(key.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = SessionKey::from_bytes([0xAB; KEY_SIZE]);
        let shown = format!("{key:?}");
        assert!(!shown.contains("171"));
        assert!(!shown.to_lowercase().contains("ab"));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert_eq!(
            SessionKey::from_slice(&[0u8; 16]).unwrap_err(),
            CryptoError::KeyLength(16)
        );
    }
}
