use axum::Json;

use qchat_crypto::{b64_decode, b64_encode, seal_with_key};
use qchat_types::api::{WrapRequest, WrapResponse};

use crate::error::ApiError;

/// `POST /wrap_key`: AES-256-GCM envelope encryption under a caller key.
pub async fn wrap_key(Json(req): Json<WrapRequest>) -> Result<Json<WrapResponse>, ApiError> {
    let key = b64_decode(&req.wrap_key_b64)?;
    let plaintext = b64_decode(&req.plaintext_b64)?;
    let iv = req.iv_b64.as_deref().map(b64_decode).transpose()?;

    let sealed = seal_with_key(&key, iv.as_deref(), &plaintext)?;
    Ok(Json(WrapResponse {
        iv_b64: b64_encode(&sealed.iv),
        ct_b64: b64_encode(&sealed.ciphertext),
        tag_included: true,
    }))
}
