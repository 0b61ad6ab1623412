use axum::{
    Json,
    extract::{Query, State},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};

use qchat_types::api::{QrngQuery, QrngResponse};

use crate::error::ApiError;
use crate::state::AppState;

pub const MAX_QRNG_BYTES: usize = 1024;

/// `GET /qrng?n=`: `n` random bytes, base64.
pub async fn get_qrng(
    State(state): State<AppState>,
    Query(query): Query<QrngQuery>,
) -> Result<Json<QrngResponse>, ApiError> {
    if !(1..=MAX_QRNG_BYTES).contains(&query.n) {
        return Err(ApiError::Unprocessable(format!(
            "n must be between 1 and {MAX_QRNG_BYTES}"
        )));
    }

    let bytes = state.entropy.random_bytes(query.n).await;
    Ok(Json(QrngResponse {
        base64: B64.encode(bytes),
    }))
}
