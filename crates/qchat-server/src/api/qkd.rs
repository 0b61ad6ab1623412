use axum::{Json, extract::Query};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use tracing::{debug, error};

use qchat_types::api::{Bb84Query, Bb84Response};

use crate::bb84::{self, MAX_BITS, MIN_BITS};
use crate::error::ApiError;

/// `GET /simulate_bb84?n_bits=&seed_b64=&eavesdrop=`
pub async fn simulate_bb84(Query(query): Query<Bb84Query>) -> Result<Json<Bb84Response>, ApiError> {
    if !(MIN_BITS..=MAX_BITS).contains(&query.n_bits) {
        return Err(ApiError::Unprocessable(format!(
            "n_bits must be between {MIN_BITS} and {MAX_BITS}"
        )));
    }
    let seed = B64
        .decode(&query.seed_b64)
        .map_err(|_| ApiError::BadRequest("seed_b64 is not valid base64".into()))?;

    let n_bits = query.n_bits;
    let eavesdrop = query.eavesdrop;
    let sim = tokio::task::spawn_blocking(move || bb84::simulate(&seed, n_bits, eavesdrop))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?;

    debug!(
        "BB84 seed {}… n_bits={} eavesdrop={} kept={} qber={:.3}",
        query.seed_b64.chars().take(6).collect::<String>(),
        n_bits,
        eavesdrop,
        sim.kept,
        sim.qber
    );

    Ok(Json(Bb84Response {
        base64_key: B64.encode(&sim.sifted_key),
        qber: sim.qber,
        kept: sim.kept,
        discarded: sim.discarded,
    }))
}
