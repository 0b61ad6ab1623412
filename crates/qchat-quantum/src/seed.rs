use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use tracing::{debug, warn};

use qchat_types::api::QrngResponse;

use crate::{QuantumError, ServiceConfig};

/// Source of fresh high-entropy conversation seeds.
#[async_trait]
pub trait SeedSource: Send + Sync {
    /// Exactly `n_bytes` of randomness, or `SourceUnavailable`.
    async fn generate_seed(&self, n_bytes: usize) -> Result<Vec<u8>, QuantumError>;
}

/// `GET {backend}/qrng?n={n}` -> `{"base64": "..."}`.
pub struct QrngClient {
    http: Client,
    base_url: String,
}

impl QrngClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, QuantumError> {
        Ok(Self {
            http: config.http_client()?,
            base_url: config.base_url().to_string(),
        })
    }
}

#[async_trait]
impl SeedSource for QrngClient {
    async fn generate_seed(&self, n_bytes: usize) -> Result<Vec<u8>, QuantumError> {
        let resp = self
            .http
            .get(format!("{}/qrng", self.base_url))
            .query(&[("n", n_bytes)])
            .send()
            .await
            .map_err(|e| {
                warn!("QRNG request failed: {}", e);
                QuantumError::SourceUnavailable(format!("request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!("QRNG service returned {}", status);
            return Err(QuantumError::SourceUnavailable(format!("service returned {status}")));
        }

        let body: QrngResponse = resp
            .json()
            .await
            .map_err(|e| QuantumError::SourceUnavailable(format!("malformed response: {e}")))?;

        let seed = decode_seed(&body.base64, n_bytes)?;
        debug!("Fetched {}-byte seed from QRNG", seed.len());
        Ok(seed)
    }
}

fn decode_seed(encoded: &str, expected: usize) -> Result<Vec<u8>, QuantumError> {
    let seed = BASE64
        .decode(encoded)
        .map_err(|e| QuantumError::SourceUnavailable(format!("malformed base64: {e}")))?;
    if seed.len() != expected {
        return Err(QuantumError::SourceUnavailable(format!(
            "expected {expected} bytes, got {}",
            seed.len()
        )));
    }
    Ok(seed)
}
