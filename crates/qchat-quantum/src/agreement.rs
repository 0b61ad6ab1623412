use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use tracing::{debug, warn};

use qchat_types::api::Bb84Response;

use crate::{QuantumError, ServiceConfig};

/// Outcome of one simulated BB84 exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Agreement {
    pub sifted_key: Vec<u8>,
    /// Observed bit error rate in [0, 1]. Shown to the user, never used to
    /// refuse a key.
    pub qber: f64,
    pub kept: u32,
    pub discarded: u32,
}

#[async_trait]
pub trait KeyAgreement: Send + Sync {
    async fn agree(&self, seed: &[u8], n_bits: u32) -> Result<Agreement, QuantumError>;
}

/// `GET {backend}/simulate_bb84?n_bits=..&seed_b64=..`.
pub struct Bb84Client {
    http: Client,
    base_url: String,
}

impl Bb84Client {
    pub fn new(config: &ServiceConfig) -> Result<Self, QuantumError> {
        Ok(Self {
            http: config.http_client()?,
            base_url: config.base_url().to_string(),
        })
    }
}

#[async_trait]
impl KeyAgreement for Bb84Client {
    async fn agree(&self, seed: &[u8], n_bits: u32) -> Result<Agreement, QuantumError> {
        let seed_b64 = BASE64.encode(seed);
        let resp = self
            .http
            .get(format!("{}/simulate_bb84", self.base_url))
            .query(&[("n_bits", n_bits.to_string()), ("seed_b64", seed_b64)])
            .send()
            .await
            .map_err(|e| {
                warn!("BB84 request failed: {}", e);
                QuantumError::AgreementFailed(format!("request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("BB84 service returned {}: {}", status, body);
            return Err(QuantumError::AgreementFailed(format!("service returned {status}")));
        }

        let body: Bb84Response = resp
            .json()
            .await
            .map_err(|e| QuantumError::AgreementFailed(format!("malformed response: {e}")))?;

        let agreement = parse_agreement(body)?;
        debug!(
            "BB84 agreement: kept={} discarded={} qber={:.3}",
            agreement.kept, agreement.discarded, agreement.qber
        );
        Ok(agreement)
    }
}

fn parse_agreement(body: Bb84Response) -> Result<Agreement, QuantumError> {
    if !(0.0..=1.0).contains(&body.qber) {
        return Err(QuantumError::AgreementFailed(format!(
            "qber {} outside [0, 1]",
            body.qber
        )));
    }
    let sifted_key = BASE64
        .decode(&body.base64_key)
        .map_err(|e| QuantumError::AgreementFailed(format!("malformed sifted key: {e}")))?;

    Ok(Agreement {
        sifted_key,
        qber: body.qber,
        kept: body.kept,
        discarded: body.discarded,
    })
}
