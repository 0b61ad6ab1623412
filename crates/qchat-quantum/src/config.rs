use std::time::Duration;

use crate::QuantumError;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Where the quantum backend lives and how much to ask it for.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub backend_url: String,
    pub timeout: Duration,
    /// Seed length requested from the QRNG at conversation creation.
    pub seed_bytes: usize,
    /// Raw bit count passed to the BB84 simulator.
    pub n_bits: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            timeout: Duration::from_secs(10),
            seed_bytes: 32,
            n_bits: 2048,
        }
    }
}

impl ServiceConfig {
    /// Read `QCHAT_BACKEND_URL`, `QCHAT_HTTP_TIMEOUT_SECS`, `QCHAT_SEED_BYTES`
    /// and `QCHAT_BB84_BITS`, falling back to defaults for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: std::env::var("QCHAT_BACKEND_URL").unwrap_or(defaults.backend_url),
            timeout: std::env::var("QCHAT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            seed_bytes: std::env::var("QCHAT_SEED_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.seed_bytes),
            n_bits: std::env::var("QCHAT_BB84_BITS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.n_bits),
        }
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    pub(crate) fn base_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, QuantumError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| QuantumError::Client(e.to_string()))
    }
}
