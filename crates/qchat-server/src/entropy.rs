use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand::rngs::OsRng;
use rand::{RngCore, TryRngCore};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Error)]
enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {0} bytes, wanted {1}")]
    Short(usize, usize),
}

struct Provider {
    url: String,
    header: Option<(String, String)>,
}

/// Random bytes from a QRNG provider when one is configured, otherwise
/// (or whenever the provider fails) from the OS CSPRNG.
pub struct EntropySource {
    http: reqwest::Client,
    provider: Option<Provider>,
}

impl EntropySource {
    /// `url` gets the byte count appended. `header` is `Name:Value`.
    pub fn new(url: Option<String>, header: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(PROVIDER_TIMEOUT).build()?;
        let provider = url.map(|url| Provider {
            url,
            header: header.and_then(parse_header),
        });
        Ok(Self { http, provider })
    }

    pub fn os_only() -> anyhow::Result<Self> {
        Self::new(None, None)
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn random_bytes(&self, n: usize) -> Vec<u8> {
        if let Some(provider) = &self.provider {
            match self.fetch(provider, n).await {
                Ok(bytes) => {
                    debug!("{} bytes from QRNG provider", n);
                    return bytes;
                }
                Err(e) => warn!("QRNG provider failed, using OS entropy: {}", e),
            }
        }
        os_random(n)
    }

    async fn fetch(&self, provider: &Provider, n: usize) -> Result<Vec<u8>, ProviderError> {
        let mut req = self.http.get(format!("{}{}", provider.url, n));
        if let Some((name, value)) = &provider.header {
            req = req.header(name.as_str(), value.as_str());
        }
        let body = req.send().await?.error_for_status()?.bytes().await?;

        let mut bytes = parse_provider_body(&body);
        if bytes.len() < n {
            return Err(ProviderError::Short(bytes.len(), n));
        }
        bytes.truncate(n);
        Ok(bytes)
    }
}

fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

/// `{"base64": ...}`, `{"bytes": [..]}`, or anything else taken as raw bytes.
fn parse_provider_body(body: &[u8]) -> Vec<u8> {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(bytes) = json
            .get("base64")
            .and_then(Value::as_str)
            .and_then(|s| B64.decode(s).ok())
        {
            return bytes;
        }
        if let Some(list) = json.get("bytes").and_then(Value::as_array) {
            let bytes: Option<Vec<u8>> = list
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            if let Some(bytes) = bytes {
                return bytes;
            }
        }
    }
    body.to_vec()
}

fn os_random(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    if let Err(e) = OsRng.try_fill_bytes(&mut buf) {
        error!("OS entropy unavailable ({}), using thread RNG", e);
        rand::rng().fill_bytes(&mut buf);
    }
    buf
}
