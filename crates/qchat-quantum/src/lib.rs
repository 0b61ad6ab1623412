//! Clients for the quantum backend: a QRNG seed source and the BB84
//! key-agreement simulator. Both are plain request/response HTTP services;
//! neither is retried here.

pub mod agreement;
pub mod config;
pub mod seed;

use thiserror::Error;

pub use agreement::{Agreement, Bb84Client, KeyAgreement};
pub use config::ServiceConfig;
pub use seed::{QrngClient, SeedSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantumError {
    #[error("random seed source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("key agreement failed: {0}")]
    AgreementFailed(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}
