use std::sync::Arc;

use qchat_db::SqliteStore;

use crate::config::ServerConfig;
use crate::entropy::EntropySource;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub entropy: EntropySource,
    /// Present only when server-side writes are enabled.
    pub store: Option<SqliteStore>,
}

impl AppStateInner {
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<AppState> {
        let entropy = EntropySource::new(config.qrng_url.clone(), config.qrng_header.as_deref())?;
        let store = if config.server_writes {
            Some(SqliteStore::open(&config.db_path)?)
        } else {
            None
        };
        Ok(Arc::new(Self { entropy, store }))
    }
}
