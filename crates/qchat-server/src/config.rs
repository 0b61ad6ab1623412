use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Server settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Provider URL; the requested byte count is appended verbatim.
    pub qrng_url: Option<String>,
    /// Extra provider header as `Name:Value`.
    pub qrng_header: Option<String>,
    /// Comma-separated allowed origins, or `*`.
    pub frontend_origin: String,
    /// Enables `/chats` and `/messages`.
    pub server_writes: bool,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            qrng_url: None,
            qrng_header: None,
            frontend_origin: "*".into(),
            server_writes: false,
            db_path: PathBuf::from("qchat.db"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let port = match std::env::var("QCHAT_PORT") {
            Ok(port) => port.parse().context("QCHAT_PORT is not a valid port")?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            host: std::env::var("QCHAT_HOST").unwrap_or(defaults.host),
            port,
            qrng_url: non_empty_var("QRNG_URL"),
            qrng_header: non_empty_var("QRNG_HEADER"),
            frontend_origin: std::env::var("FRONTEND_ORIGIN").unwrap_or(defaults.frontend_origin),
            server_writes: std::env::var("QCHAT_SERVER_WRITES")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            db_path: std::env::var("QCHAT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
