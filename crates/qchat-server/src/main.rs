use tracing::info;

use qchat_server::config::ServerConfig;
use qchat_server::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qchat_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = AppStateInner::from_config(&config)?;
    let app = qchat_server::router(state, &config.frontend_origin)?;

    let addr = config.addr()?;
    info!("Quantum chat backend listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
