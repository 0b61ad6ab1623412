//! Quantum backend: QRNG seeds, the BB84 simulator, envelope encryption
//! and optional server-side chat storage.

pub mod api;
pub mod bb84;
pub mod config;
pub mod entropy;
pub mod error;
pub mod state;

use axum::{
    Json, Router,
    http::HeaderValue,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{messages, qkd, qrng, wrap};
use crate::state::AppState;

/// Build the HTTP router. `frontend_origin` is `*` or a comma-separated
/// list of allowed origins.
pub fn router(state: AppState, frontend_origin: &str) -> anyhow::Result<Router> {
    let api = Router::new()
        .route("/qrng", get(qrng::get_qrng))
        .route("/chats", post(messages::create_chat))
        .route("/messages", post(messages::send_message).get(messages::list_messages))
        .with_state(state);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/simulate_bb84", get(qkd::simulate_bb84))
        .route("/wrap_key", post(wrap::wrap_key))
        .merge(api)
        .layer(cors(frontend_origin)?)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

fn cors(frontend_origin: &str) -> anyhow::Result<CorsLayer> {
    let origins: Vec<&str> = frontend_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .collect();

    if origins.is_empty() || origins.contains(&"*") {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .into_iter()
        .map(HeaderValue::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn root() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
