// Drive the HTTP clients against small in-process stub services.
use std::collections::HashMap;
use std::time::Duration;

use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
use serde_json::{Value, json};

use qchat_quantum::{
    Bb84Client, KeyAgreement, QrngClient, QuantumError, SeedSource, ServiceConfig,
};

async fn serve(app: Router) -> ServiceConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ServiceConfig {
        timeout: Duration::from_secs(5),
        ..ServiceConfig::default()
    }
    .with_backend_url(format!("http://{addr}"))
}

#[tokio::test]
async fn qrng_client_returns_requested_bytes() {
    let app = Router::new().route(
        "/qrng",
        get(|Query(q): Query<HashMap<String, usize>>| async move {
            let n = q["n"];
            let bytes = vec![0x5Au8; n];
            Json(json!({ "base64": base64_encode(&bytes) }))
        }),
    );
    let config = serve(app).await;

    let seed = QrngClient::new(&config).unwrap().generate_seed(32).await.unwrap();
    assert_eq!(seed, vec![0x5A; 32]);
}

#[tokio::test]
async fn qrng_short_payload_is_source_unavailable() {
    let app = Router::new().route(
        "/qrng",
        get(|| async { Json(json!({ "base64": "QUFBQQ==" })) }),
    );
    let config = serve(app).await;

    let err = QrngClient::new(&config).unwrap().generate_seed(32).await.unwrap_err();
    assert!(matches!(err, QuantumError::SourceUnavailable(_)));
}

#[tokio::test]
async fn qrng_server_error_is_source_unavailable() {
    let app = Router::new().route("/qrng", get(|| async { StatusCode::BAD_GATEWAY }));
    let config = serve(app).await;

    let err = QrngClient::new(&config).unwrap().generate_seed(8).await.unwrap_err();
    assert!(matches!(err, QuantumError::SourceUnavailable(_)));
}

#[tokio::test]
async fn unreachable_backend_is_source_unavailable() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ServiceConfig::default().with_backend_url(format!("http://{addr}"));
    let err = QrngClient::new(&config).unwrap().generate_seed(8).await.unwrap_err();
    assert!(matches!(err, QuantumError::SourceUnavailable(_)));
}

#[tokio::test]
async fn bb84_client_sends_seed_and_bit_count() {
    let app = Router::new().route(
        "/simulate_bb84",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q["seed_b64"], "QUFBQQ==");
            assert_eq!(q["n_bits"], "512");
            Json(json!({
                "base64_key": "QkJCQg==",
                "qber": 0.02,
                "kept": 250,
                "discarded": 262,
            }))
        }),
    );
    let config = serve(app).await;

    let agreement = Bb84Client::new(&config).unwrap().agree(b"AAAA", 512).await.unwrap();
    assert_eq!(agreement.sifted_key, b"BBBB");
    assert_eq!(agreement.kept, 250);
    assert_eq!(agreement.discarded, 262);
}

#[tokio::test]
async fn bb84_malformed_body_is_agreement_failed() {
    let app = Router::new().route(
        "/simulate_bb84",
        get(|| async { Json::<Value>(json!({ "unexpected": true })) }),
    );
    let config = serve(app).await;

    let err = Bb84Client::new(&config).unwrap().agree(b"seed", 256).await.unwrap_err();
    assert!(matches!(err, QuantumError::AgreementFailed(_)));
}

#[tokio::test]
async fn bb84_service_error_is_agreement_failed() {
    let app = Router::new().route(
        "/simulate_bb84",
        get(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "n_bits out of range") }),
    );
    let config = serve(app).await;

    let err = Bb84Client::new(&config).unwrap().agree(b"seed", 1).await.unwrap_err();
    assert!(matches!(err, QuantumError::AgreementFailed(_)));
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
