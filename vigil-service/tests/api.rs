use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use std::sync::Arc;
use tower::ServiceExt;
use vigil_core::application::SingleSignerValidator;
use vigil_core::infrastructure::storage::MemoryStateStore;
use vigil_service::api::{build_router, ApiState};
use vigil_service::service::metrics::Metrics;

fn test_state() -> Arc<ApiState> {
    let signing_key = SigningKey::from_bytes(&[9u8; 32]);
    let validator = Arc::new(SingleSignerValidator::new(signing_key, Arc::new(MemoryStateStore::new())));
    Arc::new(ApiState { validator, node: None, metrics: Arc::new(Metrics::new().expect("metrics")) })
}

async fn request_json(router: &Router, method: &str, path: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router.clone().oneshot(builder.body(body).expect("request")).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn sign_body(height: i64, sign_bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "chain_id": "test-chain-1",
        "block": {
            "height": height,
            "round": 0,
            "step": 3,
            "sign_bytes": hex::encode(sign_bytes),
            "timestamp_nanos": 1_700_000_000_000_000_000u64,
        }
    })
}

#[tokio::test]
async fn pub_key_and_sign_round_trip() {
    let router = build_router(test_state());

    let (status, body) = request_json(&router, "POST", "/v1/pubkey", Some(serde_json::json!({"chain_id": "test-chain-1"}))).await;
    assert_eq!(status, StatusCode::OK);
    let pub_key_bytes: [u8; 32] =
        hex::decode(body["pub_key"].as_str().expect("pub_key")).expect("hex").try_into().expect("32 bytes");
    let verifying_key = VerifyingKey::from_bytes(&pub_key_bytes).expect("key");

    let (status, body) = request_json(&router, "POST", "/v1/sign", Some(sign_body(10, b"precommit-bytes"))).await;
    assert_eq!(status, StatusCode::OK);
    let signature_bytes = hex::decode(body["signature"].as_str().expect("signature")).expect("hex");
    let signature = Signature::try_from(signature_bytes.as_slice()).expect("signature bytes");
    verifying_key.verify(b"precommit-bytes", &signature).expect("verify");
}

#[tokio::test]
async fn replay_is_idempotent_and_conflicts_are_classified() {
    let router = build_router(test_state());

    let (status, first) = request_json(&router, "POST", "/v1/sign", Some(sign_body(10, b"precommit-bytes"))).await;
    assert_eq!(status, StatusCode::OK);

    // identical resubmission: bit-identical signature and timestamp
    let (status, replay) = request_json(&router, "POST", "/v1/sign", Some(sign_body(10, b"precommit-bytes"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay, first);

    // conflicting bytes at the same HRS
    let (status, body) = request_json(&router, "POST", "/v1/sign", Some(sign_body(10, b"forked-bytes"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflicting_data");

    // older than last signed
    let (status, body) = request_json(&router, "POST", "/v1/sign", Some(sign_body(9, b"precommit-bytes"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "beyond_block");
}

#[tokio::test]
async fn metrics_expose_sign_counters() {
    let state = test_state();
    let router = build_router(Arc::clone(&state));

    let (status, _) = request_json(&router, "POST", "/v1/sign", Some(sign_body(10, b"precommit-bytes"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request_json(&router, "POST", "/v1/sign", Some(sign_body(9, b"stale"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(Request::builder().method("GET").uri("/metrics").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(text.contains("vigil_signed_total{chain_id=\"test-chain-1\",type=\"precommit\"} 1"), "{text}");
    assert!(text.contains("vigil_beyond_block_errors_total{chain_id=\"test-chain-1\"} 1"), "{text}");
}

#[tokio::test]
async fn cosigner_endpoints_absent_in_single_mode() {
    let router = build_router(test_state());
    let (status, _) = request_json(&router, "GET", "/v1/cosigner/leader", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let router = build_router(test_state());
    let (status, body) = request_json(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
