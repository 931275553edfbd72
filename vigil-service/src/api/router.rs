use super::handlers::cosigner::{handle_get_leader, handle_get_nonces, handle_set_nonces_and_sign, handle_sign_block, handle_transfer_leadership};
use super::handlers::health::{handle_health, handle_metrics};
use super::handlers::signer::{handle_pub_key, handle_sign};
use super::state::ApiState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use vigil_core::foundation::SignerError;

pub async fn run_server(addr: SocketAddr, state: Arc<ApiState>) -> Result<(), SignerError> {
    info!("binding signer api addr={}", addr);
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("signer api ready and accepting connections addr={}", addr);
    axum::serve(listener, app).await.map_err(|err| {
        error!("signer api terminated unexpectedly addr={} error={}", addr, err);
        SignerError::Message(err.to_string())
    })
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1/pubkey", post(handle_pub_key))
        .route("/v1/sign", post(handle_sign))
        .route("/v1/cosigner/nonces", post(handle_get_nonces))
        .route("/v1/cosigner/sign", post(handle_set_nonces_and_sign))
        .route("/v1/cosigner/block", post(handle_sign_block))
        .route("/v1/cosigner/leadership", post(handle_transfer_leadership))
        .route("/v1/cosigner/leader", get(handle_get_leader))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(DefaultBodyLimit::max(4 * 1024 * 1024))
        .with_state(state)
}
