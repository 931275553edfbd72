//! Consensus-node-facing signer endpoints: PubKey and SignBlock, with error
//! classification and per-step sign tracking.

use super::error_response;
use crate::api::state::ApiState;
use crate::api::wire::{PubKeyRequest, PubKeyResponse, SignRequest, SignResponse};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{debug, error, info};
use std::sync::Arc;
use vigil_core::application::SignedOutput;
use vigil_core::domain::Block;
use vigil_core::foundation::{ChainId, ErrorCode, Result};

pub async fn handle_pub_key(State(state): State<Arc<ApiState>>, Json(request): Json<PubKeyRequest>) -> Response {
    let chain_id = ChainId::from(request.chain_id);
    state.metrics.inc_pub_key_request(&chain_id);
    match state.validator.pub_key(&chain_id).await {
        Ok(pub_key) => Json(PubKeyResponse { pub_key }).into_response(),
        Err(err) => {
            error!("failed to get pub key chain_id={} error={}", chain_id, err);
            error_response(&err)
        }
    }
}

pub async fn handle_sign(State(state): State<Arc<ApiState>>, Json(request): Json<SignRequest>) -> Response {
    let chain_id = ChainId::from(request.chain_id);
    let block = match request.block.into_block() {
        Ok(block) => block,
        Err(err) => return error_response(&err),
    };
    match sign_and_track(&state, &chain_id, &block).await {
        Ok(output) => Json(SignResponse { signature: output.signature, timestamp_nanos: output.timestamp_nanos }).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn sign_and_track(state: &ApiState, chain_id: &ChainId, block: &Block) -> Result<SignedOutput> {
    let output = match state.validator.sign(chain_id, block).await {
        Ok(output) => output,
        Err(err) => {
            if err.code() == ErrorCode::BeyondBlock {
                debug!(
                    "rejecting sign request type={} chain_id={} height={} round={} reason={}",
                    block.step, chain_id, block.height, block.round, err
                );
                state.metrics.inc_beyond_block(chain_id);
            } else {
                error!(
                    "failed to sign type={} chain_id={} height={} round={} error={}",
                    block.step, chain_id, block.height, block.round, err
                );
                state.metrics.inc_failed_sign(chain_id);
            }
            return Err(err);
        }
    };

    // Show that every consensus node was handed the same signature bytes.
    let prefix_len = output.signature.len().min(6);
    info!(
        "signed type={} chain_id={} height={} round={} sig={} ts={}",
        block.step,
        chain_id,
        block.height,
        block.round,
        hex::encode(&output.signature[..prefix_len]),
        output.timestamp_nanos
    );
    state.metrics.track_signed(chain_id, block);
    Ok(output)
}
