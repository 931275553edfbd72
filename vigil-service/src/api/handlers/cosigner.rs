//! Peer-facing cosigner endpoints bridging the wire schema onto the node's
//! [`PeerService`] surface.

use super::error_response;
use crate::api::state::ApiState;
use crate::api::wire::{
    GetNoncesRequestWire, GetNoncesResponseWire, LeaderResponseWire, SetNoncesAndSignRequestWire,
    SetNoncesAndSignResponseWire, SignBlockRequestWire, SignResponse, TransferLeadershipRequestWire,
    TransferLeadershipResponseWire, UuidNoncesWire,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use vigil_core::application::NodeService;
use vigil_core::foundation::CosignerId;
use vigil_core::infrastructure::transport::{GetNoncesRequest, PeerService, TransferLeadershipRequest};

fn node_or_unavailable(state: &ApiState) -> Result<&Arc<NodeService>, Response> {
    state.node.as_ref().ok_or_else(|| {
        (StatusCode::NOT_FOUND, "cosigner endpoints are not served in single-signer mode").into_response()
    })
}

pub async fn handle_get_nonces(State(state): State<Arc<ApiState>>, Json(request): Json<GetNoncesRequestWire>) -> Response {
    let node = match node_or_unavailable(&state) {
        Ok(node) => node,
        Err(response) => return response,
    };
    match node.get_nonces(GetNoncesRequest { uuids: request.uuids }).await {
        Ok(response) => {
            let nonces = response.nonces.iter().map(UuidNoncesWire::from_set).collect();
            Json(GetNoncesResponseWire { nonces }).into_response()
        }
        Err(err) => error_response(&err),
    }
}

pub async fn handle_set_nonces_and_sign(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SetNoncesAndSignRequestWire>,
) -> Response {
    let node = match node_or_unavailable(&state) {
        Ok(node) => node,
        Err(response) => return response,
    };
    let request = match request.into_request() {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };
    match node.set_nonces_and_sign(request).await {
        Ok(response) => Json(SetNoncesAndSignResponseWire::from_response(&response)).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn handle_sign_block(State(state): State<Arc<ApiState>>, Json(request): Json<SignBlockRequestWire>) -> Response {
    let node = match node_or_unavailable(&state) {
        Ok(node) => node,
        Err(response) => return response,
    };
    let request = match request.into_request() {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };
    match node.sign_block(request).await {
        Ok(response) => {
            Json(SignResponse { signature: response.signature, timestamp_nanos: response.timestamp_nanos }).into_response()
        }
        Err(err) => error_response(&err),
    }
}

pub async fn handle_transfer_leadership(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<TransferLeadershipRequestWire>,
) -> Response {
    let node = match node_or_unavailable(&state) {
        Ok(node) => node,
        Err(response) => return response,
    };
    match node.transfer_leadership(TransferLeadershipRequest { leader_id: CosignerId::new(request.leader_id) }).await {
        Ok(response) => Json(TransferLeadershipResponseWire::from_response(&response)).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn handle_get_leader(State(state): State<Arc<ApiState>>) -> Response {
    let node = match node_or_unavailable(&state) {
        Ok(node) => node,
        Err(response) => return response,
    };
    match node.get_leader().await {
        Ok(leader_id) => Json(LeaderResponseWire { leader_id: leader_id.map(|id| id.value()) }).into_response(),
        Err(err) => error_response(&err),
    }
}
