use crate::application::cosigner::{Cosigner, LocalCosigner};
use crate::application::leader::Leader;
use crate::application::validator::Validator;
use crate::foundation::{CosignerId, Result};
use crate::infrastructure::transport::{
    GetNoncesRequest, GetNoncesResponse, PeerService, SetNoncesAndSignRequest, SetNoncesAndSignResponse, SignBlockRequest,
    SignBlockResponse, TransferLeadershipRequest, TransferLeadershipResponse,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Peer-facing surface of this node: nonce generation and partial signing
/// via the local cosigner, block signing via the validator (the forwarding
/// target for non-leaders), and leadership queries.
pub struct NodeService {
    cosigner: Arc<LocalCosigner>,
    validator: Arc<dyn Validator>,
    leader: Arc<dyn Leader>,
    peer_addresses: HashMap<CosignerId, String>,
}

impl NodeService {
    pub fn new(
        cosigner: Arc<LocalCosigner>,
        validator: Arc<dyn Validator>,
        leader: Arc<dyn Leader>,
        peer_addresses: HashMap<CosignerId, String>,
    ) -> Self {
        Self { cosigner, validator, leader, peer_addresses }
    }
}

#[async_trait]
impl PeerService for NodeService {
    async fn get_nonces(&self, request: GetNoncesRequest) -> Result<GetNoncesResponse> {
        let nonces = self.cosigner.get_nonces(&request.uuids).await?;
        Ok(GetNoncesResponse { nonces })
    }

    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse> {
        self.cosigner.set_nonces_and_sign(request).await
    }

    async fn sign_block(&self, request: SignBlockRequest) -> Result<SignBlockResponse> {
        let output = self.validator.sign(&request.chain_id, &request.block).await?;
        Ok(SignBlockResponse { signature: output.signature, timestamp_nanos: output.timestamp_nanos })
    }

    async fn transfer_leadership(&self, request: TransferLeadershipRequest) -> Result<TransferLeadershipResponse> {
        let leader_id = self.leader.transfer_leadership(request.leader_id).await?;
        let leader_address = leader_id.and_then(|id| self.peer_addresses.get(&id).cloned());
        Ok(TransferLeadershipResponse { leader_id, leader_address })
    }

    async fn get_leader(&self) -> Result<Option<CosignerId>> {
        Ok(self.leader.leader_id())
    }
}
