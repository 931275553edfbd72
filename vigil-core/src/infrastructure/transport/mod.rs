pub mod mock;

use crate::domain::block::{Block, Hrs};
use crate::domain::nonce::{Nonce, UuidNonces};
use crate::foundation::{ChainId, CosignerId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetNoncesRequest {
    pub uuids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetNoncesResponse {
    pub nonces: Vec<UuidNonces>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetNoncesAndSignRequest {
    pub uuid: Uuid,
    pub chain_id: ChainId,
    pub hrs: Hrs,
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
    pub nonces: Vec<Nonce>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetNoncesAndSignResponse {
    pub nonce_public: Vec<u8>,
    pub timestamp_nanos: u64,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignBlockRequest {
    pub chain_id: ChainId,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignBlockResponse {
    pub signature: Vec<u8>,
    pub timestamp_nanos: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferLeadershipRequest {
    pub leader_id: CosignerId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferLeadershipResponse {
    pub leader_id: Option<CosignerId>,
    pub leader_address: Option<String>,
}

/// Client half of the cosigner peer surface. Implementations carry the wire
/// plumbing (HTTP in the service crate, in-process routing in tests); the
/// core only sees this capability.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn get_nonces(&self, request: GetNoncesRequest) -> Result<GetNoncesResponse>;
    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse>;
    async fn sign_block(&self, request: SignBlockRequest) -> Result<SignBlockResponse>;
    async fn transfer_leadership(&self, request: TransferLeadershipRequest) -> Result<TransferLeadershipResponse>;
    async fn get_leader(&self) -> Result<Option<CosignerId>>;
    async fn ping(&self) -> Result<()>;
}

/// Server half of the same surface, implemented by the node and bridged onto
/// the wire by the service layer.
#[async_trait]
pub trait PeerService: Send + Sync {
    async fn get_nonces(&self, request: GetNoncesRequest) -> Result<GetNoncesResponse>;
    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse>;
    async fn sign_block(&self, request: SignBlockRequest) -> Result<SignBlockResponse>;
    async fn transfer_leadership(&self, request: TransferLeadershipRequest) -> Result<TransferLeadershipResponse>;
    async fn get_leader(&self) -> Result<Option<CosignerId>>;
}
