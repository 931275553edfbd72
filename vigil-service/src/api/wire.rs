//! JSON wire types for the signer and cosigner HTTP API. Byte fields travel
//! as hex strings; conversions to and from the core types live here so the
//! handlers and the HTTP peer client share one schema.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::domain::{Block, Hrs, Nonce, Step, UuidNonces};
use vigil_core::foundation::{ChainId, CosignerId, SignerError};
use vigil_core::infrastructure::transport::{
    SetNoncesAndSignRequest, SetNoncesAndSignResponse, SignBlockRequest, TransferLeadershipResponse,
};

pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockWire {
    pub height: i64,
    pub round: i64,
    pub step: u8,
    #[serde(with = "hex_bytes")]
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
}

impl BlockWire {
    pub fn from_block(block: &Block) -> Self {
        Self {
            height: block.height,
            round: block.round,
            step: block.step.wire_code(),
            sign_bytes: block.sign_bytes.clone(),
            timestamp_nanos: block.timestamp_nanos,
        }
    }

    pub fn into_block(self) -> Result<Block, SignerError> {
        Ok(Block {
            height: self.height,
            round: self.round,
            step: Step::from_wire(self.step)?,
            sign_bytes: self.sign_bytes,
            timestamp_nanos: self.timestamp_nanos,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PubKeyRequest {
    pub chain_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PubKeyResponse {
    #[serde(with = "hex_bytes")]
    pub pub_key: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRequest {
    pub chain_id: String,
    pub block: BlockWire,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignResponse {
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    pub timestamp_nanos: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceWire {
    pub source_id: u8,
    pub destination_id: u8,
    #[serde(with = "hex_bytes")]
    pub pub_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub share: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl NonceWire {
    pub fn from_nonce(nonce: &Nonce) -> Self {
        Self {
            source_id: nonce.source_id.value(),
            destination_id: nonce.destination_id.value(),
            pub_key: nonce.pub_key.clone(),
            share: nonce.share.clone(),
            signature: nonce.signature.clone(),
        }
    }

    pub fn into_nonce(self) -> Nonce {
        Nonce {
            source_id: CosignerId::new(self.source_id),
            destination_id: CosignerId::new(self.destination_id),
            pub_key: self.pub_key,
            share: self.share,
            signature: self.signature,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UuidNoncesWire {
    pub uuid: Uuid,
    pub nonces: Vec<NonceWire>,
}

impl UuidNoncesWire {
    pub fn from_set(set: &UuidNonces) -> Self {
        Self { uuid: set.uuid, nonces: set.nonces.iter().map(NonceWire::from_nonce).collect() }
    }

    pub fn into_set(self) -> UuidNonces {
        UuidNonces { uuid: self.uuid, nonces: self.nonces.into_iter().map(NonceWire::into_nonce).collect() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetNoncesRequestWire {
    pub uuids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetNoncesResponseWire {
    pub nonces: Vec<UuidNoncesWire>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetNoncesAndSignRequestWire {
    pub uuid: Uuid,
    pub chain_id: String,
    pub height: i64,
    pub round: i64,
    pub step: u8,
    #[serde(with = "hex_bytes")]
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
    pub nonces: Vec<NonceWire>,
}

impl SetNoncesAndSignRequestWire {
    pub fn from_request(request: &SetNoncesAndSignRequest) -> Self {
        Self {
            uuid: request.uuid,
            chain_id: request.chain_id.to_string(),
            height: request.hrs.height,
            round: request.hrs.round,
            step: request.hrs.step.wire_code(),
            sign_bytes: request.sign_bytes.clone(),
            timestamp_nanos: request.timestamp_nanos,
            nonces: request.nonces.iter().map(NonceWire::from_nonce).collect(),
        }
    }

    pub fn into_request(self) -> Result<SetNoncesAndSignRequest, SignerError> {
        Ok(SetNoncesAndSignRequest {
            uuid: self.uuid,
            chain_id: ChainId::from(self.chain_id),
            hrs: Hrs { height: self.height, round: self.round, step: Step::from_wire(self.step)? },
            sign_bytes: self.sign_bytes,
            timestamp_nanos: self.timestamp_nanos,
            nonces: self.nonces.into_iter().map(NonceWire::into_nonce).collect(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetNoncesAndSignResponseWire {
    #[serde(with = "hex_bytes")]
    pub nonce_public: Vec<u8>,
    pub timestamp_nanos: u64,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SetNoncesAndSignResponseWire {
    pub fn from_response(response: &SetNoncesAndSignResponse) -> Self {
        Self {
            nonce_public: response.nonce_public.clone(),
            timestamp_nanos: response.timestamp_nanos,
            signature: response.signature.clone(),
        }
    }

    pub fn into_response(self) -> SetNoncesAndSignResponse {
        SetNoncesAndSignResponse {
            nonce_public: self.nonce_public,
            timestamp_nanos: self.timestamp_nanos,
            signature: self.signature,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignBlockRequestWire {
    pub chain_id: String,
    pub block: BlockWire,
}

impl SignBlockRequestWire {
    pub fn from_request(request: &SignBlockRequest) -> Self {
        Self { chain_id: request.chain_id.to_string(), block: BlockWire::from_block(&request.block) }
    }

    pub fn into_request(self) -> Result<SignBlockRequest, SignerError> {
        Ok(SignBlockRequest { chain_id: ChainId::from(self.chain_id), block: self.block.into_block()? })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferLeadershipRequestWire {
    pub leader_id: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferLeadershipResponseWire {
    pub leader_id: Option<u8>,
    pub leader_address: Option<String>,
}

impl TransferLeadershipResponseWire {
    pub fn from_response(response: &TransferLeadershipResponse) -> Self {
        Self { leader_id: response.leader_id.map(|id| id.value()), leader_address: response.leader_address.clone() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaderResponseWire {
    pub leader_id: Option<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorWire {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorWire,
}

/// Rebuilds a typed error from a peer's error body so leader forwarding
/// preserves guard semantics across the wire.
pub fn error_from_wire(code: &str, message: String) -> SignerError {
    match code {
        "beyond_block" => SignerError::BeyondBlock { message },
        "conflicting_data" => SignerError::ConflictingData { message },
        "no_nonces_available" => SignerError::NoNoncesAvailable,
        "not_leader" => SignerError::NotLeader { leader_id: None },
        "crypto_error" => SignerError::CryptoError { operation: "peer".to_string(), details: message },
        _ => SignerError::TransportError { operation: format!("peer ({code})"), details: message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_wire_round_trips_with_hex_sign_bytes() {
        let block = Block { height: 7, round: 1, step: Step::Prevote, sign_bytes: vec![0xDE, 0xAD], timestamp_nanos: 99 };
        let wire = BlockWire::from_block(&block);
        let json = serde_json::to_string(&wire).expect("serialize");
        assert!(json.contains("\"dead\""));
        let decoded: BlockWire = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.into_block().expect("block"), block);
    }

    #[test]
    fn guard_errors_survive_the_wire() {
        let err = error_from_wire("conflicting_data", "already signed".to_string());
        assert!(matches!(err, SignerError::ConflictingData { .. }));
        let err = error_from_wire("boom", "??".to_string());
        assert!(matches!(err, SignerError::TransportError { .. }));
    }
}
