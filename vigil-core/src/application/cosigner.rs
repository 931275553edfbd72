use crate::domain::nonce::{Nonce, UuidNonces};
use crate::domain::scheme::{NonceShares, ThresholdScheme};
use crate::domain::sign_state::{self, LastSignedState, SignCheck};
use crate::foundation::{CosignerId, Result, SignerError};
use crate::infrastructure::storage::{ChainStateRegistry, StateStore};
use crate::infrastructure::transport::{PeerClient, SetNoncesAndSignRequest, SetNoncesAndSignResponse, SignBlockRequest, SignBlockResponse};
use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A cosigner holds one share of the validator key and contributes nonces
/// and partial signatures. Local and remote implementations expose the same
/// capability set.
#[async_trait]
pub trait Cosigner: Send + Sync {
    fn id(&self) -> CosignerId;
    async fn get_nonces(&self, uuids: &[Uuid]) -> Result<Vec<UuidNonces>>;
    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse>;
}

/// Byte layout every nonce-share identity signature commits to. Bincode with
/// default options, so the encoding is stable across peers.
#[derive(Serialize)]
struct SharePayload<'a> {
    uuid: &'a [u8],
    source_id: u8,
    destination_id: u8,
    pub_key: &'a [u8],
    share: &'a [u8],
}

fn share_payload_bytes(uuid: &Uuid, source: CosignerId, destination: CosignerId, pub_key: &[u8], share: &[u8]) -> Result<Vec<u8>> {
    bincode::serialize(&SharePayload {
        uuid: uuid.as_bytes(),
        source_id: source.value(),
        destination_id: destination.value(),
        pub_key,
        share,
    })
    .map_err(|err| SignerError::SerializationError { format: "bincode".to_string(), details: err.to_string() })
}

struct StoredNonces {
    expires_at: Instant,
    shares: NonceShares,
}

/// The cosigner running inside this process. Generates and caches nonce
/// secrets per uuid, signs shares with its identity key, verifies incoming
/// shares against peer identity keys, and keeps its own durable per-chain
/// guard so a partial is never produced for a regressed or conflicting HRS,
/// regardless of which leader drives the round.
pub struct LocalCosigner {
    id: CosignerId,
    total: u8,
    threshold: usize,
    scheme: Arc<dyn ThresholdScheme>,
    identity: SigningKey,
    peer_identities: HashMap<CosignerId, VerifyingKey>,
    nonce_ttl: Duration,
    nonces: Mutex<HashMap<Uuid, StoredNonces>>,
    share_state: ChainStateRegistry,
}

impl LocalCosigner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CosignerId,
        total: u8,
        threshold: usize,
        scheme: Arc<dyn ThresholdScheme>,
        identity: SigningKey,
        peer_identities: HashMap<CosignerId, VerifyingKey>,
        nonce_ttl: Duration,
        share_store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            id,
            total,
            threshold,
            scheme,
            identity,
            peer_identities,
            nonce_ttl,
            nonces: Mutex::new(HashMap::new()),
            share_state: ChainStateRegistry::new(share_store),
        }
    }

    pub fn pub_key(&self) -> Vec<u8> {
        self.scheme.pub_key()
    }

    pub fn identity_pub_key(&self) -> VerifyingKey {
        self.identity.verifying_key()
    }

    /// Drops stored nonce secrets past their TTL. Returns the removed count.
    pub fn prune_stale_nonces(&self) -> usize {
        let now = Instant::now();
        let mut nonces = self.nonces.lock().unwrap_or_else(|e| e.into_inner());
        let before = nonces.len();
        nonces.retain(|_, stored| stored.expires_at > now);
        before - nonces.len()
    }

    fn verify_share(&self, uuid: &Uuid, nonce: &Nonce) -> bool {
        let Some(identity) = self.peer_identities.get(&nonce.source_id) else {
            return false;
        };
        let Ok(payload) = share_payload_bytes(uuid, nonce.source_id, nonce.destination_id, &nonce.pub_key, &nonce.share) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(nonce.signature.as_slice()) else {
            return false;
        };
        identity.verify(&payload, &signature).is_ok()
    }

    fn generate_for(&self, uuid: Uuid) -> Result<UuidNonces> {
        let shares = self.scheme.generate_nonces(self.total)?;
        let mut nonces = Vec::with_capacity(self.total as usize);
        for destination_index in 0..self.total {
            let destination = CosignerId::new(destination_index + 1);
            let share = shares.shares[destination_index as usize].clone();
            let payload = share_payload_bytes(&uuid, self.id, destination, &shares.public, &share)?;
            nonces.push(Nonce {
                source_id: self.id,
                destination_id: destination,
                pub_key: shares.public.clone(),
                share,
                signature: self.identity.sign(&payload).to_bytes().to_vec(),
            });
        }
        let mut stored = self.nonces.lock().unwrap_or_else(|e| e.into_inner());
        stored.insert(uuid, StoredNonces { expires_at: Instant::now() + self.nonce_ttl, shares });
        Ok(UuidNonces { uuid, nonces })
    }

    fn take_stored(&self, uuid: &Uuid) -> Result<NonceShares> {
        let mut stored = self.nonces.lock().unwrap_or_else(|e| e.into_inner());
        stored.remove(uuid).map(|entry| entry.shares).ok_or_else(|| SignerError::CryptoError {
            operation: "nonce_lookup".to_string(),
            details: format!("no stored nonce for uuid {uuid}"),
        })
    }
}

#[async_trait]
impl Cosigner for LocalCosigner {
    fn id(&self) -> CosignerId {
        self.id
    }

    async fn get_nonces(&self, uuids: &[Uuid]) -> Result<Vec<UuidNonces>> {
        let pruned = self.prune_stale_nonces();
        if pruned > 0 {
            debug!("pruned {} stale nonce secrets cosigner_id={}", pruned, self.id);
        }
        uuids.iter().map(|uuid| self.generate_for(*uuid)).collect()
    }

    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse> {
        // Incoming shares must be addressed to this cosigner and carry a
        // valid identity signature from their source; anything else is a
        // peer fault and is discarded.
        let mut valid: BTreeMap<CosignerId, Nonce> = BTreeMap::new();
        for nonce in &request.nonces {
            if nonce.destination_id != self.id {
                warn!("discarding misaddressed nonce share source={} destination={} cosigner_id={}", nonce.source_id, nonce.destination_id, self.id);
                continue;
            }
            if !self.verify_share(&request.uuid, nonce) {
                warn!("discarding nonce share with invalid signature source={} cosigner_id={}", nonce.source_id, self.id);
                continue;
            }
            valid.entry(nonce.source_id).or_insert_with(|| nonce.clone());
        }
        if valid.len() < self.threshold {
            return Err(SignerError::CryptoError {
                operation: "verify_nonce_shares".to_string(),
                details: format!("only {} of {} required nonce shares verified", valid.len(), self.threshold),
            });
        }

        let own = self.take_stored(&request.uuid)?;

        let handle = self.share_state.entry(&request.chain_id).await?;
        let mut last = handle.lock().await;
        let check = sign_state::check(last.as_ref(), request.hrs, &request.sign_bytes)?;

        let publics: Vec<Vec<u8>> = valid.values().map(|nonce| nonce.pub_key.clone()).collect();
        let nonce_public = self.scheme.combine_nonce_publics(&publics)?;
        let shares: Vec<Vec<u8>> = valid.values().map(|nonce| nonce.share.clone()).collect();
        let signature = self.scheme.partial_sign(&own, &shares, &nonce_public, &request.sign_bytes)?;

        // An equal-bytes repeat at the last HRS is re-signed with the fresh
        // nonce; the share record only moves forward on Proceed.
        if matches!(check, SignCheck::Proceed) {
            let record = LastSignedState {
                hrs: request.hrs,
                sign_bytes: request.sign_bytes.clone(),
                signature: signature.clone(),
                timestamp_nanos: request.timestamp_nanos,
            };
            self.share_state.store().persist(&request.chain_id, &record)?;
            *last = Some(record);
        }
        debug!("produced partial signature cosigner_id={} chain_id={} hrs={}", self.id, request.chain_id, request.hrs);

        Ok(SetNoncesAndSignResponse { nonce_public, timestamp_nanos: request.timestamp_nanos, signature })
    }
}

/// A peer cosigner reached over the transport seam. Applies the per-call
/// deadline to partial-sign requests; nonce replenishment deadlines are
/// owned by the nonce cache.
pub struct RemoteCosigner {
    id: CosignerId,
    address: String,
    client: Arc<dyn PeerClient>,
    rpc_timeout: Duration,
}

impl RemoteCosigner {
    pub fn new(id: CosignerId, address: impl Into<String>, client: Arc<dyn PeerClient>, rpc_timeout: Duration) -> Self {
        Self { id, address: address.into(), client, rpc_timeout }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn sign_block(&self, request: SignBlockRequest) -> Result<SignBlockResponse> {
        self.client.sign_block(request).await
    }
}

#[async_trait]
impl Cosigner for RemoteCosigner {
    fn id(&self) -> CosignerId {
        self.id
    }

    async fn get_nonces(&self, uuids: &[Uuid]) -> Result<Vec<UuidNonces>> {
        let response = self.client.get_nonces(crate::infrastructure::transport::GetNoncesRequest { uuids: uuids.to_vec() }).await?;
        Ok(response.nonces)
    }

    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse> {
        match tokio::time::timeout(self.rpc_timeout, self.client.set_nonces_and_sign(request)).await {
            Ok(result) => result,
            Err(_) => Err(SignerError::Timeout { operation: format!("set_nonces_and_sign cosigner {}", self.id) }),
        }
    }
}
