#![allow(dead_code)]

use ed25519_dalek::{SigningKey, VerifyingKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_core::application::{
    Cosigner, CosignerNonceCache, FixedLeader, LocalCosigner, NonceCacheConfig, NoncePruner, RemoteCosigner,
    ThresholdValidator, Validator,
};
use vigil_core::domain::{SoftShareScheme, ThresholdScheme};
use vigil_core::foundation::{CosignerId, Result, SignerError};
use vigil_core::infrastructure::storage::MemoryStateStore;
use vigil_core::infrastructure::transport::mock::MockPeerClient;
use vigil_core::infrastructure::transport::{
    GetNoncesRequest, GetNoncesResponse, PeerClient, PeerService, SetNoncesAndSignRequest, SetNoncesAndSignResponse,
    SignBlockRequest, SignBlockResponse, TransferLeadershipRequest, TransferLeadershipResponse,
};

pub const SCHEME_SEED: [u8; 32] = [42u8; 32];

pub fn scheme(threshold: usize) -> Arc<dyn ThresholdScheme> {
    Arc::new(SoftShareScheme::new(SCHEME_SEED, threshold))
}

/// N local cosigners sharing one scheme key, each with its own identity key
/// and in-memory share state.
pub fn local_cosigners(threshold: usize, total: u8) -> Vec<Arc<LocalCosigner>> {
    let identities: Vec<SigningKey> = (1..=total).map(|id| SigningKey::from_bytes(&[id; 32])).collect();
    let peer_identities: HashMap<CosignerId, VerifyingKey> = identities
        .iter()
        .enumerate()
        .map(|(index, key)| (CosignerId::new(index as u8 + 1), key.verifying_key()))
        .collect();
    identities
        .into_iter()
        .enumerate()
        .map(|(index, identity)| {
            Arc::new(LocalCosigner::new(
                CosignerId::new(index as u8 + 1),
                total,
                threshold,
                scheme(threshold),
                identity,
                peer_identities.clone(),
                Duration::from_secs(60),
                Arc::new(MemoryStateStore::new()),
            ))
        })
        .collect()
}

pub fn cache_config(threshold: usize) -> NonceCacheConfig {
    NonceCacheConfig {
        get_nonces_interval: Duration::from_millis(100),
        get_nonces_timeout: Duration::from_millis(500),
        nonce_expiration: Duration::from_secs(60),
        threshold,
        safety_factor: 1.2,
        target_min: 1,
        target_max: 5_000,
    }
}

pub fn dyn_cosigners(locals: &[Arc<LocalCosigner>]) -> Vec<Arc<dyn Cosigner>> {
    locals.iter().map(|local| Arc::clone(local) as Arc<dyn Cosigner>).collect()
}

/// Observing pruner wrapper; the cache stays its own pruner underneath.
pub struct MockPruner {
    cache: Mutex<Option<Arc<CosignerNonceCache>>>,
    count: AtomicUsize,
    pruned: AtomicUsize,
}

impl MockPruner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { cache: Mutex::new(None), count: AtomicUsize::new(0), pruned: AtomicUsize::new(0) })
    }

    pub fn attach(&self, cache: Arc<CosignerNonceCache>) {
        *self.cache.lock().expect("pruner lock") = Some(cache);
    }

    pub fn result(&self) -> (usize, usize) {
        (self.count.load(Ordering::Relaxed), self.pruned.load(Ordering::Relaxed))
    }
}

impl NoncePruner for MockPruner {
    fn prune_nonces(&self) -> usize {
        let target = self.cache.lock().expect("pruner lock").clone();
        let pruned = target.map(|cache| cache.prune_nonces()).unwrap_or(0);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.pruned.fetch_add(pruned, Ordering::Relaxed);
        pruned
    }
}

/// Peer service exposing only the cosigner surface; block signing and
/// leadership answer as a non-leader would.
pub struct PeerCosignerService {
    cosigner: Arc<LocalCosigner>,
    sign_calls: AtomicUsize,
}

impl PeerCosignerService {
    pub fn new(cosigner: Arc<LocalCosigner>) -> Self {
        Self { cosigner, sign_calls: AtomicUsize::new(0) }
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl PeerService for PeerCosignerService {
    async fn get_nonces(&self, request: GetNoncesRequest) -> Result<GetNoncesResponse> {
        let nonces = self.cosigner.get_nonces(&request.uuids).await?;
        Ok(GetNoncesResponse { nonces })
    }

    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse> {
        self.sign_calls.fetch_add(1, Ordering::Relaxed);
        self.cosigner.set_nonces_and_sign(request).await
    }

    async fn sign_block(&self, _request: SignBlockRequest) -> Result<SignBlockResponse> {
        Err(SignerError::NotLeader { leader_id: None })
    }

    async fn transfer_leadership(&self, _request: TransferLeadershipRequest) -> Result<TransferLeadershipResponse> {
        Ok(TransferLeadershipResponse { leader_id: None, leader_address: None })
    }

    async fn get_leader(&self) -> Result<Option<CosignerId>> {
        Ok(None)
    }
}

/// One signer node built over shared local cosigners, with handles into the
/// mock transport for partition injection.
pub struct Node {
    pub validator: Arc<ThresholdValidator>,
    pub cache: Arc<CosignerNonceCache>,
    pub clients: HashMap<u8, Arc<MockPeerClient>>,
    pub services: HashMap<u8, Arc<PeerCosignerService>>,
    pub store: Arc<MemoryStateStore>,
    pub leader: Arc<FixedLeader>,
}

impl Node {
    /// The committed validator-level record for the default test chain.
    pub fn store_state(&self) -> Option<vigil_core::domain::LastSignedState> {
        use vigil_core::infrastructure::storage::StateStore;
        self.store.load(&vigil_core::foundation::ChainId::from("test-chain-1")).expect("load state")
    }
}

pub fn build_node(locals: &[Arc<LocalCosigner>], self_id: u8, leader_id: u8, threshold: usize) -> Node {
    build_node_with_services(locals, self_id, leader_id, threshold, HashMap::new())
}

/// `overrides` swaps in a richer peer service (e.g. a full node) for
/// selected peer ids.
pub fn build_node_with_services(
    locals: &[Arc<LocalCosigner>],
    self_id: u8,
    leader_id: u8,
    threshold: usize,
    overrides: HashMap<u8, Arc<dyn PeerService>>,
) -> Node {
    let my = Arc::clone(&locals[(self_id - 1) as usize]);
    let leader = Arc::new(FixedLeader::new(CosignerId::new(self_id), CosignerId::new(leader_id)));

    let mut peers = Vec::new();
    let mut clients = HashMap::new();
    let mut services = HashMap::new();
    for (index, local) in locals.iter().enumerate() {
        let id = index as u8 + 1;
        if id == self_id {
            continue;
        }
        let service: Arc<dyn PeerService> = match overrides.get(&id) {
            Some(service) => Arc::clone(service),
            None => {
                let service = Arc::new(PeerCosignerService::new(Arc::clone(local)));
                services.insert(id, Arc::clone(&service));
                service
            }
        };
        let client = Arc::new(MockPeerClient::new(CosignerId::new(id), service));
        clients.insert(id, Arc::clone(&client));
        peers.push(Arc::new(RemoteCosigner::new(
            CosignerId::new(id),
            format!("http://cosigner-{id}"),
            client as Arc<dyn PeerClient>,
            Duration::from_millis(500),
        )));
    }

    let mut members: Vec<Arc<dyn Cosigner>> = vec![Arc::clone(&my) as Arc<dyn Cosigner>];
    members.extend(peers.iter().map(|peer| Arc::clone(peer) as Arc<dyn Cosigner>));
    let cache = CosignerNonceCache::new(cache_config(threshold), members, leader.clone(), None);
    let store = Arc::new(MemoryStateStore::new());
    let validator = Arc::new(ThresholdValidator::new(
        my,
        peers,
        threshold,
        scheme(threshold),
        leader.clone(),
        Arc::clone(&cache),
        Arc::clone(&store) as Arc<dyn vigil_core::infrastructure::storage::StateStore>,
        Duration::from_millis(500),
        Duration::from_millis(100),
    ));
    Node { validator, cache, clients, services, store, leader }
}

pub fn node_service_for(node: &Node, locals: &[Arc<LocalCosigner>], self_id: u8) -> Arc<dyn PeerService> {
    Arc::new(vigil_core::application::NodeService::new(
        Arc::clone(&locals[(self_id - 1) as usize]),
        Arc::clone(&node.validator) as Arc<dyn Validator>,
        node.leader.clone(),
        HashMap::new(),
    ))
}
