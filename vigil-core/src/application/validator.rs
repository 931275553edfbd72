use crate::application::cosigner::{Cosigner, LocalCosigner, RemoteCosigner};
use crate::application::health::CosignerHealth;
use crate::application::leader::Leader;
use crate::application::nonce_cache::CosignerNonceCache;
use crate::domain::block::{Block, Hrs};
use crate::domain::nonce::{CachedNonce, Nonce};
use crate::domain::scheme::{PartialSignature, ThresholdScheme};
use crate::domain::sign_state::{self, LastSignedState, SignCheck};
use crate::foundation::{ChainId, CosignerId, ErrorCode, Result, SignerError};
use crate::infrastructure::storage::{ChainStateHandle, ChainStateRegistry, StateStore};
use crate::infrastructure::transport::{SetNoncesAndSignRequest, SignBlockRequest};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use uuid::Uuid;

/// A full signature plus the timestamp attested for it. Identical for
/// idempotent replays of the same request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedOutput {
    pub signature: Vec<u8>,
    pub timestamp_nanos: u64,
}

/// What the external signer adapter consumes: the validator identity behind
/// PubKey/Sign, in either threshold or single-signer mode.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn pub_key(&self, chain_id: &ChainId) -> Result<Vec<u8>>;
    async fn sign(&self, chain_id: &ChainId, block: &Block) -> Result<SignedOutput>;
    async fn stop(&self);
}

type InFlightMap = HashMap<(ChainId, Hrs), broadcast::Sender<Result<SignedOutput>>>;

/// Removes the in-flight entry when a round finishes or its future is
/// cancelled; waiters observe the closed channel and fail cleanly.
struct InFlightGuard {
    map: Arc<Mutex<InFlightMap>>,
    key: (ChainId, Hrs),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.key);
    }
}

/// Orchestrates one signing round per (chain, HRS): double-sign guard, nonce
/// acquisition, partial-sign fan-out, combination, durable commit.
pub struct ThresholdValidator {
    my_cosigner: Arc<LocalCosigner>,
    peers: Vec<Arc<RemoteCosigner>>,
    cosigners: Vec<Arc<dyn Cosigner>>,
    threshold: usize,
    scheme: Arc<dyn ThresholdScheme>,
    leader: Arc<dyn Leader>,
    nonce_cache: Arc<CosignerNonceCache>,
    chain_state: ChainStateRegistry,
    health: CosignerHealth,
    inline_nonce_timeout: Duration,
    election_timeout: Duration,
    in_flight: Arc<Mutex<InFlightMap>>,
    shutdown: watch::Sender<bool>,
}

impl ThresholdValidator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        my_cosigner: Arc<LocalCosigner>,
        peers: Vec<Arc<RemoteCosigner>>,
        threshold: usize,
        scheme: Arc<dyn ThresholdScheme>,
        leader: Arc<dyn Leader>,
        nonce_cache: Arc<CosignerNonceCache>,
        store: Arc<dyn StateStore>,
        inline_nonce_timeout: Duration,
        election_timeout: Duration,
    ) -> Self {
        let mut cosigners: Vec<Arc<dyn Cosigner>> = vec![Arc::clone(&my_cosigner) as Arc<dyn Cosigner>];
        cosigners.extend(peers.iter().map(|peer| Arc::clone(peer) as Arc<dyn Cosigner>));
        let health = CosignerHealth::new(peers.iter().map(|peer| peer.id()));
        let (shutdown, _) = watch::channel(false);
        Self {
            my_cosigner,
            peers,
            cosigners,
            threshold,
            scheme,
            leader,
            nonce_cache,
            chain_state: ChainStateRegistry::new(store),
            health,
            inline_nonce_timeout,
            election_timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn nonce_cache(&self) -> &Arc<CosignerNonceCache> {
        &self.nonce_cache
    }

    async fn forward_to_leader(&self, chain_id: &ChainId, block: &Block) -> Result<SignedOutput> {
        let leader_id = match self.leader.leader_id() {
            Some(id) => Some(id),
            None => {
                debug!("no known leader; waiting {:?} for the election to converge", self.election_timeout);
                tokio::time::sleep(self.election_timeout).await;
                self.leader.leader_id()
            }
        };
        match leader_id {
            Some(id) if id == self.my_cosigner.id() => self.sign_as_leader(chain_id, block).await,
            Some(id) => {
                let peer = self
                    .peers
                    .iter()
                    .find(|peer| peer.id() == id)
                    .ok_or(SignerError::NotLeader { leader_id: Some(id.value()) })?;
                debug!("forwarding sign request to leader cosigner {} chain_id={} hrs={}", id, chain_id, block.hrs());
                let response = peer.sign_block(SignBlockRequest { chain_id: chain_id.clone(), block: block.clone() }).await?;
                Ok(SignedOutput { signature: response.signature, timestamp_nanos: response.timestamp_nanos })
            }
            None => {
                warn!("election timeout elapsed with no leader; attempting a local round chain_id={}", chain_id);
                self.sign_as_leader(chain_id, block).await
            }
        }
    }

    async fn sign_as_leader(&self, chain_id: &ChainId, block: &Block) -> Result<SignedOutput> {
        let hrs = block.hrs();
        let handle = self.chain_state.entry(chain_id).await?;

        // Concurrent identical requests share one attempt; whoever inserts
        // first runs the round, everyone else awaits the broadcast outcome.
        let key = (chain_id.clone(), hrs);
        enum InFlightAction {
            Join(broadcast::Receiver<Result<SignedOutput>>),
            Start(broadcast::Sender<Result<SignedOutput>>),
        }
        let action = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(sender) = in_flight.get(&key) {
                InFlightAction::Join(sender.subscribe())
            } else {
                let (sender, _receiver) = broadcast::channel(1);
                in_flight.insert(key.clone(), sender.clone());
                InFlightAction::Start(sender)
            }
        };
        let sender = match action {
            InFlightAction::Join(mut receiver) => {
                debug!("joining in-flight sign round chain_id={} hrs={}", chain_id, hrs);
                return match receiver.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SignerError::Message("in-flight sign round was cancelled".to_string())),
                };
            }
            InFlightAction::Start(sender) => sender,
        };
        let guard = InFlightGuard { map: Arc::clone(&self.in_flight), key };

        let result = self.run_round(chain_id, block, hrs, &handle).await;
        // Deregister before broadcasting: anyone arriving now re-runs the
        // guard and replays, instead of subscribing after the send.
        drop(guard);
        let _ = sender.send(result.clone());
        result
    }

    async fn run_round(&self, chain_id: &ChainId, block: &Block, hrs: Hrs, handle: &ChainStateHandle) -> Result<SignedOutput> {
        {
            let last = handle.lock().await;
            match sign_state::check(last.as_ref(), hrs, &block.sign_bytes)? {
                SignCheck::Proceed => {}
                SignCheck::Replay { signature, timestamp_nanos } => {
                    debug!("replaying cached signature chain_id={} hrs={}", chain_id, hrs);
                    return Ok(SignedOutput { signature, timestamp_nanos });
                }
            }
        }

        let cached = self.acquire_nonces().await?;
        let participants: Vec<CosignerId> = cached.sources().collect();
        let uuid = cached.uuid;

        let timestamp_nanos = block.timestamp_nanos;
        let mut join_set = JoinSet::new();
        for peer in self.peers.iter().filter(|peer| participants.contains(&peer.id())) {
            let peer = Arc::clone(peer);
            let request = SetNoncesAndSignRequest {
                uuid,
                chain_id: chain_id.clone(),
                hrs,
                sign_bytes: block.sign_bytes.clone(),
                timestamp_nanos,
                nonces: cached.nonces_for(peer.id(), &participants),
            };
            join_set.spawn(async move {
                let started = Instant::now();
                let result = peer.set_nonces_and_sign(request).await;
                (peer.id(), started.elapsed(), result)
            });
        }

        let local_request = SetNoncesAndSignRequest {
            uuid,
            chain_id: chain_id.clone(),
            hrs,
            sign_bytes: block.sign_bytes.clone(),
            timestamp_nanos,
            nonces: cached.nonces_for(self.my_cosigner.id(), &participants),
        };
        let local = self.my_cosigner.set_nonces_and_sign(local_request).await?;

        let mut partials = vec![PartialSignature { cosigner_id: self.my_cosigner.id(), signature: local.signature.clone() }];
        while let Some(joined) = join_set.join_next().await {
            let Ok((peer_id, rtt, result)) = joined else {
                continue;
            };
            match result {
                Ok(response) if response.nonce_public == local.nonce_public => {
                    self.health.record_success(peer_id, rtt);
                    partials.push(PartialSignature { cosigner_id: peer_id, signature: response.signature });
                }
                Ok(_) => {
                    self.health.record_failure(peer_id);
                    warn!("cosigner {} disagrees on the aggregate nonce public chain_id={} hrs={}", peer_id, chain_id, hrs);
                }
                Err(err) => {
                    self.health.record_failure(peer_id);
                    // A cosigner that lost its nonce secrets (restart)
                    // invalidates every cached set it participates in.
                    if err.code() == ErrorCode::CryptoError {
                        self.nonce_cache.clear_nonces(peer_id);
                    }
                    warn!("partial signature from cosigner {} failed chain_id={} hrs={} error={}", peer_id, chain_id, hrs, err);
                }
            }
        }

        if partials.len() < self.threshold {
            // No commit happened, so an identical retry is safe.
            return Err(SignerError::ThresholdNotMet { required: self.threshold, received: partials.len() });
        }

        let signature = self.scheme.combine_partials(&partials)?;
        if !self.scheme.verify(&block.sign_bytes, &signature) {
            return Err(SignerError::CryptoError {
                operation: "verify_signature".to_string(),
                details: "combined signature failed verification against the validator key".to_string(),
            });
        }

        let record = LastSignedState {
            hrs,
            sign_bytes: block.sign_bytes.clone(),
            signature: signature.clone(),
            timestamp_nanos,
        };
        {
            let mut last = handle.lock().await;
            if let Some(previous) = last.as_ref() {
                match hrs.cmp(&previous.hrs) {
                    Ordering::Greater => {}
                    Ordering::Equal if block.sign_bytes == previous.sign_bytes => {
                        return Ok(SignedOutput {
                            signature: previous.signature.clone(),
                            timestamp_nanos: previous.timestamp_nanos,
                        });
                    }
                    _ => panic!("sign state regression: committing {} over {} on chain {}", hrs, previous.hrs, chain_id),
                }
            }
            // Durable before the signature is released externally.
            self.chain_state.store().persist(chain_id, &record)?;
            *last = Some(record.clone());
        }
        self.leader.share_signed(chain_id, &record).await;

        let prefix_len = signature.len().min(6);
        info!(
            "signed chain_id={} hrs={} participants={} sig={}",
            chain_id,
            hrs,
            participants.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(","),
            hex::encode(&signature[..prefix_len])
        );
        Ok(SignedOutput { signature, timestamp_nanos })
    }

    /// Pulls a cached nonce set, preferring one that matches the fastest
    /// threshold-sized participant set, falling back to any set containing
    /// this cosigner, then to inline generation.
    async fn acquire_nonces(&self) -> Result<CachedNonce> {
        let mut preferred = vec![self.my_cosigner.id()];
        preferred.extend(self.health.fastest(self.threshold.saturating_sub(1)));
        preferred.sort();

        if let Ok(entry) = self.nonce_cache.get_nonces(&preferred) {
            return Ok(entry);
        }
        if let Ok(entry) = self.nonce_cache.get_nonces(&[self.my_cosigner.id()]) {
            return Ok(entry);
        }
        debug!("nonce cache empty; generating a nonce set on demand");
        self.generate_inline(&preferred).await
    }

    /// On-demand synthesis of a single nonce set from exactly the preferred
    /// participants. Every participant must respond, since they are the
    /// whole threshold.
    async fn generate_inline(&self, participants: &[CosignerId]) -> Result<CachedNonce> {
        let uuid = Uuid::new_v4();
        let mut join_set = JoinSet::new();
        for cosigner in self.cosigners.iter().filter(|cosigner| participants.contains(&cosigner.id())) {
            let cosigner = Arc::clone(cosigner);
            let timeout = self.inline_nonce_timeout;
            join_set.spawn(async move {
                let result = tokio::time::timeout(timeout, cosigner.get_nonces(&[uuid])).await;
                (cosigner.id(), result)
            });
        }

        let total = self.cosigners.len();
        let mut per_source: BTreeMap<CosignerId, Vec<Nonce>> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok((id, result)) = joined else {
                continue;
            };
            match result {
                Ok(Ok(mut sets)) if sets.len() == 1 && sets[0].nonces.len() == total => {
                    per_source.insert(id, std::mem::take(&mut sets[0].nonces));
                }
                Ok(Ok(_)) => warn!("cosigner {} returned a malformed inline nonce set", id),
                Ok(Err(err)) => warn!("inline nonce generation failed for cosigner {}: {}", id, err),
                Err(_) => warn!("inline nonce generation timed out for cosigner {}", id),
            }
        }

        if per_source.len() < participants.len() {
            return Err(SignerError::NoNoncesAvailable);
        }
        Ok(CachedNonce { uuid, expiration: Instant::now() + self.inline_nonce_timeout, per_source })
    }
}

#[async_trait]
impl Validator for ThresholdValidator {
    async fn pub_key(&self, _chain_id: &ChainId) -> Result<Vec<u8>> {
        Ok(self.scheme.pub_key())
    }

    async fn sign(&self, chain_id: &ChainId, block: &Block) -> Result<SignedOutput> {
        if self.leader.is_leader() {
            return self.sign_as_leader(chain_id, block).await;
        }
        self.forward_to_leader(chain_id, block).await
    }

    async fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Single-key signing with the same guard and persistence, for validators
/// that accept the risk of an unsharded key.
pub struct SingleSignerValidator {
    signing_key: SigningKey,
    chain_state: ChainStateRegistry,
}

impl SingleSignerValidator {
    pub fn new(signing_key: SigningKey, store: Arc<dyn StateStore>) -> Self {
        Self { signing_key, chain_state: ChainStateRegistry::new(store) }
    }
}

#[async_trait]
impl Validator for SingleSignerValidator {
    async fn pub_key(&self, _chain_id: &ChainId) -> Result<Vec<u8>> {
        Ok(self.signing_key.verifying_key().to_bytes().to_vec())
    }

    async fn sign(&self, chain_id: &ChainId, block: &Block) -> Result<SignedOutput> {
        let hrs = block.hrs();
        let handle = self.chain_state.entry(chain_id).await?;
        let mut last = handle.lock().await;
        match sign_state::check(last.as_ref(), hrs, &block.sign_bytes)? {
            SignCheck::Replay { signature, timestamp_nanos } => return Ok(SignedOutput { signature, timestamp_nanos }),
            SignCheck::Proceed => {}
        }
        let signature = self.signing_key.sign(&block.sign_bytes).to_bytes().to_vec();
        let record = LastSignedState {
            hrs,
            sign_bytes: block.sign_bytes.clone(),
            signature: signature.clone(),
            timestamp_nanos: block.timestamp_nanos,
        };
        self.chain_state.store().persist(chain_id, &record)?;
        *last = Some(record);
        Ok(SignedOutput { signature, timestamp_nanos: block.timestamp_nanos })
    }

    async fn stop(&self) {}
}
