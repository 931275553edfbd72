pub mod keys;
pub mod metrics;

use crate::api::state::ApiState;
use crate::service::keys::load_key_file;
use crate::service::metrics::Metrics;
use crate::transport::HttpPeerClient;
use log::{info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::application::{
    Cosigner, CosignerNonceCache, FixedLeader, LocalCosigner, NodeService, NonceCacheConfig, RemoteCosigner,
    SingleSignerValidator, ThresholdValidator, Validator,
};
use vigil_core::domain::SoftShareScheme;
use vigil_core::foundation::{CosignerId, Result, SignerError};
use vigil_core::infrastructure::config::{AppConfig, SignMode};
use vigil_core::infrastructure::storage::FileStateStore;
use vigil_core::infrastructure::transport::PeerClient;

const METRICS_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Builds the signer from config and serves the HTTP API until the process
/// is stopped.
pub async fn run(config: AppConfig) -> Result<()> {
    let addr: SocketAddr = config
        .service
        .listen_addr
        .parse()
        .map_err(|err| SignerError::ConfigError(format!("invalid listen_addr {}: {}", config.service.listen_addr, err)))?;
    let state = build(&config)?;
    crate::api::run_server(addr, state).await
}

pub fn build(config: &AppConfig) -> Result<Arc<ApiState>> {
    let metrics = Arc::new(Metrics::new()?);
    match config.signer.sign_mode {
        SignMode::Threshold => build_threshold(config, metrics),
        SignMode::Single => build_single(config, metrics),
    }
}

fn build_single(config: &AppConfig, metrics: Arc<Metrics>) -> Result<Arc<ApiState>> {
    warn!("single-signer mode: the validator key is not sharded");
    let keys = load_key_file(Path::new(&config.service.key_file))?;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&keys.scheme_seed_bytes()?);
    let store = Arc::new(FileStateStore::new(&config.service.state_dir)?);
    let validator = Arc::new(SingleSignerValidator::new(signing_key, store));
    Ok(Arc::new(ApiState { validator, node: None, metrics }))
}

fn build_threshold(config: &AppConfig, metrics: Arc<Metrics>) -> Result<Arc<ApiState>> {
    let keys = load_key_file(Path::new(&config.service.key_file))?;
    if keys.cosigner_id != config.signer.cosigner_id {
        return Err(SignerError::ConfigError(format!(
            "key file is for cosigner {}, config says {}",
            keys.cosigner_id, config.signer.cosigner_id
        )));
    }

    let self_id = config.self_id();
    let total = config.total_cosigners();
    let threshold = config.signer.threshold;
    let nonce_expiration = Duration::from_millis(config.nonce.nonce_expiration_ms);

    let scheme = Arc::new(SoftShareScheme::new(keys.scheme_seed_bytes()?, threshold));
    let share_store = Arc::new(FileStateStore::with_suffix(&config.service.state_dir, "share_state")?);
    let identity = keys.identity_key()?;
    let mut peer_identities = keys.peer_identities()?;
    // a cosigner also verifies its own shares when it participates
    peer_identities.insert(self_id, identity.verifying_key());
    let local = Arc::new(LocalCosigner::new(
        self_id,
        total,
        threshold,
        scheme.clone(),
        identity,
        peer_identities,
        // keep secrets around a little past the cache TTL for in-flight rounds
        nonce_expiration * 2,
        share_store,
    ));

    let mut peers = Vec::new();
    let mut peer_addresses = HashMap::new();
    for peer in config.cosigners.iter().filter(|peer| peer.id != config.signer.cosigner_id) {
        let client: Arc<dyn PeerClient> = Arc::new(HttpPeerClient::new(peer.address.clone())?);
        peer_addresses.insert(CosignerId::new(peer.id), peer.address.clone());
        peers.push(Arc::new(RemoteCosigner::new(
            CosignerId::new(peer.id),
            peer.address.clone(),
            client,
            Duration::from_millis(config.signer.rpc_timeout_ms),
        )));
    }

    let leader = Arc::new(FixedLeader::new(self_id, config.leader_id()));
    let mut members: Vec<Arc<dyn Cosigner>> = vec![Arc::clone(&local) as Arc<dyn Cosigner>];
    members.extend(peers.iter().map(|peer| Arc::clone(peer) as Arc<dyn Cosigner>));
    let nonce_cache = CosignerNonceCache::new(
        NonceCacheConfig::from_settings(&config.nonce, threshold),
        members,
        leader.clone(),
        None,
    );

    let store = Arc::new(FileStateStore::new(&config.service.state_dir)?);
    let validator = Arc::new(ThresholdValidator::new(
        Arc::clone(&local),
        peers,
        threshold,
        scheme,
        leader.clone(),
        Arc::clone(&nonce_cache),
        store,
        Duration::from_millis(config.nonce.get_nonces_timeout_ms),
        Duration::from_millis(config.signer.election_timeout_ms),
    ));

    info!(
        "threshold signer ready cosigner_id={} threshold={} cosigners={} leader_id={} state_dir={}",
        self_id,
        threshold,
        total,
        config.signer.leader_id,
        config.service.state_dir
    );

    tokio::spawn(Arc::clone(&nonce_cache).run(validator.subscribe_shutdown()));
    spawn_sampler(Arc::clone(&nonce_cache), Arc::clone(&local), Arc::clone(&metrics), validator.subscribe_shutdown());

    let node = Arc::new(NodeService::new(local, Arc::clone(&validator) as Arc<dyn Validator>, leader, peer_addresses));
    Ok(Arc::new(ApiState { validator, node: Some(node), metrics }))
}

fn spawn_sampler(
    nonce_cache: Arc<CosignerNonceCache>,
    local: Arc<LocalCosigner>,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_SAMPLE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    metrics.set_nonce_cache_size(nonce_cache.size());
                    metrics.set_nonce_demand_rate(nonce_cache.demand_rate());
                    local.prune_stale_nonces();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
