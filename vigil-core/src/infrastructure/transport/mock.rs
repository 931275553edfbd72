use crate::foundation::{CosignerId, Result, SignerError};
use crate::infrastructure::transport::{
    GetNoncesRequest, GetNoncesResponse, PeerClient, PeerService, SetNoncesAndSignRequest, SetNoncesAndSignResponse,
    SignBlockRequest, SignBlockResponse, TransferLeadershipRequest, TransferLeadershipResponse,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process peer client routing straight to a [`PeerService`], with
/// injectable offline state and latency for partition and timeout tests.
pub struct MockPeerClient {
    peer_id: CosignerId,
    target: Arc<dyn PeerService>,
    offline: AtomicBool,
    latency: Mutex<Duration>,
}

impl MockPeerClient {
    pub fn new(peer_id: CosignerId, target: Arc<dyn PeerService>) -> Self {
        Self { peer_id, target, offline: AtomicBool::new(false), latency: Mutex::new(Duration::ZERO) }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    async fn preflight(&self, operation: &str) -> Result<()> {
        let latency = self.latency.lock().map(|guard| *guard).unwrap_or(Duration::ZERO);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::Relaxed) {
            return Err(SignerError::TransportError {
                operation: operation.to_string(),
                details: format!("cosigner {} unreachable", self.peer_id),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PeerClient for MockPeerClient {
    async fn get_nonces(&self, request: GetNoncesRequest) -> Result<GetNoncesResponse> {
        self.preflight("get_nonces").await?;
        self.target.get_nonces(request).await
    }

    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse> {
        self.preflight("set_nonces_and_sign").await?;
        self.target.set_nonces_and_sign(request).await
    }

    async fn sign_block(&self, request: SignBlockRequest) -> Result<SignBlockResponse> {
        self.preflight("sign_block").await?;
        self.target.sign_block(request).await
    }

    async fn transfer_leadership(&self, request: TransferLeadershipRequest) -> Result<TransferLeadershipResponse> {
        self.preflight("transfer_leadership").await?;
        self.target.transfer_leadership(request).await
    }

    async fn get_leader(&self) -> Result<Option<CosignerId>> {
        self.preflight("get_leader").await?;
        self.target.get_leader().await
    }

    async fn ping(&self) -> Result<()> {
        self.preflight("ping").await
    }
}
