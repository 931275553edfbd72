use crate::domain::sign_state::LastSignedState;
use crate::foundation::{ChainId, CosignerId, Result};
use async_trait::async_trait;
use log::{debug, trace};
use std::sync::atomic::{AtomicU8, Ordering};

/// Single-leader election over the cosigner set. The core assumes at most
/// one leader at a time and eventual convergence within a bounded election
/// timeout; the election algorithm itself is pluggable behind this trait.
#[async_trait]
pub trait Leader: Send + Sync {
    fn is_leader(&self) -> bool;

    fn leader_id(&self) -> Option<CosignerId>;

    /// Replicates a committed last-signed record so a successor leader
    /// starts at or above it. Best-effort.
    async fn share_signed(&self, chain_id: &ChainId, state: &LastSignedState);

    async fn transfer_leadership(&self, target: CosignerId) -> Result<Option<CosignerId>>;
}

/// Statically configured leader for fixed deployments and tests. An election
/// backend carries its own replication, so `share_signed` has nothing to do
/// here.
pub struct FixedLeader {
    self_id: CosignerId,
    leader: AtomicU8,
}

impl FixedLeader {
    pub fn new(self_id: CosignerId, leader_id: CosignerId) -> Self {
        Self { self_id, leader: AtomicU8::new(leader_id.value()) }
    }
}

#[async_trait]
impl Leader for FixedLeader {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Relaxed) == self.self_id.value()
    }

    fn leader_id(&self) -> Option<CosignerId> {
        Some(CosignerId::new(self.leader.load(Ordering::Relaxed)))
    }

    async fn share_signed(&self, chain_id: &ChainId, state: &LastSignedState) {
        trace!("share_signed chain_id={} hrs={}", chain_id, state.hrs);
    }

    async fn transfer_leadership(&self, target: CosignerId) -> Result<Option<CosignerId>> {
        debug!("leadership transferred to cosigner {}", target);
        self.leader.store(target.value(), Ordering::Relaxed);
        Ok(Some(target))
    }
}
