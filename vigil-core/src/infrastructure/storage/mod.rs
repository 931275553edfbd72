mod file;
mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use crate::domain::sign_state::LastSignedState;
use crate::foundation::{ChainId, Result};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable per-chain last-signed records. `persist` must not return until
/// the record would survive a crash; the signature is only released to the
/// caller after `persist` succeeds.
pub trait StateStore: Send + Sync {
    fn load(&self, chain_id: &ChainId) -> Result<Option<LastSignedState>>;
    fn persist(&self, chain_id: &ChainId, state: &LastSignedState) -> Result<()>;
}

pub type ChainStateHandle = Arc<Mutex<Option<LastSignedState>>>;

/// Lazily-loaded per-chain state handles over a [`StateStore`]. The handle's
/// mutex is the per-chain lock serializing guard checks and commits.
pub struct ChainStateRegistry {
    store: Arc<dyn StateStore>,
    chains: Mutex<HashMap<ChainId, ChainStateHandle>>,
}

impl ChainStateRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store, chains: Mutex::new(HashMap::new()) }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub async fn entry(&self, chain_id: &ChainId) -> Result<ChainStateHandle> {
        let mut chains = self.chains.lock().await;
        if let Some(handle) = chains.get(chain_id) {
            return Ok(Arc::clone(handle));
        }
        let loaded = self.store.load(chain_id)?;
        if let Some(state) = &loaded {
            info!("loaded sign state chain_id={} hrs={}", chain_id, state.hrs);
        }
        let handle: ChainStateHandle = Arc::new(Mutex::new(loaded));
        chains.insert(chain_id.clone(), Arc::clone(&handle));
        Ok(handle)
    }
}
