use crate::domain::sign_state::LastSignedState;
use crate::foundation::{ChainId, Result, SignerError};
use crate::infrastructure::storage::StateStore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory store for tests and ephemeral setups. Not durable.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<ChainId, LastSignedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, HashMap<ChainId, LastSignedState>>> {
        self.inner
            .lock()
            .map_err(|_| SignerError::StorageError { operation: "lock".to_string(), details: "memory store lock poisoned".to_string() })
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, chain_id: &ChainId) -> Result<Option<LastSignedState>> {
        Ok(self.lock_inner()?.get(chain_id).cloned())
    }

    fn persist(&self, chain_id: &ChainId, state: &LastSignedState) -> Result<()> {
        self.lock_inner()?.insert(chain_id.clone(), state.clone());
        Ok(())
    }
}
