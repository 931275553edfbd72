pub mod cosigner;
pub mod health;
pub mod leader;
pub mod node;
pub mod nonce_cache;
pub mod validator;

pub use cosigner::{Cosigner, LocalCosigner, RemoteCosigner};
pub use health::CosignerHealth;
pub use leader::{FixedLeader, Leader};
pub use node::NodeService;
pub use nonce_cache::{CosignerNonceCache, NonceCacheConfig, NoncePruner};
pub use validator::{SignedOutput, SingleSignerValidator, ThresholdValidator, Validator};
