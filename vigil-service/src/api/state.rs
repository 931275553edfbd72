use crate::service::metrics::Metrics;
use std::sync::Arc;
use vigil_core::application::{NodeService, Validator};

pub struct ApiState {
    pub validator: Arc<dyn Validator>,
    /// Peer-facing cosigner surface; absent in single-signer mode.
    pub node: Option<Arc<NodeService>>,
    pub metrics: Arc<Metrics>,
}
