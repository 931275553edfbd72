use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;
use vigil_core::domain::{Block, Step};
use vigil_core::foundation::{ChainId, SignerError};

fn metrics_err(err: impl std::fmt::Display) -> SignerError {
    SignerError::Message(err.to_string())
}

pub struct Metrics {
    registry: Registry,
    signed_total: IntCounterVec,
    missed_total: IntCounterVec,
    missed_in_a_row: IntGaugeVec,
    last_signed_height: IntGaugeVec,
    last_signed_round: IntGaugeVec,
    beyond_block_errors_total: IntCounterVec,
    failed_signs_total: IntCounterVec,
    pub_key_requests_total: IntCounterVec,
    nonce_cache_size: IntGauge,
    nonce_demand_rate: Gauge,
    // previous prevote/precommit heights per chain, for missed-step deltas
    previous_heights: Mutex<HashMap<(String, &'static str), i64>>,
}

impl Metrics {
    pub fn new() -> Result<Self, SignerError> {
        let registry = Registry::new();
        let signed_total =
            IntCounterVec::new(prometheus::Opts::new("vigil_signed_total", "Blocks signed by chain and step"), &["chain_id", "type"])
                .map_err(metrics_err)?;
        let missed_total = IntCounterVec::new(
            prometheus::Opts::new("vigil_missed_total", "Consensus steps missed by chain and step"),
            &["chain_id", "type"],
        )
        .map_err(metrics_err)?;
        let missed_in_a_row = IntGaugeVec::new(
            prometheus::Opts::new("vigil_missed_in_a_row", "Consecutive missed steps by chain and step"),
            &["chain_id", "type"],
        )
        .map_err(metrics_err)?;
        let last_signed_height = IntGaugeVec::new(
            prometheus::Opts::new("vigil_last_signed_height", "Last signed height by chain and step"),
            &["chain_id", "type"],
        )
        .map_err(metrics_err)?;
        let last_signed_round = IntGaugeVec::new(
            prometheus::Opts::new("vigil_last_signed_round", "Last signed round by chain and step"),
            &["chain_id", "type"],
        )
        .map_err(metrics_err)?;
        let beyond_block_errors_total = IntCounterVec::new(
            prometheus::Opts::new("vigil_beyond_block_errors_total", "Sign requests already past the last signed block"),
            &["chain_id"],
        )
        .map_err(metrics_err)?;
        let failed_signs_total =
            IntCounterVec::new(prometheus::Opts::new("vigil_failed_signs_total", "Failed sign requests"), &["chain_id"])
                .map_err(metrics_err)?;
        let pub_key_requests_total =
            IntCounterVec::new(prometheus::Opts::new("vigil_pub_key_requests_total", "PubKey requests"), &["chain_id"])
                .map_err(metrics_err)?;
        let nonce_cache_size =
            IntGauge::new("vigil_nonce_cache_size", "Pre-computed nonce sets currently cached").map_err(metrics_err)?;
        let nonce_demand_rate =
            Gauge::new("vigil_nonce_demand_rate", "Estimated nonce consumption rate per second").map_err(metrics_err)?;

        registry.register(Box::new(signed_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(missed_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(missed_in_a_row.clone())).map_err(metrics_err)?;
        registry.register(Box::new(last_signed_height.clone())).map_err(metrics_err)?;
        registry.register(Box::new(last_signed_round.clone())).map_err(metrics_err)?;
        registry.register(Box::new(beyond_block_errors_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(failed_signs_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(pub_key_requests_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(nonce_cache_size.clone())).map_err(metrics_err)?;
        registry.register(Box::new(nonce_demand_rate.clone())).map_err(metrics_err)?;

        Ok(Self {
            registry,
            signed_total,
            missed_total,
            missed_in_a_row,
            last_signed_height,
            last_signed_round,
            beyond_block_errors_total,
            failed_signs_total,
            pub_key_requests_total,
            nonce_cache_size,
            nonce_demand_rate,
            previous_heights: Mutex::new(HashMap::new()),
        })
    }

    pub fn inc_pub_key_request(&self, chain_id: &ChainId) {
        self.pub_key_requests_total.with_label_values(&[chain_id.as_str()]).inc();
    }

    pub fn inc_beyond_block(&self, chain_id: &ChainId) {
        self.beyond_block_errors_total.with_label_values(&[chain_id.as_str()]).inc();
    }

    pub fn inc_failed_sign(&self, chain_id: &ChainId) {
        self.failed_signs_total.with_label_values(&[chain_id.as_str()]).inc();
    }

    /// Updates the per-step gauges and counters for a successful sign,
    /// including the missed-step deltas for votes.
    pub fn track_signed(&self, chain_id: &ChainId, block: &Block) {
        let step = block.step.as_str();
        self.last_signed_height.with_label_values(&[chain_id.as_str(), step]).set(block.height);
        self.last_signed_round.with_label_values(&[chain_id.as_str(), step]).set(block.round);
        self.signed_total.with_label_values(&[chain_id.as_str(), step]).inc();

        if block.step == Step::Propose {
            return;
        }
        let mut previous_heights = self.previous_heights.lock().unwrap_or_else(|e| e.into_inner());
        let key = (chain_id.to_string(), step);
        let previous = previous_heights.insert(key, block.height).unwrap_or(0);
        let step_size = block.height - previous;
        if previous != 0 && step_size > 1 {
            self.missed_total.with_label_values(&[chain_id.as_str(), step]).inc_by(step_size as u64);
            self.missed_in_a_row.with_label_values(&[chain_id.as_str(), step]).add(step_size);
        } else {
            self.missed_in_a_row.with_label_values(&[chain_id.as_str(), step]).set(0);
        }
    }

    pub fn set_nonce_cache_size(&self, size: usize) {
        self.nonce_cache_size.set(size as i64);
    }

    pub fn set_nonce_demand_rate(&self, rate: f64) {
        self.nonce_demand_rate.set(rate);
    }

    pub fn encode(&self) -> Result<String, SignerError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer).map_err(metrics_err)?;
        String::from_utf8(buffer).map_err(metrics_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: i64, step: Step) -> Block {
        Block { height, round: 0, step, sign_bytes: vec![1], timestamp_nanos: 0 }
    }

    #[test]
    fn missed_votes_are_counted_from_height_gaps() {
        let metrics = Metrics::new().expect("metrics");
        let chain = ChainId::from("test-chain-1");

        metrics.track_signed(&chain, &block(10, Step::Precommit));
        metrics.track_signed(&chain, &block(11, Step::Precommit));
        metrics.track_signed(&chain, &block(14, Step::Precommit));

        let text = metrics.encode().expect("encode");
        assert!(text.contains("vigil_signed_total{chain_id=\"test-chain-1\",type=\"precommit\"} 3"), "{text}");
        assert!(text.contains("vigil_missed_total{chain_id=\"test-chain-1\",type=\"precommit\"} 3"), "{text}");
    }

    #[test]
    fn proposals_do_not_track_missed_steps() {
        let metrics = Metrics::new().expect("metrics");
        let chain = ChainId::from("test-chain-1");

        metrics.track_signed(&chain, &block(10, Step::Propose));
        metrics.track_signed(&chain, &block(20, Step::Propose));

        let text = metrics.encode().expect("encode");
        assert!(text.contains("vigil_signed_total{chain_id=\"test-chain-1\",type=\"propose\"} 2"), "{text}");
        assert!(!text.contains("vigil_missed_total"), "{text}");
    }
}
