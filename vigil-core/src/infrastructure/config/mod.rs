//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Environment variables (VIGIL_* prefix)

use crate::foundation::{CosignerId, Result, SignerError};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:2222";
const DEFAULT_STATE_DIR: &str = "state";
const DEFAULT_KEY_FILE: &str = "vigil-keys.json";
const DEFAULT_RPC_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_ELECTION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_GET_NONCES_INTERVAL_MS: u64 = 3_000;
const DEFAULT_GET_NONCES_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_NONCE_EXPIRATION_MS: u64 = 10_000;
const DEFAULT_SAFETY_FACTOR: f64 = 1.2;
const DEFAULT_TARGET_MIN: usize = 50;
const DEFAULT_TARGET_MAX: usize = 5_000;

/// Environment variable prefix for config overrides.
///
/// Example: `VIGIL_SERVICE__LISTEN_ADDR` -> `service.listen_addr`
const ENV_PREFIX: &str = "VIGIL_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    #[default]
    Threshold,
    Single,
}

impl FromStr for SignMode {
    type Err = SignerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "threshold" => Ok(Self::Threshold),
            "single" => Ok(Self::Single),
            other => Err(SignerError::ConfigError(format!("unknown sign mode: {other}"))),
        }
    }
}

impl std::fmt::Display for SignMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold => write!(f, "threshold"),
            Self::Single => write!(f, "single"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address for the signer and cosigner HTTP API.
    #[serde(default)]
    pub listen_addr: String,
    /// Directory holding the per-chain sign-state files.
    #[serde(default)]
    pub state_dir: String,
    /// Path to the key file (identity seed, scheme material, peer pubkeys).
    #[serde(default)]
    pub key_file: String,
    /// Optional directory for log files; console-only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            state_dir: DEFAULT_STATE_DIR.to_string(),
            key_file: DEFAULT_KEY_FILE.to_string(),
            log_dir: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub sign_mode: SignMode,
    /// This process's cosigner identity.
    #[serde(default)]
    pub cosigner_id: u8,
    /// Partial signatures required to assemble a full signature.
    #[serde(default)]
    pub threshold: usize,
    /// Statically configured leader. A real election backend overrides this
    /// at runtime through the leader adapter.
    #[serde(default)]
    pub leader_id: u8,
    /// Per-call deadline for partial-sign fan-out RPCs.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// How long a non-leader waits for leader convergence before attempting
    /// a local round.
    #[serde(default = "default_election_timeout_ms")]
    pub election_timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_election_timeout_ms() -> u64 {
    DEFAULT_ELECTION_TIMEOUT_MS
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            sign_mode: SignMode::Threshold,
            cosigner_id: 0,
            threshold: 0,
            leader_id: 0,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            election_timeout_ms: DEFAULT_ELECTION_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceConfig {
    /// Reconcile tick for the nonce cache.
    #[serde(default = "default_get_nonces_interval_ms")]
    pub get_nonces_interval_ms: u64,
    /// Per-peer RPC deadline during replenishment.
    #[serde(default = "default_get_nonces_timeout_ms")]
    pub get_nonces_timeout_ms: u64,
    /// TTL of cached nonces.
    #[serde(default = "default_nonce_expiration_ms")]
    pub nonce_expiration_ms: u64,
    /// Headroom multiplier on the demand estimate.
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
    #[serde(default = "default_target_min")]
    pub target_min: usize,
    #[serde(default = "default_target_max")]
    pub target_max: usize,
}

fn default_get_nonces_interval_ms() -> u64 {
    DEFAULT_GET_NONCES_INTERVAL_MS
}

fn default_get_nonces_timeout_ms() -> u64 {
    DEFAULT_GET_NONCES_TIMEOUT_MS
}

fn default_nonce_expiration_ms() -> u64 {
    DEFAULT_NONCE_EXPIRATION_MS
}

fn default_safety_factor() -> f64 {
    DEFAULT_SAFETY_FACTOR
}

fn default_target_min() -> usize {
    DEFAULT_TARGET_MIN
}

fn default_target_max() -> usize {
    DEFAULT_TARGET_MAX
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            get_nonces_interval_ms: DEFAULT_GET_NONCES_INTERVAL_MS,
            get_nonces_timeout_ms: DEFAULT_GET_NONCES_TIMEOUT_MS,
            nonce_expiration_ms: DEFAULT_NONCE_EXPIRATION_MS,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            target_min: DEFAULT_TARGET_MIN,
            target_max: DEFAULT_TARGET_MAX,
        }
    }
}

/// One peer in the cosigner set, this process included.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CosignerPeerConfig {
    pub id: u8,
    pub address: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub nonce: NonceConfig,
    #[serde(default)]
    pub cosigners: Vec<CosignerPeerConfig>,
}

impl AppConfig {
    pub fn total_cosigners(&self) -> u8 {
        self.cosigners.len() as u8
    }

    pub fn self_id(&self) -> CosignerId {
        CosignerId::new(self.signer.cosigner_id)
    }

    pub fn leader_id(&self) -> CosignerId {
        CosignerId::new(self.signer.leader_id)
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let figment = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config: AppConfig = figment.extract().map_err(|err| SignerError::ConfigError(err.to_string()))?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &AppConfig) -> Result<()> {
    if config.service.listen_addr.trim().is_empty() {
        return Err(SignerError::ConfigError("service.listen_addr must be set".to_string()));
    }
    if config.signer.sign_mode == SignMode::Single {
        return Ok(());
    }

    let n = config.cosigners.len();
    if n < 2 {
        return Err(SignerError::ConfigError("threshold mode requires at least 2 cosigners".to_string()));
    }
    let ids: BTreeSet<u8> = config.cosigners.iter().map(|c| c.id).collect();
    let expected: BTreeSet<u8> = (1..=n as u8).collect();
    if ids != expected {
        return Err(SignerError::ConfigError(format!("cosigner ids must be exactly 1..={n}")));
    }
    if config.signer.threshold < 2 || config.signer.threshold > n {
        return Err(SignerError::ConfigError(format!(
            "threshold {} out of range 2..={n}",
            config.signer.threshold
        )));
    }
    if !ids.contains(&config.signer.cosigner_id) {
        return Err(SignerError::ConfigError(format!("cosigner_id {} is not in the cosigner set", config.signer.cosigner_id)));
    }
    if !ids.contains(&config.signer.leader_id) {
        return Err(SignerError::ConfigError(format!("leader_id {} is not in the cosigner set", config.signer.leader_id)));
    }
    if config.nonce.safety_factor < 1.0 {
        return Err(SignerError::ConfigError("nonce.safety_factor must be >= 1.0".to_string()));
    }
    if config.nonce.target_min > config.nonce.target_max {
        return Err(SignerError::ConfigError("nonce.target_min must not exceed nonce.target_max".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [service]
        listen_addr = "127.0.0.1:4455"
        state_dir = "/tmp/vigil-state"

        [signer]
        sign_mode = "threshold"
        cosigner_id = 1
        threshold = 2
        leader_id = 1

        [nonce]
        get_nonces_interval_ms = 500

        [[cosigners]]
        id = 1
        address = "http://127.0.0.1:4455"

        [[cosigners]]
        id = 2
        address = "http://127.0.0.1:4456"

        [[cosigners]]
        id = 3
        address = "http://127.0.0.1:4457"
    "#;

    fn parse(toml: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|err| SignerError::ConfigError(err.to_string()))?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn sample_config_parses_with_defaults() {
        let config = parse(SAMPLE).expect("config");
        assert_eq!(config.service.listen_addr, "127.0.0.1:4455");
        assert_eq!(config.signer.threshold, 2);
        assert_eq!(config.nonce.get_nonces_interval_ms, 500);
        assert_eq!(config.nonce.get_nonces_timeout_ms, DEFAULT_GET_NONCES_TIMEOUT_MS);
        assert_eq!(config.nonce.target_min, DEFAULT_TARGET_MIN);
        assert_eq!(config.total_cosigners(), 3);
    }

    #[test]
    fn gapped_cosigner_ids_are_rejected() {
        let broken = SAMPLE.replace("id = 3", "id = 5");
        let err = parse(&broken).unwrap_err();
        assert!(matches!(err, SignerError::ConfigError(_)));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let broken = SAMPLE.replace("threshold = 2", "threshold = 4");
        assert!(parse(&broken).is_err());
        let broken = SAMPLE.replace("threshold = 2", "threshold = 1");
        assert!(parse(&broken).is_err());
    }

    #[test]
    fn single_mode_skips_cosigner_validation() {
        let single = r#"
            [signer]
            sign_mode = "single"
        "#;
        let config = parse(single).expect("config");
        assert_eq!(config.signer.sign_mode, SignMode::Single);
    }
}
