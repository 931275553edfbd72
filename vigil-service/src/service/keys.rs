//! Minimal versioned key file: this cosigner's identity seed, the signing
//! key material for the software scheme, and peer identity public keys.
//! Share dealing and hardware-backed formats live outside this repo.

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use vigil_core::foundation::{CosignerId, Result, SignerError};

const KEY_FILE_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerKey {
    pub id: u8,
    /// Hex-encoded ed25519 public key used to verify this peer's nonce
    /// shares.
    pub identity_pub_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyFile {
    pub version: u32,
    pub cosigner_id: u8,
    /// Hex-encoded 32-byte ed25519 seed for this cosigner's identity key.
    pub identity_seed: String,
    /// Hex-encoded 32-byte seed for the signing scheme.
    pub scheme_seed: String,
    pub peers: Vec<PeerKey>,
}

impl KeyFile {
    pub fn identity_key(&self) -> Result<SigningKey> {
        Ok(SigningKey::from_bytes(&decode_seed("identity_seed", &self.identity_seed)?))
    }

    pub fn scheme_seed_bytes(&self) -> Result<[u8; 32]> {
        decode_seed("scheme_seed", &self.scheme_seed)
    }

    pub fn peer_identities(&self) -> Result<HashMap<CosignerId, VerifyingKey>> {
        let mut identities = HashMap::new();
        for peer in &self.peers {
            let bytes = decode_seed(&format!("peer {} identity_pub_key", peer.id), &peer.identity_pub_key)?;
            let key = VerifyingKey::from_bytes(&bytes).map_err(|err| SignerError::CryptoError {
                operation: "load_peer_identity".to_string(),
                details: format!("cosigner {}: {}", peer.id, err),
            })?;
            identities.insert(CosignerId::new(peer.id), key);
        }
        Ok(identities)
    }
}

fn decode_seed(field: &str, raw: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(raw.trim())
        .map_err(|err| SignerError::ConfigError(format!("key file field {field} is not valid hex: {err}")))?;
    bytes
        .try_into()
        .map_err(|_| SignerError::ConfigError(format!("key file field {field} must be exactly 32 bytes")))
}

pub fn load_key_file(path: &Path) -> Result<KeyFile> {
    check_permissions(path)?;
    let raw = fs::read_to_string(path)
        .map_err(|err| SignerError::ConfigError(format!("cannot read key file {}: {}", path.display(), err)))?;
    let parsed: KeyFile = serde_json::from_str(&raw)
        .map_err(|err| SignerError::SerializationError { format: "json".to_string(), details: err.to_string() })?;
    if parsed.version != KEY_FILE_VERSION {
        return Err(SignerError::ConfigError(format!(
            "key file {} has version {}, expected {}",
            path.display(),
            parsed.version,
            KEY_FILE_VERSION
        )));
    }
    Ok(parsed)
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path)
        .map_err(|err| SignerError::ConfigError(format!("cannot stat key file {}: {}", path.display(), err)))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(SignerError::ConfigError(format!(
            "key file {} has mode {:o}, expected 0600",
            path.display(),
            mode
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
