use crate::domain::block::{Hrs, Step};
use crate::domain::sign_state::LastSignedState;
use crate::foundation::{ChainId, Result, SignerError};
use crate::infrastructure::storage::StateStore;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const STATE_SCHEMA_VERSION: u32 = 1;

/// On-disk schema. Stable and versioned; changing it requires a migration
/// path, so wire-incompatible edits must bump `STATE_SCHEMA_VERSION`.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    height: i64,
    round: i64,
    step: u8,
    sign_bytes: String,
    signature: String,
    timestamp_nanos: u64,
}

impl StateFile {
    fn from_state(state: &LastSignedState) -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            height: state.hrs.height,
            round: state.hrs.round,
            step: state.hrs.step.wire_code(),
            sign_bytes: hex::encode(&state.sign_bytes),
            signature: hex::encode(&state.signature),
            timestamp_nanos: state.timestamp_nanos,
        }
    }

    fn into_state(self) -> Result<LastSignedState> {
        let step = Step::from_wire(self.step)?;
        let sign_bytes = hex::decode(&self.sign_bytes)
            .map_err(|err| SignerError::SerializationError { format: "hex".to_string(), details: err.to_string() })?;
        let signature = hex::decode(&self.signature)
            .map_err(|err| SignerError::SerializationError { format: "hex".to_string(), details: err.to_string() })?;
        Ok(LastSignedState {
            hrs: Hrs { height: self.height, round: self.round, step },
            sign_bytes,
            signature,
            timestamp_nanos: self.timestamp_nanos,
        })
    }
}

/// One JSON file per chain under `dir`, written via fsync'd temp file plus
/// atomic rename plus directory sync.
pub struct FileStateStore {
    dir: PathBuf,
    suffix: &'static str,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_suffix(dir, "sign_state")
    }

    /// A distinct suffix keeps validator-level and cosigner-share records in
    /// separate files for the same chain.
    pub fn with_suffix(dir: impl Into<PathBuf>, suffix: &'static str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|err| SignerError::StorageError { operation: "create_state_dir".to_string(), details: err.to_string() })?;
        Ok(Self { dir, suffix })
    }

    fn path_for(&self, chain_id: &ChainId) -> Result<PathBuf> {
        validate_chain_id(chain_id)?;
        Ok(self.dir.join(format!("{}_{}.json", chain_id, self.suffix)))
    }

    fn sync_dir(&self) -> Result<()> {
        // Directory fsync makes the rename itself durable. Not available on
        // every platform; failures other than open are surfaced.
        if let Ok(dir) = File::open(&self.dir) {
            dir.sync_all().map_err(|err| SignerError::StorageError {
                operation: "sync_state_dir".to_string(),
                details: err.to_string(),
            })?;
        }
        Ok(())
    }
}

fn validate_chain_id(chain_id: &ChainId) -> Result<()> {
    let valid = !chain_id.is_empty()
        && chain_id.as_str().chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SignerError::StorageError {
            operation: "state_path".to_string(),
            details: format!("chain id {:?} is not filesystem safe", chain_id.as_str()),
        })
    }
}

impl StateStore for FileStateStore {
    fn load(&self, chain_id: &ChainId) -> Result<Option<LastSignedState>> {
        let path = self.path_for(chain_id)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(SignerError::StorageError { operation: "read_state".to_string(), details: err.to_string() })
            }
        };
        let parsed: StateFile = serde_json::from_str(&raw)
            .map_err(|err| SignerError::SerializationError { format: "json".to_string(), details: err.to_string() })?;
        if parsed.version != STATE_SCHEMA_VERSION {
            return Err(SignerError::StorageError {
                operation: "read_state".to_string(),
                details: format!("state file {} has schema version {}, expected {}", path.display(), parsed.version, STATE_SCHEMA_VERSION),
            });
        }
        Ok(Some(parsed.into_state()?))
    }

    fn persist(&self, chain_id: &ChainId, state: &LastSignedState) -> Result<()> {
        let path = self.path_for(chain_id)?;
        let body = serde_json::to_vec_pretty(&StateFile::from_state(state))
            .map_err(|err| SignerError::SerializationError { format: "json".to_string(), details: err.to_string() })?;
        write_atomic(&path, &body)?;
        self.sync_dir()?;
        debug!("persisted sign state chain_id={} hrs={} path={}", chain_id, state.hrs, path.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SignerError::StorageError { operation: "write_state".to_string(), details: "invalid state path".to_string() })?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    let mut tmp = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)
        .map_err(|err| SignerError::StorageError { operation: "write_state".to_string(), details: err.to_string() })?;
    tmp.write_all(body)
        .and_then(|_| tmp.sync_all())
        .map_err(|err| SignerError::StorageError { operation: "write_state".to_string(), details: err.to_string() })?;
    fs::rename(&tmp_path, path)
        .map_err(|err| SignerError::StorageError { operation: "rename_state".to_string(), details: err.to_string() })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::block::Step;

    fn state(height: i64) -> LastSignedState {
        LastSignedState {
            hrs: Hrs { height, round: 0, step: Step::Precommit },
            sign_bytes: vec![1, 2, 3],
            signature: vec![4; 64],
            timestamp_nanos: 1_700_000_000_000_000_000,
        }
    }

    #[test]
    fn load_of_missing_chain_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStateStore::new(dir.path()).expect("store");
        assert_eq!(store.load(&ChainId::from("test-chain")).expect("load"), None);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStateStore::new(dir.path()).expect("store");
        let chain = ChainId::from("test-chain");

        let first = state(10);
        store.persist(&chain, &first).expect("persist");
        assert_eq!(store.load(&chain).expect("load"), Some(first));

        let second = state(11);
        store.persist(&chain, &second).expect("persist");
        assert_eq!(store.load(&chain).expect("load"), Some(second));
    }

    #[test]
    fn suffixes_keep_separate_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let validator = FileStateStore::new(dir.path()).expect("store");
        let share = FileStateStore::with_suffix(dir.path(), "share_state").expect("store");
        let chain = ChainId::from("test-chain");

        validator.persist(&chain, &state(10)).expect("persist");
        assert_eq!(share.load(&chain).expect("load"), None);
    }

    #[test]
    fn unsupported_schema_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStateStore::new(dir.path()).expect("store");
        let chain = ChainId::from("test-chain");
        let path = dir.path().join("test-chain_sign_state.json");
        fs::write(&path, r#"{"version":99,"height":1,"round":0,"step":3,"sign_bytes":"","signature":"","timestamp_nanos":0}"#)
            .expect("write");

        let err = store.load(&chain).unwrap_err();
        assert!(matches!(err, SignerError::StorageError { .. }), "got {err:?}");
    }

    #[test]
    fn hostile_chain_id_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStateStore::new(dir.path()).expect("store");
        let err = store.load(&ChainId::from("../escape")).unwrap_err();
        assert!(matches!(err, SignerError::StorageError { .. }));
    }
}
