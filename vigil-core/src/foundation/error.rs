use std::io;
use thiserror::Error;

/// Compact error classification, used for metric labels and for matching on
/// an error kind without destructuring the full variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BeyondBlock,
    ConflictingData,
    ThresholdNotMet,
    NoNoncesAvailable,
    PeerFault,
    NotLeader,
    StorageError,
    SerializationError,
    CryptoError,
    TransportError,
    ConfigError,
    InvalidStateTransition,
    Timeout,
    Message,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeyondBlock => "beyond_block",
            Self::ConflictingData => "conflicting_data",
            Self::ThresholdNotMet => "threshold_not_met",
            Self::NoNoncesAvailable => "no_nonces_available",
            Self::PeerFault => "peer_fault",
            Self::NotLeader => "not_leader",
            Self::StorageError => "storage_error",
            Self::SerializationError => "serialization_error",
            Self::CryptoError => "crypto_error",
            Self::TransportError => "transport_error",
            Self::ConfigError => "config_error",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::Timeout => "timeout",
            Self::Message => "message",
        }
    }
}

/// All variants are cheaply cloneable so a sign outcome can be broadcast to
/// every waiter deduplicated onto the same in-flight round.
#[derive(Debug, Clone, Error)]
pub enum SignerError {
    #[error("already signed beyond this block: {message}")]
    BeyondBlock { message: String },

    #[error("conflicting sign bytes at the last signed height/round/step: {message}")]
    ConflictingData { message: String },

    #[error("threshold not met: required {required}, received {received}")]
    ThresholdNotMet { required: usize, received: usize },

    #[error("no nonces available")]
    NoNoncesAvailable,

    #[error("peer fault from cosigner {cosigner_id}: {details}")]
    PeerFault { cosigner_id: u8, details: String },

    #[error("not the leader (current leader: {leader_id:?})")]
    NotLeader { leader_id: Option<u8> },

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("transport error during {operation}: {details}")]
    TransportError { operation: String, details: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("timed out during {operation}")]
    Timeout { operation: String },

    #[error("{0}")]
    Message(String),
}

impl SignerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BeyondBlock { .. } => ErrorCode::BeyondBlock,
            Self::ConflictingData { .. } => ErrorCode::ConflictingData,
            Self::ThresholdNotMet { .. } => ErrorCode::ThresholdNotMet,
            Self::NoNoncesAvailable => ErrorCode::NoNoncesAvailable,
            Self::PeerFault { .. } => ErrorCode::PeerFault,
            Self::NotLeader { .. } => ErrorCode::NotLeader,
            Self::StorageError { .. } => ErrorCode::StorageError,
            Self::SerializationError { .. } => ErrorCode::SerializationError,
            Self::CryptoError { .. } => ErrorCode::CryptoError,
            Self::TransportError { .. } => ErrorCode::TransportError,
            Self::ConfigError(_) => ErrorCode::ConfigError,
            Self::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Message(_) => ErrorCode::Message,
        }
    }

    /// Retryable errors leave no committed state behind; the caller may
    /// resubmit the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ThresholdNotMet { .. } | Self::NoNoncesAvailable | Self::Timeout { .. } | Self::TransportError { .. }
        )
    }
}

impl From<io::Error> for SignerError {
    fn from(err: io::Error) -> Self {
        Self::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, SignerError>;
