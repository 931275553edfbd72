use crate::foundation::SignerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus step within a round. Wire codes follow the consensus protocol:
/// propose=1, prevote=2, precommit=3.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
}

impl Step {
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Propose => 1,
            Self::Prevote => 2,
            Self::Precommit => 3,
        }
    }

    pub fn from_wire(code: u8) -> Result<Self, SignerError> {
        match code {
            1 => Ok(Self::Propose),
            2 => Ok(Self::Prevote),
            3 => Ok(Self::Precommit),
            other => Err(SignerError::Message(format!("unknown step code: {other}"))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Prevote => "prevote",
            Self::Precommit => "precommit",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point in the consensus protocol. The derived ordering is lexicographic
/// on (height, round, step), which is the total order the double-sign guard
/// relies on.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Hrs {
    pub height: i64,
    pub round: i64,
    pub step: Step,
}

impl fmt::Display for Hrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.height, self.round, self.step)
    }
}

/// One signable consensus message as delivered by the consensus node.
/// `sign_bytes` are canonical and opaque to the signer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: i64,
    pub round: i64,
    pub step: Step,
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
}

impl Block {
    pub fn hrs(&self) -> Hrs {
        Hrs { height: self.height, round: self.round, step: self.step }
    }
}
