use crate::domain::block::Hrs;
use crate::foundation::{Result, SignerError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Durable per-chain record of the last successful sign. The sequence of
/// committed records for a chain is strictly increasing in HRS.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LastSignedState {
    pub hrs: Hrs,
    pub sign_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub timestamp_nanos: u64,
}

/// Outcome of comparing an incoming request against the last signed record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignCheck {
    Proceed,
    Replay { signature: Vec<u8>, timestamp_nanos: u64 },
}

/// The double-sign decision table:
/// - request below the last signed HRS is rejected (`BeyondBlock`),
/// - an identical repeat at the last HRS replays the stored signature,
/// - different bytes at the last HRS are a conflicting-sign attempt,
/// - anything above the last HRS may proceed.
pub fn check(last: Option<&LastSignedState>, hrs: Hrs, sign_bytes: &[u8]) -> Result<SignCheck> {
    let Some(last) = last else {
        return Ok(SignCheck::Proceed);
    };
    match hrs.cmp(&last.hrs) {
        Ordering::Greater => Ok(SignCheck::Proceed),
        Ordering::Less => Err(SignerError::BeyondBlock {
            message: format!("request {} is older than last signed {}", hrs, last.hrs),
        }),
        Ordering::Equal => {
            if sign_bytes == last.sign_bytes {
                Ok(SignCheck::Replay { signature: last.signature.clone(), timestamp_nanos: last.timestamp_nanos })
            } else {
                Err(SignerError::ConflictingData { message: format!("{} already signed with different sign bytes", hrs) })
            }
        }
    }
}
