use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Chain identifier as supplied by the consensus node (e.g. `cosmoshub-4`).
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for ChainId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl From<String> for ChainId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Cosigner identity, `1..=N`. Stable for the process lifetime.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CosignerId(u8);

impl CosignerId {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for CosignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for CosignerId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<CosignerId> for u8 {
    fn from(value: CosignerId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_serde_is_transparent_string() {
        let id = ChainId::from("test-chain-1");
        let json = serde_json::to_string(&id).expect("serialize json");
        assert_eq!(json, "\"test-chain-1\"");
        let decoded: ChainId = serde_json::from_str(&json).expect("deserialize json");
        assert_eq!(decoded, id);
    }

    #[test]
    fn cosigner_id_orders_numerically() {
        let mut ids = vec![CosignerId::new(3), CosignerId::new(1), CosignerId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![CosignerId::new(1), CosignerId::new(2), CosignerId::new(3)]);
    }
}
