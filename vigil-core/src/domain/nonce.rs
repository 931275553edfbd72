use crate::foundation::CosignerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

/// One nonce contribution from cosigner `source_id` intended for cosigner
/// `destination_id`. `signature` authenticates the share to the destination
/// under the source's identity key; the destination must verify it before
/// use.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Nonce {
    pub source_id: CosignerId,
    pub destination_id: CosignerId,
    pub pub_key: Vec<u8>,
    pub share: Vec<u8>,
    pub signature: Vec<u8>,
}

/// All nonce shares a single cosigner produced for one signing opportunity,
/// keyed by the opportunity uuid.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UuidNonces {
    pub uuid: Uuid,
    pub nonces: Vec<Nonce>,
}

/// A complete pre-computed nonce set for one signing opportunity: for each
/// participating source cosigner, its shares for every destination. Unusable
/// below the threshold number of sources.
#[derive(Clone, Debug)]
pub struct CachedNonce {
    pub uuid: Uuid,
    pub expiration: Instant,
    pub per_source: BTreeMap<CosignerId, Vec<Nonce>>,
}

impl CachedNonce {
    pub fn sources(&self) -> impl Iterator<Item = CosignerId> + '_ {
        self.per_source.keys().copied()
    }

    pub fn has_sources(&self, participants: &[CosignerId]) -> bool {
        participants.iter().all(|id| self.per_source.contains_key(id))
    }

    /// Shares destined for `destination`, restricted to participating
    /// sources. This is the payload of one `set_nonces_and_sign` call.
    pub fn nonces_for(&self, destination: CosignerId, participants: &[CosignerId]) -> Vec<Nonce> {
        participants
            .iter()
            .filter_map(|source| self.per_source.get(source))
            .flat_map(|nonces| nonces.iter().filter(|n| n.destination_id == destination).cloned())
            .collect()
    }
}

/// Ordered pre-computed nonce pool. Entries share a TTL at creation, so
/// insertion order is expiration order and pruning scans from the front.
#[derive(Debug, Default)]
pub struct NonceCache {
    entries: VecDeque<CachedNonce>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CachedNonce) {
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns the oldest entry covering all `participants`.
    /// Oldest-first consumption minimizes pre-computation lost to expiry.
    pub fn take_matching(&mut self, participants: &[CosignerId]) -> Option<CachedNonce> {
        let index = self.entries.iter().position(|entry| entry.has_sources(participants))?;
        self.entries.remove(index)
    }

    /// Removes cosigner `id` from every entry and drops entries whose
    /// remaining source count falls below `threshold`. Returns the number of
    /// dropped entries.
    pub fn clear_cosigner(&mut self, id: CosignerId, threshold: usize) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|entry| {
            entry.per_source.remove(&id);
            entry.per_source.len() >= threshold
        });
        before - self.entries.len()
    }

    /// Removes entries expired at `now`. Returns the removed count.
    pub fn prune(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if front.expiration <= now {
                self.entries.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }
}
