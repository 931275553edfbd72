use crate::foundation::{CosignerId, Result, SignerError};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

/// Nonce material one cosigner produces for one signing opportunity: the
/// public commitment plus one secret share per destination cosigner
/// (`shares[i]` belongs to cosigner `i + 1`).
#[derive(Clone, Debug)]
pub struct NonceShares {
    pub public: Vec<u8>,
    pub shares: Vec<Vec<u8>>,
}

/// One cosigner's contribution to a signing round.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartialSignature {
    pub cosigner_id: CosignerId,
    pub signature: Vec<u8>,
}

/// The threshold signing primitives. Key-share generation and the underlying
/// curve arithmetic live behind this trait; the coordination core only
/// depends on the contract.
pub trait ThresholdScheme: Send + Sync {
    /// Aggregate validator public key the combined signature verifies under.
    fn pub_key(&self) -> Vec<u8>;

    /// Fresh one-time nonce material with one share per destination.
    fn generate_nonces(&self, total: u8) -> Result<NonceShares>;

    /// Combines per-source nonce publics into the round's aggregate nonce.
    fn combine_nonce_publics(&self, publics: &[Vec<u8>]) -> Result<Vec<u8>>;

    /// Produces this cosigner's partial signature over `payload` using its
    /// own stored nonce secret and the shares received from peers.
    fn partial_sign(
        &self,
        own_nonce: &NonceShares,
        received_shares: &[Vec<u8>],
        nonce_public: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>>;

    /// Combines at least a threshold of partials into the full signature.
    fn combine_partials(&self, partials: &[PartialSignature]) -> Result<Vec<u8>>;

    /// Full verification of a combined signature against `pub_key`.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool;
}

/// Software scheme for development and tests: every cosigner holds the same
/// Ed25519 key, a partial is the full deterministic signature, and
/// combination requires byte agreement across partials. Exercises the whole
/// coordination contract without distributing trust; production MPC backends
/// implement [`ThresholdScheme`] instead.
pub struct SoftShareScheme {
    signing_key: SigningKey,
    threshold: usize,
}

impl SoftShareScheme {
    pub fn new(seed: [u8; 32], threshold: usize) -> Self {
        Self { signing_key: SigningKey::from_bytes(&seed), threshold }
    }

    fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl ThresholdScheme for SoftShareScheme {
    fn pub_key(&self) -> Vec<u8> {
        self.verifying_key().to_bytes().to_vec()
    }

    fn generate_nonces(&self, total: u8) -> Result<NonceShares> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let public = blake3::hash(&secret).as_bytes().to_vec();
        let shares = (1..=total)
            .map(|destination| blake3::keyed_hash(&secret, &[destination]).as_bytes().to_vec())
            .collect();
        Ok(NonceShares { public, shares })
    }

    fn combine_nonce_publics(&self, publics: &[Vec<u8>]) -> Result<Vec<u8>> {
        if publics.is_empty() {
            return Err(SignerError::CryptoError {
                operation: "combine_nonce_publics".to_string(),
                details: "no nonce publics supplied".to_string(),
            });
        }
        let mut sorted: Vec<&Vec<u8>> = publics.iter().collect();
        sorted.sort();
        let mut hasher = blake3::Hasher::new();
        for public in sorted {
            hasher.update(public);
        }
        Ok(hasher.finalize().as_bytes().to_vec())
    }

    fn partial_sign(
        &self,
        _own_nonce: &NonceShares,
        received_shares: &[Vec<u8>],
        _nonce_public: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        if received_shares.len() < self.threshold {
            return Err(SignerError::CryptoError {
                operation: "partial_sign".to_string(),
                details: format!("{} nonce shares below threshold {}", received_shares.len(), self.threshold),
            });
        }
        Ok(self.signing_key.sign(payload).to_bytes().to_vec())
    }

    fn combine_partials(&self, partials: &[PartialSignature]) -> Result<Vec<u8>> {
        if partials.len() < self.threshold {
            return Err(SignerError::ThresholdNotMet { required: self.threshold, received: partials.len() });
        }
        let first = &partials[0].signature;
        for partial in &partials[1..] {
            if &partial.signature != first {
                return Err(SignerError::CryptoError {
                    operation: "combine_partials".to_string(),
                    details: format!("partial signature from cosigner {} disagrees", partial.cosigner_id),
                });
            }
        }
        Ok(first.clone())
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        self.verifying_key().verify(payload, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> SoftShareScheme {
        SoftShareScheme::new([7u8; 32], 2)
    }

    fn partial(id: u8, signature: &[u8]) -> PartialSignature {
        PartialSignature { cosigner_id: CosignerId::new(id), signature: signature.to_vec() }
    }

    #[test]
    fn nonce_shares_cover_every_destination() {
        let shares = scheme().generate_nonces(3).expect("generate");
        assert_eq!(shares.shares.len(), 3);
        assert_eq!(shares.public.len(), 32);
    }

    #[test]
    fn combined_nonce_public_is_order_independent() {
        let s = scheme();
        let a = vec![1u8; 32];
        let b = vec![2u8; 32];
        let forward = s.combine_nonce_publics(&[a.clone(), b.clone()]).expect("combine");
        let reverse = s.combine_nonce_publics(&[b, a]).expect("combine");
        assert_eq!(forward, reverse);
    }

    #[test]
    fn partials_combine_and_verify() {
        let s = scheme();
        let own = s.generate_nonces(2).expect("generate");
        let shares = vec![vec![1u8; 32], vec![2u8; 32]];
        let sig = s.partial_sign(&own, &shares, &[0u8; 32], b"payload").expect("sign");

        let combined = s.combine_partials(&[partial(1, &sig), partial(2, &sig)]).expect("combine");
        assert!(s.verify(b"payload", &combined));
        assert!(!s.verify(b"other payload", &combined));
    }

    #[test]
    fn combine_rejects_below_threshold_and_disagreement() {
        let s = scheme();
        let sig = vec![9u8; 64];
        let err = s.combine_partials(&[partial(1, &sig)]).unwrap_err();
        assert!(matches!(err, SignerError::ThresholdNotMet { required: 2, received: 1 }));

        let err = s.combine_partials(&[partial(1, &sig), partial(2, &[8u8; 64])]).unwrap_err();
        assert!(matches!(err, SignerError::CryptoError { .. }));
    }
}
