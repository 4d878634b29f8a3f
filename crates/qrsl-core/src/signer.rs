//! Hybrid classical + PQC signatures.
//!
//! A [`HybridCredential`] always carries an ECDSA P-256 signature and, when
//! policy and backend allow, an ML-DSA signature over the same bytes. Older
//! peers that only send classical signatures keep verifying while PQC is
//! rolled out.

use crate::config::PolicySnapshot;
use crate::error::{Error, Result};
use crate::provider::{CryptoProvider, ProviderSelector};
use qrsl_crypto::SignatureAlgorithm;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Classical signature plus optional PQC signature.
///
/// Wire form: `u16-LE len ‖ classical ‖ u16-LE len ‖ pqc`, where a PQC
/// length of zero means no PQC signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridCredential {
    /// ECDSA P-256 `r ‖ s`.
    pub classical: Vec<u8>,
    /// ML-DSA signature, if one was produced.
    pub pqc: Option<Vec<u8>>,
}

impl HybridCredential {
    /// True when a PQC signature is attached.
    pub fn is_hybrid(&self) -> bool {
        self.pqc.is_some()
    }

    /// Encode for the packet `signature` field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let pqc = self.pqc.as_deref().unwrap_or_default();
        let classical_len = u16::try_from(self.classical.len())
            .map_err(|_| Error::SignatureFailed("classical signature too long".into()))?;
        let pqc_len = u16::try_from(pqc.len())
            .map_err(|_| Error::SignatureFailed("PQC signature too long".into()))?;

        let mut out = Vec::with_capacity(4 + self.classical.len() + pqc.len());
        out.extend_from_slice(&classical_len.to_le_bytes());
        out.extend_from_slice(&self.classical);
        out.extend_from_slice(&pqc_len.to_le_bytes());
        out.extend_from_slice(pqc);
        Ok(out)
    }

    /// Decode from the packet `signature` field.
    ///
    /// # Errors
    /// `InvalidPacket` on truncation or trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (classical, rest) = read_prefixed(bytes)?;
        let (pqc, rest) = read_prefixed(rest)?;
        if !rest.is_empty() {
            return Err(Error::InvalidPacket(format!(
                "{} trailing bytes after credential",
                rest.len()
            )));
        }
        Ok(Self {
            classical: classical.to_vec(),
            pqc: (!pqc.is_empty()).then(|| pqc.to_vec()),
        })
    }
}

fn read_prefixed(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < 2 {
        return Err(Error::InvalidPacket("credential length prefix truncated".into()));
    }
    let len = u16::from_le_bytes([data[0], data[1]]) as usize;
    let body = &data[2..];
    if body.len() < len {
        return Err(Error::InvalidPacket(format!(
            "credential field needs {} bytes, {} available",
            len,
            body.len()
        )));
    }
    Ok(body.split_at(len))
}

/// Public keys a peer needs to check our credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingKeys {
    /// SEC1 ECDSA P-256 key.
    pub classical: Vec<u8>,
    /// PQC algorithm and encoded key, when a PQC backend is resolved.
    pub pqc: Option<(SignatureAlgorithm, Vec<u8>)>,
}

/// Signing outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerStats {
    /// Credentials with a PQC signature.
    pub hybrid: u64,
    /// Credentials without one because PQC was disabled.
    pub classical_only: u64,
    /// Credentials without one because the PQC backend was missing or failed.
    pub pqc_fallbacks: u64,
}

#[derive(Default)]
struct Counters {
    hybrid: AtomicU64,
    classical_only: AtomicU64,
    pqc_fallbacks: AtomicU64,
}

enum PqcSource {
    Fixed(Option<Arc<dyn CryptoProvider>>),
    Selector(Arc<ProviderSelector>),
}

/// Produces and checks [`HybridCredential`]s.
pub struct HybridSigner {
    classical: Arc<dyn CryptoProvider>,
    pqc: PqcSource,
    counters: Counters,
}

impl HybridSigner {
    /// Signer over explicit providers.
    pub fn new(classical: Arc<dyn CryptoProvider>, pqc: Option<Arc<dyn CryptoProvider>>) -> Self {
        Self {
            classical,
            pqc: PqcSource::Fixed(pqc),
            counters: Counters::default(),
        }
    }

    /// Signer that asks `selector` for the PQC provider on every call, so a
    /// reload takes effect immediately.
    pub fn from_selector(selector: Arc<ProviderSelector>) -> Self {
        Self {
            classical: selector.classical_provider(),
            pqc: PqcSource::Selector(selector),
            counters: Counters::default(),
        }
    }

    /// The classical provider.
    pub fn classical_provider(&self) -> Arc<dyn CryptoProvider> {
        Arc::clone(&self.classical)
    }

    /// The PQC provider currently in use, if any.
    pub fn pqc_provider(&self) -> Option<Arc<dyn CryptoProvider>> {
        match &self.pqc {
            PqcSource::Fixed(provider) => provider.clone(),
            PqcSource::Selector(selector) => selector.pqc_provider(),
        }
    }

    /// Sign `data` for `peer_id`.
    ///
    /// The classical signature is mandatory. The PQC signature is added when
    /// the snapshot enables PQC; if the backend is missing or fails the
    /// credential degrades to classical only, unless PQC is required.
    ///
    /// # Errors
    /// - `SignatureFailed` if classical signing fails, or PQC signing fails
    ///   under `require_pqc`
    /// - `BackendUnavailable` if PQC is required but no backend is resolved
    pub fn sign(&self, data: &[u8], peer_id: &str, policy: &PolicySnapshot) -> Result<HybridCredential> {
        let classical = self
            .classical
            .sign(data, peer_id, SignatureAlgorithm::EcdsaP256)?;

        if !(policy.enable_pqc || policy.require_pqc) {
            self.counters.classical_only.fetch_add(1, Ordering::Relaxed);
            return Ok(HybridCredential {
                classical,
                pqc: None,
            });
        }

        let pqc = match self.pqc_provider() {
            None if policy.require_pqc => {
                return Err(Error::BackendUnavailable(
                    "PQC required but no backend resolved".into(),
                ));
            }
            None => {
                warn!(peer = %peer_id, "No PQC backend, signing classical only");
                None
            }
            Some(provider) => match provider.sign(data, peer_id, policy.algorithm) {
                Ok(sig) => Some(sig),
                Err(e) if policy.require_pqc => {
                    return Err(Error::SignatureFailed(format!(
                        "required {} signature failed: {}",
                        policy.algorithm, e
                    )));
                }
                Err(e) => {
                    warn!(
                        peer = %peer_id,
                        algorithm = %policy.algorithm,
                        error = %e,
                        "PQC signing failed, falling back to classical"
                    );
                    None
                }
            },
        };

        if pqc.is_some() {
            self.counters.hybrid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.pqc_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        Ok(HybridCredential { classical, pqc })
    }

    /// Check a credential from `peer_id`.
    ///
    /// Classical must verify. A present PQC signature must verify when PQC
    /// is enabled. Under `require_pqc` an absent PQC signature is rejected.
    pub fn verify(
        &self,
        data: &[u8],
        credential: &HybridCredential,
        peer_id: &str,
        policy: &PolicySnapshot,
    ) -> bool {
        if !self
            .classical
            .verify(data, &credential.classical, peer_id, SignatureAlgorithm::EcdsaP256)
        {
            debug!(peer = %peer_id, "Classical signature rejected");
            return false;
        }

        let Some(pqc_sig) = &credential.pqc else {
            if policy.require_pqc {
                warn!(peer = %peer_id, "Classical-only credential rejected, PQC required");
                return false;
            }
            return true;
        };

        if !(policy.enable_pqc || policy.require_pqc) {
            return true;
        }

        match self.pqc_provider() {
            Some(provider) => {
                let ok = provider.verify(data, pqc_sig, peer_id, policy.algorithm);
                if !ok {
                    debug!(peer = %peer_id, algorithm = %policy.algorithm, "PQC signature rejected");
                }
                ok
            }
            None if policy.require_pqc => false,
            None => {
                warn!(peer = %peer_id, "No PQC backend to check PQC signature, accepting classical");
                true
            }
        }
    }

    /// Our public keys for `peer_id`, creating the keys on first use.
    pub fn verifying_keys(&self, peer_id: &str, policy: &PolicySnapshot) -> Result<VerifyingKeys> {
        let classical = self
            .classical
            .verifying_key(peer_id, SignatureAlgorithm::EcdsaP256)?;
        let pqc = match self.pqc_provider() {
            Some(provider) if policy.enable_pqc || policy.require_pqc => Some((
                policy.algorithm,
                provider.verifying_key(peer_id, policy.algorithm)?,
            )),
            _ => None,
        };
        Ok(VerifyingKeys { classical, pqc })
    }

    /// Register the keys `peer_id` signs with.
    ///
    /// A PQC key is skipped, with a warning, when no PQC backend is resolved.
    pub fn trust(&self, peer_id: &str, keys: &VerifyingKeys) -> Result<()> {
        self.classical
            .import_verifying_key(peer_id, SignatureAlgorithm::EcdsaP256, &keys.classical)?;
        if let Some((algorithm, key)) = &keys.pqc {
            match self.pqc_provider() {
                Some(provider) => provider.import_verifying_key(peer_id, *algorithm, key)?,
                None => warn!(peer = %peer_id, "No PQC backend, ignoring peer PQC key"),
            }
        }
        Ok(())
    }

    /// Counters since construction.
    pub fn stats(&self) -> SignerStats {
        SignerStats {
            hybrid: self.counters.hybrid.load(Ordering::Relaxed),
            classical_only: self.counters.classical_only.load(Ordering::Relaxed),
            pqc_fallbacks: self.counters.pqc_fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ClassicalProvider, NativePqcProvider};

    fn signer() -> HybridSigner {
        HybridSigner::new(
            Arc::new(ClassicalProvider::new()),
            Some(Arc::new(NativePqcProvider::new())),
        )
    }

    /// Signer that trusts its own keys for `peer`, standing in for a remote
    /// signer in single-instance tests.
    fn loopback(peer: &str, policy: &PolicySnapshot) -> HybridSigner {
        let signer = signer();
        let keys = signer.verifying_keys(peer, policy).unwrap();
        signer.trust(peer, &keys).unwrap();
        signer
    }

    #[test]
    fn test_credential_wire_format() {
        let cred = HybridCredential {
            classical: vec![0xaa; 3],
            pqc: Some(vec![0xbb; 2]),
        };
        let bytes = cred.to_bytes().unwrap();
        assert_eq!(bytes, [3, 0, 0xaa, 0xaa, 0xaa, 2, 0, 0xbb, 0xbb]);
        assert_eq!(HybridCredential::from_bytes(&bytes).unwrap(), cred);
    }

    #[test]
    fn test_credential_zero_length_pqc_is_absent() {
        let cred = HybridCredential {
            classical: vec![1; 64],
            pqc: None,
        };
        let bytes = cred.to_bytes().unwrap();
        assert_eq!(&bytes[66..], &[0, 0]);
        let decoded = HybridCredential::from_bytes(&bytes).unwrap();
        assert!(!decoded.is_hybrid());
    }

    #[test]
    fn test_credential_rejects_malformed() {
        let cases: [&[u8]; 4] = [&[], &[5], &[5, 0, 1, 2], &[1, 0, 9, 0, 0, 7]];
        for bad in cases {
            assert!(HybridCredential::from_bytes(bad).is_err());
        }
    }

    #[test]
    fn test_hybrid_sign_verify() {
        let policy = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);
        let signer = loopback("p", &policy);
        let cred = signer.sign(b"payload", "p", &policy).unwrap();
        assert!(cred.is_hybrid());
        assert!(signer.verify(b"payload", &cred, "p", &policy));
        assert!(!signer.verify(b"tampered", &cred, "p", &policy));
        assert_eq!(signer.stats().hybrid, 1);
    }

    #[test]
    fn test_invalid_pqc_rejected_when_enabled() {
        let policy = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);
        let signer = loopback("p", &policy);
        let mut cred = signer.sign(b"m", "p", &policy).unwrap();
        if let Some(sig) = cred.pqc.as_mut() {
            sig[10] ^= 0x01;
        }
        assert!(!signer.verify(b"m", &cred, "p", &policy));
        assert!(!signer.verify(b"m", &cred, "p", &policy.requiring_pqc()));
        assert!(signer.verify(b"m", &cred, "p", &PolicySnapshot::classical()));
    }

    #[test]
    fn test_invalid_classical_always_rejected() {
        let policy = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);
        let signer = loopback("p", &policy);
        let mut cred = signer.sign(b"m", "p", &policy).unwrap();
        cred.classical[0] ^= 0xff;
        assert!(!signer.verify(b"m", &cred, "p", &policy));
        assert!(!signer.verify(b"m", &cred, "p", &PolicySnapshot::classical()));
    }

    #[test]
    fn test_classical_only_credential_accepted_unless_required() {
        let hybrid = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);
        let signer = loopback("p", &hybrid);
        let cred = signer.sign(b"m", "p", &PolicySnapshot::classical()).unwrap();
        assert!(!cred.is_hybrid());

        assert!(signer.verify(b"m", &cred, "p", &hybrid));
        assert!(!signer.verify(b"m", &cred, "p", &hybrid.requiring_pqc()));
    }

    #[test]
    fn test_own_credential_not_accepted_without_trust() {
        let signer = signer();
        let policy = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);
        let cred = signer.sign(b"m", "p", &policy).unwrap();
        assert!(!signer.verify(b"m", &cred, "p", &policy));
        assert!(!signer.verify(b"m", &cred, "p", &PolicySnapshot::classical()));
    }

    #[test]
    fn test_cross_signer_verification_after_trust() {
        let alice = signer();
        let bob = signer();
        let policy = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);

        let cred = alice.sign(b"hi bob", "bob", &policy).unwrap();
        assert!(!bob.verify(b"hi bob", &cred, "alice", &policy));

        let keys = alice.verifying_keys("bob", &policy).unwrap();
        assert!(keys.pqc.is_some());
        bob.trust("alice", &keys).unwrap();
        assert!(bob.verify(b"hi bob", &cred, "alice", &policy));
    }

    #[test]
    fn test_missing_backend_degrades_or_fails() {
        let signer = HybridSigner::new(Arc::new(ClassicalProvider::new()), None);
        let policy = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa87);

        let cred = signer.sign(b"m", "p", &policy).unwrap();
        assert!(!cred.is_hybrid());
        assert_eq!(signer.stats().pqc_fallbacks, 1);

        assert!(matches!(
            signer.sign(b"m", "p", &policy.requiring_pqc()),
            Err(Error::BackendUnavailable(_))
        ));
    }
}
