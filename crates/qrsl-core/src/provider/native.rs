//! OS-provided PQC backend: ML-KEM, ML-DSA and X-Wing HPKE.

use super::keyring::Keyring;
use super::{BackendKind, CryptoProvider};
use crate::error::{Error, Result};
use qrsl_crypto::hpke::{self, HpkeSealed};
use qrsl_crypto::kdf::labels;
use qrsl_crypto::kex::{KemOutput, MlKemKeyPair};
use qrsl_crypto::sign::{self, SigningKeyPair};
use qrsl_crypto::{CryptoSuite, KemVariant, SignatureAlgorithm};
use tracing::debug;
use zeroize::Zeroizing;

/// HPKE `info` for every payload sealed by this backend.
const HPKE_INFO: &[u8] = b"qrsl-xwing-hpke-v1";

/// Native PQC keys live for the process lifetime only.
#[derive(Default)]
pub struct NativePqcProvider {
    keyring: Keyring,
}

impl NativePqcProvider {
    /// Provider with an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    fn kem_keypair(&self, peer_id: &str, variant: KemVariant) -> Result<std::sync::Arc<MlKemKeyPair>> {
        self.keyring.kem_key_or_load(peer_id, variant, || {
            debug!(peer = %peer_id, variant = %variant, "Generating KEM keypair");
            Ok(MlKemKeyPair::generate(variant))
        })
    }
}

/// Reject ECDSA on the PQC backends.
pub(super) fn require_mldsa(algorithm: SignatureAlgorithm) -> Result<()> {
    if algorithm.is_post_quantum() {
        Ok(())
    } else {
        Err(Error::UnsupportedAlgorithm(format!(
            "{} on a PQC backend",
            algorithm
        )))
    }
}

/// Encoded ML-DSA verifying key length.
pub(super) fn mldsa_public_key_len(algorithm: SignatureAlgorithm) -> usize {
    match algorithm {
        SignatureAlgorithm::MlDsa87 => 2592,
        _ => 1952,
    }
}

pub(super) fn check_mldsa_public_key(algorithm: SignatureAlgorithm, public_key: &[u8]) -> Result<()> {
    require_mldsa(algorithm)?;
    let expected = mldsa_public_key_len(algorithm);
    if public_key.len() != expected {
        return Err(qrsl_crypto::Error::InvalidLength {
            expected,
            actual: public_key.len(),
        }
        .into());
    }
    Ok(())
}

impl CryptoProvider for NativePqcProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::NativePqc
    }

    fn suite(&self) -> CryptoSuite {
        CryptoSuite::HybridXWing
    }

    fn sign(&self, data: &[u8], peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        require_mldsa(algorithm)?;
        let key = self
            .keyring
            .signing_key_or_load(peer_id, algorithm, || Ok(SigningKeyPair::generate(algorithm)))?;
        key.sign(data)
            .map_err(|e| Error::SignatureFailed(e.to_string()))
    }

    fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        peer_id: &str,
        algorithm: SignatureAlgorithm,
    ) -> bool {
        if !algorithm.is_post_quantum() {
            return false;
        }
        self.keyring
            .verifying_key(peer_id, algorithm)
            .is_some_and(|pk| sign::verify(algorithm, &pk, data, signature))
    }

    fn verifying_key(&self, peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        require_mldsa(algorithm)?;
        let key = self
            .keyring
            .signing_key_or_load(peer_id, algorithm, || Ok(SigningKeyPair::generate(algorithm)))?;
        Ok(key.public_key())
    }

    fn import_verifying_key(
        &self,
        peer_id: &str,
        algorithm: SignatureAlgorithm,
        public_key: &[u8],
    ) -> Result<()> {
        check_mldsa_public_key(algorithm, public_key)?;
        self.keyring.set_remote_key(peer_id, algorithm, public_key);
        Ok(())
    }

    fn kem_encapsulate(&self, peer_id: &str, variant: KemVariant) -> Result<KemOutput> {
        let keypair = self.kem_keypair(peer_id, variant)?;
        Ok(MlKemKeyPair::encapsulate(variant, keypair.public_key())?)
    }

    fn kem_decapsulate(
        &self,
        peer_id: &str,
        encapsulated: &[u8],
        variant: KemVariant,
    ) -> Result<Zeroizing<[u8; 32]>> {
        let keypair = self.kem_keypair(peer_id, variant)?;
        Ok(keypair.decapsulate(encapsulated)?)
    }

    fn hpke_seal(&self, peer_id: &str, plaintext: &[u8], aad: Option<&[u8]>) -> Result<HpkeSealed> {
        let recipient = self.keyring.xwing_key(peer_id);
        hpke::seal(
            recipient.public_key(),
            HPKE_INFO,
            aad.unwrap_or(labels::HPKE_DEFAULT_CONTEXT),
            plaintext,
        )
        .map_err(Error::from_seal)
    }

    fn hpke_open(
        &self,
        peer_id: &str,
        sealed: &HpkeSealed,
        aad: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let recipient = self.keyring.xwing_key(peer_id);
        hpke::open(
            &recipient,
            sealed,
            HPKE_INFO,
            aad.unwrap_or(labels::HPKE_DEFAULT_CONTEXT),
        )
        .map_err(Error::from_open)
    }
}
