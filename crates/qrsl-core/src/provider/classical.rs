//! ECDSA P-256 backend.

use super::keyring::Keyring;
use super::{BackendKind, CryptoProvider};
use crate::error::{Error, Result};
use qrsl_crypto::hpke::HpkeSealed;
use qrsl_crypto::kex::KemOutput;
use qrsl_crypto::sign::{self, SigningKeyPair};
use qrsl_crypto::{CryptoSuite, KemVariant, SignatureAlgorithm};
use zeroize::Zeroizing;

/// Classical signatures only. KEM and HPKE are unsupported.
#[derive(Default)]
pub struct ClassicalProvider {
    keyring: Keyring,
}

impl ClassicalProvider {
    /// Provider with an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }
}

fn require_ecdsa(algorithm: SignatureAlgorithm) -> Result<()> {
    if algorithm == SignatureAlgorithm::EcdsaP256 {
        Ok(())
    } else {
        Err(Error::UnsupportedAlgorithm(format!(
            "{} on the classical backend",
            algorithm
        )))
    }
}

impl CryptoProvider for ClassicalProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::None
    }

    fn suite(&self) -> CryptoSuite {
        CryptoSuite::ClassicalP256
    }

    fn sign(&self, data: &[u8], peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        require_ecdsa(algorithm)?;
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
        if algorithm != SignatureAlgorithm::EcdsaP256 {
            return false;
        }
        self.keyring
            .verifying_key(peer_id, algorithm)
            .is_some_and(|pk| sign::verify(algorithm, &pk, data, signature))
    }

    fn verifying_key(&self, peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        require_ecdsa(algorithm)?;
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
        require_ecdsa(algorithm)?;
        qrsl_crypto::kex::ecdh_p256::parse_public_key(public_key)?;
        self.keyring.set_remote_key(peer_id, algorithm, public_key);
        Ok(())
    }

    fn kem_encapsulate(&self, _peer_id: &str, variant: KemVariant) -> Result<KemOutput> {
        Err(Error::UnsupportedAlgorithm(format!(
            "{} on the classical backend",
            variant
        )))
    }

    fn kem_decapsulate(
        &self,
        _peer_id: &str,
        _encapsulated: &[u8],
        variant: KemVariant,
    ) -> Result<Zeroizing<[u8; 32]>> {
        Err(Error::UnsupportedAlgorithm(format!(
            "{} on the classical backend",
            variant
        )))
    }

    fn hpke_seal(&self, _peer_id: &str, _plaintext: &[u8], _aad: Option<&[u8]>) -> Result<HpkeSealed> {
        Err(Error::UnsupportedAlgorithm("HPKE on the classical backend".into()))
    }

    fn hpke_open(
        &self,
        _peer_id: &str,
        _sealed: &HpkeSealed,
        _aad: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        Err(Error::UnsupportedAlgorithm("HPKE on the classical backend".into()))
    }
}
