//! Library-bridge PQC backend with keys persisted in a [`SecretStore`].
//!
//! Key material is created once per `(peer, algorithm)` and written through
//! the store under `"<Algorithm>-<Variant>-<Role>"` service names with the
//! peer as account. Lookups go cache, then store, then generate.
//!
//! HPKE is not available from the bridge, so `hpke_seal` is emulated:
//!
//! ```text
//! (ss, enc) = ML-KEM-768.Encaps(pk_peer)
//! key       = HKDF-SHA256(ss, salt = none, info = "hpke-seal", 32)
//! ct        = AES-256-GCM(key, aad | default context) as nonce‖tag‖ciphertext
//! ```
//!
//! This is a protocol adaptation and is not wire compatible with RFC 9180.

use super::keyring::Keyring;
use super::native::{check_mldsa_public_key, require_mldsa};
use super::{BackendKind, CryptoProvider};
use crate::error::{Error, Result};
use qrsl_crypto::hpke::{self, HpkeSealed};
use qrsl_crypto::kex::{KemOutput, MlKemKeyPair};
use qrsl_crypto::sign::{self, SigningKeyPair};
use qrsl_crypto::{CryptoSuite, KemVariant, SignatureAlgorithm};
use qrsl_platform::traits::store_keypair;
use qrsl_platform::{service_name, KeyRole, SecretStore};
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// KEM used by the HPKE emulation.
const HPKE_KEM: KemVariant = KemVariant::MlKem768;

/// Store-backed PQC provider.
pub struct LegacyBridgeProvider {
    store: Arc<dyn SecretStore>,
    keyring: Keyring,
}

impl LegacyBridgeProvider {
    /// Provider persisting keys in `store`.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            keyring: Keyring::default(),
        }
    }

    fn signing_services(algorithm: SignatureAlgorithm) -> (String, String) {
        (
            service_name(algorithm.family(), algorithm.variant(), KeyRole::Pub),
            service_name(algorithm.family(), algorithm.variant(), KeyRole::Priv),
        )
    }

    fn kem_services(variant: KemVariant) -> (String, String) {
        (
            service_name(variant.family(), variant.variant(), KeyRole::Pub),
            service_name(variant.family(), variant.variant(), KeyRole::Priv),
        )
    }

    fn signing_keypair(&self, peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Arc<SigningKeyPair>> {
        require_mldsa(algorithm)?;
        self.keyring.signing_key_or_load(peer_id, algorithm, || {
            let (public_service, private_service) = Self::signing_services(algorithm);
            if let Some(seed) = self.store.export_key(&private_service, peer_id) {
                match SigningKeyPair::from_secret(algorithm, &seed) {
                    Ok(kp) => return Ok(kp),
                    Err(e) => {
                        warn!(peer = %peer_id, service = %private_service, error = %e,
                            "Stored signing key unusable, regenerating");
                    }
                }
            }
            let kp = SigningKeyPair::generate(algorithm);
            store_keypair(
                self.store.as_ref(),
                &public_service,
                &private_service,
                peer_id,
                &kp.public_key(),
                &kp.secret_bytes(),
            )?;
            debug!(peer = %peer_id, algorithm = %algorithm, "Persisted new signing key");
            Ok(kp)
        })
    }

    fn kem_keypair(&self, peer_id: &str, variant: KemVariant) -> Result<Arc<MlKemKeyPair>> {
        self.keyring.kem_key_or_load(peer_id, variant, || {
            let (public_service, private_service) = Self::kem_services(variant);
            let stored = self
                .store
                .export_key(&private_service, peer_id)
                .zip(self.store.export_key(&public_service, peer_id));
            if let Some((secret, public)) = stored {
                match MlKemKeyPair::from_bytes(variant, &secret, &public) {
                    Ok(kp) => return Ok(kp),
                    Err(e) => {
                        warn!(peer = %peer_id, service = %private_service, error = %e,
                            "Stored KEM key unusable, regenerating");
                    }
                }
            }
            let kp = MlKemKeyPair::generate(variant);
            store_keypair(
                self.store.as_ref(),
                &public_service,
                &private_service,
                peer_id,
                kp.public_key(),
                kp.secret_key(),
            )?;
            debug!(peer = %peer_id, variant = %variant, "Persisted new KEM key");
            Ok(kp)
        })
    }

}

impl CryptoProvider for LegacyBridgeProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::LegacyBridge
    }

    fn suite(&self) -> CryptoSuite {
        CryptoSuite::PqcMlKemMlDsa
    }

    fn sign(&self, data: &[u8], peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        let key = self.signing_keypair(peer_id, algorithm)?;
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
        Ok(self.signing_keypair(peer_id, algorithm)?.public_key())
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
        let recipient = self.kem_keypair(peer_id, HPKE_KEM)?;
        hpke::seal_emulated(HPKE_KEM, recipient.public_key(), aad, plaintext).map_err(Error::from_seal)
    }

    fn hpke_open(
        &self,
        peer_id: &str,
        sealed: &HpkeSealed,
        aad: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let recipient = self.kem_keypair(peer_id, HPKE_KEM)?;
        hpke::open_emulated(&recipient, sealed, aad).map_err(Error::from_open)
    }
}
