//! Process-lifetime key cache shared by the providers.

use crate::error::Result;
use qrsl_crypto::kex::{MlKemKeyPair, XWingKeyPair};
use qrsl_crypto::sign::SigningKeyPair;
use qrsl_crypto::{KemVariant, SignatureAlgorithm};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Entries {
    signing: HashMap<(String, SignatureAlgorithm), Arc<SigningKeyPair>>,
    remote: HashMap<(String, SignatureAlgorithm), Vec<u8>>,
    kem: HashMap<(String, KemVariant), Arc<MlKemKeyPair>>,
    xwing: HashMap<String, Arc<XWingKeyPair>>,
}

/// All maps sit behind one lock; loaders run while it is held so two
/// callers can never create competing keys for the same slot.
#[derive(Default)]
pub(crate) struct Keyring {
    entries: Mutex<Entries>,
}

impl Keyring {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn signing_key(
        &self,
        peer_id: &str,
        algorithm: SignatureAlgorithm,
    ) -> Option<Arc<SigningKeyPair>> {
        self.lock()
            .signing
            .get(&(peer_id.to_string(), algorithm))
            .cloned()
    }

    pub(crate) fn signing_key_or_load<F>(
        &self,
        peer_id: &str,
        algorithm: SignatureAlgorithm,
        load: F,
    ) -> Result<Arc<SigningKeyPair>>
    where
        F: FnOnce() -> Result<SigningKeyPair>,
    {
        let mut entries = self.lock();
        let slot = (peer_id.to_string(), algorithm);
        if let Some(kp) = entries.signing.get(&slot) {
            return Ok(Arc::clone(kp));
        }
        let kp = Arc::new(load()?);
        entries.signing.insert(slot, Arc::clone(&kp));
        Ok(kp)
    }

    pub(crate) fn set_remote_key(&self, peer_id: &str, algorithm: SignatureAlgorithm, key: &[u8]) {
        self.lock()
            .remote
            .insert((peer_id.to_string(), algorithm), key.to_vec());
    }

    /// Key imported for the peer. Our own signing key is never returned,
    /// so a packet we signed and the network reflected back fails to verify.
    pub(crate) fn verifying_key(&self, peer_id: &str, algorithm: SignatureAlgorithm) -> Option<Vec<u8>> {
        self.lock()
            .remote
            .get(&(peer_id.to_string(), algorithm))
            .cloned()
    }

    pub(crate) fn kem_key_or_load<F>(
        &self,
        peer_id: &str,
        variant: KemVariant,
        load: F,
    ) -> Result<Arc<MlKemKeyPair>>
    where
        F: FnOnce() -> Result<MlKemKeyPair>,
    {
        let mut entries = self.lock();
        let slot = (peer_id.to_string(), variant);
        if let Some(kp) = entries.kem.get(&slot) {
            return Ok(Arc::clone(kp));
        }
        let kp = Arc::new(load()?);
        entries.kem.insert(slot, Arc::clone(&kp));
        Ok(kp)
    }

    pub(crate) fn xwing_key(&self, peer_id: &str) -> Arc<XWingKeyPair> {
        let mut entries = self.lock();
        Arc::clone(
            entries
                .xwing
                .entry(peer_id.to_string())
                .or_insert_with(|| Arc::new(XWingKeyPair::generate())),
        )
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let entries = self.lock();
        entries.signing.len() + entries.remote.len() + entries.kem.len() + entries.xwing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_runs_once_per_slot() {
        let keyring = Keyring::default();
        let mut calls = 0;
        for _ in 0..3 {
            keyring
                .signing_key_or_load("p", SignatureAlgorithm::EcdsaP256, || {
                    calls += 1;
                    Ok(SigningKeyPair::generate(SignatureAlgorithm::EcdsaP256))
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        assert_eq!(keyring.len(), 1);
    }

    #[test]
    fn test_loader_error_leaves_slot_empty() {
        let keyring = Keyring::default();
        let result = keyring.signing_key_or_load("p", SignatureAlgorithm::MlDsa65, || {
            Err(crate::Error::BackendUnavailable("store locked".into()))
        });
        assert!(result.is_err());
        assert!(keyring.signing_key("p", SignatureAlgorithm::MlDsa65).is_none());
    }

    #[test]
    fn test_verifying_key_is_remote_only() {
        let keyring = Keyring::default();
        let alg = SignatureAlgorithm::EcdsaP256;
        keyring
            .signing_key_or_load("p", alg, || Ok(SigningKeyPair::generate(alg)))
            .unwrap();
        assert!(keyring.verifying_key("p", alg).is_none());

        keyring.set_remote_key("p", alg, &[9u8; 65]);
        assert_eq!(keyring.verifying_key("p", alg).unwrap(), vec![9u8; 65]);
        assert!(keyring.verifying_key("q", alg).is_none());
    }
}
