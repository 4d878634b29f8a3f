//! Ephemeral key agreement with erase-on-use.
//!
//! Each peer has at most one pending P-256 keypair. [`ForwardSecrecyExchange::complete_exchange`]
//! removes it from the map before agreeing, so the private half is gone
//! whether the agreement succeeds or not. Once a session key has been
//! derived, nothing held here can reproduce it.

use crate::error::{Error, Result};
use qrsl_crypto::kdf::{self, labels};
use qrsl_crypto::kex::EcdhP256KeyPair;
use qrsl_crypto::SymmetricKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Pending ephemeral keypairs, keyed by peer.
#[derive(Default)]
pub struct ForwardSecrecyExchange {
    pending: Mutex<HashMap<String, EcdhP256KeyPair>>,
}

impl ForwardSecrecyExchange {
    /// Empty exchange.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, EcdhP256KeyPair>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate and store a fresh keypair for `peer_id`; return its public half.
    ///
    /// Any keypair already pending for the peer is dropped (and erased).
    pub fn generate_ephemeral(&self, peer_id: &str) -> Vec<u8> {
        let keypair = EcdhP256KeyPair::generate();
        let public = keypair.public_key().to_vec();
        if self.lock().insert(peer_id.to_string(), keypair).is_some() {
            debug!(peer = %peer_id, "Replaced pending ephemeral key");
        }
        public
    }

    /// Public half of the pending keypair, if one exists.
    pub fn pending_public_key(&self, peer_id: &str) -> Option<Vec<u8>> {
        self.lock().get(peer_id).map(|kp| kp.public_key().to_vec())
    }

    /// Agree with `remote_public` and derive a 32-byte session key.
    ///
    /// # Errors
    /// - `EphemeralKeyMissing` when nothing is pending for the peer
    /// - `Crypto` when the remote key is malformed
    ///
    /// The pending keypair is erased in every case.
    pub fn complete_exchange(&self, peer_id: &str, remote_public: &[u8]) -> Result<SymmetricKey> {
        let keypair = self
            .lock()
            .remove(peer_id)
            .ok_or_else(|| Error::EphemeralKeyMissing(peer_id.to_string()))?;

        let shared = keypair.agree(remote_public).map_err(|e| {
            warn!(peer = %peer_id, error = %e, "Ephemeral agreement failed");
            Error::Crypto(e)
        })?;
        let key = kdf::derive_key(&*shared, None, Some(labels::FORWARD_SECRECY), kdf::DEFAULT_KEY_LEN)?;
        Ok(key)
    }

    /// Whether a keypair is pending for the peer.
    pub fn has_pending(&self, peer_id: &str) -> bool {
        self.lock().contains_key(peer_id)
    }

    /// Erase the peer's pending keypair. Returns `true` if one existed.
    pub fn discard(&self, peer_id: &str) -> bool {
        self.lock().remove(peer_id).is_some()
    }

    /// Erase every pending keypair.
    pub fn clear_all(&self) {
        let mut pending = self.lock();
        let count = pending.len();
        pending.clear();
        if count > 0 {
            debug!(count, "Cleared pending ephemeral keys");
        }
    }

    /// Number of pending keypairs.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_sides_derive_same_key() {
        let alice = ForwardSecrecyExchange::new();
        let bob = ForwardSecrecyExchange::new();

        let a_pub = alice.generate_ephemeral("bob");
        let b_pub = bob.generate_ephemeral("alice");

        let k_alice = alice.complete_exchange("bob", &b_pub).unwrap();
        let k_bob = bob.complete_exchange("alice", &a_pub).unwrap();
        assert_eq!(k_alice, k_bob);
        assert_eq!(k_alice.len(), 32);
    }

    #[test]
    fn test_erased_after_success() {
        let fs = ForwardSecrecyExchange::new();
        let peer = ForwardSecrecyExchange::new();
        fs.generate_ephemeral("p");
        let remote = peer.generate_ephemeral("me");

        fs.complete_exchange("p", &remote).unwrap();
        assert!(!fs.has_pending("p"));
        assert!(fs.pending_public_key("p").is_none());
        assert!(matches!(
            fs.complete_exchange("p", &remote),
            Err(Error::EphemeralKeyMissing(_))
        ));
    }

    #[test]
    fn test_erased_after_failure() {
        let fs = ForwardSecrecyExchange::new();
        fs.generate_ephemeral("p");

        assert!(fs.complete_exchange("p", &[0x04; 12]).is_err());
        assert!(!fs.has_pending("p"));
    }

    #[test]
    fn test_missing_ephemeral() {
        let fs = ForwardSecrecyExchange::new();
        let remote = EcdhP256KeyPair::generate();
        assert!(matches!(
            fs.complete_exchange("p", remote.public_key()),
            Err(Error::EphemeralKeyMissing(peer)) if peer == "p"
        ));
    }

    #[test]
    fn test_regenerate_replaces_pending() {
        let fs = ForwardSecrecyExchange::new();
        let first = fs.generate_ephemeral("p");
        let second = fs.generate_ephemeral("p");
        assert_ne!(first, second);
        assert_eq!(fs.pending_public_key("p").unwrap(), second);
        assert_eq!(fs.pending_count(), 1);
    }

    #[test]
    fn test_discard_and_clear_all() {
        let fs = ForwardSecrecyExchange::new();
        fs.generate_ephemeral("a");
        fs.generate_ephemeral("b");
        fs.generate_ephemeral("c");

        assert!(fs.discard("a"));
        assert!(!fs.discard("a"));
        fs.clear_all();
        assert_eq!(fs.pending_count(), 0);
    }
}
