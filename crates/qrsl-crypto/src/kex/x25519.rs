//! X25519 Diffie-Hellman (RFC 7748), the classical half of X-Wing.
//!
//! # Security
//!
//! - The scalar lives in `Zeroizing<StaticSecret>` and shared secrets are
//!   returned as `Zeroizing<[u8; 32]>`, so both are cleared on drop.
//! - [`X25519KeyPair::exchange`] rejects low-order peer points instead of
//!   returning the all-zero secret they force.
//! - Scalar multiplication is the constant-time ladder in `x25519-dalek`.
//!
//! # Example
//!
//! ```
//! use qrsl_crypto::kex::X25519KeyPair;
//!
//! # fn main() -> Result<(), qrsl_crypto::Error> {
//! let alice = X25519KeyPair::generate();
//! let bob = X25519KeyPair::generate();
//!
//! let alice_shared = alice.exchange(bob.public_key())?;
//! let bob_shared = bob.exchange(alice.public_key())?;
//! assert_eq!(*alice_shared, *bob_shared);
//!
//! // A stored scalar restores the same keypair.
//! let restored = X25519KeyPair::from_private(*alice.private_bytes());
//! assert_eq!(restored.public_key(), alice.public_key());
//!
//! // The identity point is low order.
//! assert!(alice.exchange(&[0u8; 32]).is_err());
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// X25519 keypair. The scalar is zeroized on drop.
pub struct X25519KeyPair {
    private_key: Zeroizing<StaticSecret>,
    public_key: PublicKey,
}

impl X25519KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let private_key = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public_key = PublicKey::from(&private_key);
        Self {
            private_key: Zeroizing::new(private_key),
            public_key,
        }
    }

    /// Rebuild a keypair from a stored 32-byte scalar.
    pub fn from_private(private: [u8; 32]) -> Self {
        let private_key = StaticSecret::from(private);
        let public_key = PublicKey::from(&private_key);
        Self {
            private_key: Zeroizing::new(private_key),
            public_key,
        }
    }

    /// The 32-byte public key.
    pub fn public_key(&self) -> &[u8; 32] {
        self.public_key.as_bytes()
    }

    /// The 32-byte scalar, for export to a secret store.
    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.private_key.to_bytes())
    }

    /// Compute the shared secret with `peer_public`.
    ///
    /// # Errors
    /// Rejects low-order peer points, which produce an all-zero secret.
    pub fn exchange(&self, peer_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let shared = self
            .private_key
            .diffie_hellman(&PublicKey::from(*peer_public));
        if shared.as_bytes() == &[0u8; 32] {
            return Err(Error::KeyExchange(
                "Invalid peer public key (low-order point)".into(),
            ));
        }
        Ok(Zeroizing::new(*shared.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(hex_str: &str) -> [u8; 32] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    /// Test against RFC 7748 §6.1.
    #[test]
    fn test_x25519_rfc7748_vectors() {
        let alice =
            X25519KeyPair::from_private(arr("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a"));
        let bob =
            X25519KeyPair::from_private(arr("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb"));

        assert_eq!(
            alice.public_key(),
            &arr("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
        );
        assert_eq!(
            bob.public_key(),
            &arr("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
        );

        let expected = arr("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742");
        assert_eq!(*alice.exchange(bob.public_key()).unwrap(), expected);
        assert_eq!(*bob.exchange(alice.public_key()).unwrap(), expected);
    }

    #[test]
    fn test_rejects_low_order_point() {
        let kp = X25519KeyPair::generate();
        assert!(matches!(kp.exchange(&[0u8; 32]), Err(Error::KeyExchange(_))));
    }

    #[test]
    fn test_private_bytes_restore() {
        let kp = X25519KeyPair::generate();
        let restored = X25519KeyPair::from_private(*kp.private_bytes());
        assert_eq!(kp.public_key(), restored.public_key());
    }
}
