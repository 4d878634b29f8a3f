//! Ephemeral ECDH over NIST P-256.
//!
//! [`EcdhP256KeyPair::agree`] consumes the keypair, so a private scalar can
//! take part in at most one agreement. The scalar is zeroized when the
//! keypair is dropped, whether or not agreement succeeded.
//!
//! Public keys travel in uncompressed SEC1 form (`0x04 ‖ x ‖ y`, 65 bytes).
//!
//! # Security
//!
//! - Peer keys are parsed with full point validation; off-curve points and
//!   the identity are rejected before any scalar multiplication.
//! - The shared secret is the 32-byte x-coordinate in `Zeroizing`. Feed it
//!   through [`crate::kdf::derive_key`] rather than using it as a key.
//!
//! # Example
//!
//! ```
//! use qrsl_crypto::kex::EcdhP256KeyPair;
//!
//! # fn example() -> Result<(), qrsl_crypto::Error> {
//! let alice = EcdhP256KeyPair::generate();
//! let bob = EcdhP256KeyPair::generate();
//! let alice_pub = alice.public_key().to_vec();
//! let bob_pub = bob.public_key().to_vec();
//!
//! let alice_shared = alice.agree(&bob_pub)?;
//! let bob_shared = bob.agree(&alice_pub)?;
//! assert_eq!(*alice_shared, *bob_shared);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use zeroize::Zeroizing;

/// Length of an uncompressed SEC1 P-256 point.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Single-use P-256 key-agreement keypair.
pub struct EcdhP256KeyPair {
    secret_key: SecretKey,
    public_key_bytes: Vec<u8>,
}

impl EcdhP256KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut rand::rngs::OsRng);
        let public_key_bytes = secret_key
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Self {
            secret_key,
            public_key_bytes,
        }
    }

    /// Rebuild a keypair from a 32-byte big-endian scalar.
    pub fn from_private(private_key: &[u8]) -> Result<Self> {
        if private_key.len() != 32 {
            return Err(Error::InvalidKeyLength(format!(
                "P-256 private key must be 32 bytes, got {}",
                private_key.len()
            )));
        }
        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("scalar out of range for P-256".into()))?;
        let public_key_bytes = secret_key
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Ok(Self {
            secret_key,
            public_key_bytes,
        })
    }

    /// The uncompressed public point.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Agree with `peer_public` and consume the keypair.
    ///
    /// Returns the 32-byte x-coordinate of the shared point.
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` or `InvalidPublicKey` for malformed peer keys.
    /// The private scalar is erased in both outcomes.
    pub fn agree(self, peer_public: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let peer = parse_public_key(peer_public)?;
        let shared = diffie_hellman(self.secret_key.to_nonzero_scalar(), peer.as_affine());

        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}

/// Parse and validate an uncompressed SEC1 P-256 public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(Error::InvalidKeyLength(format!(
            "P-256 public key must be {} bytes (uncompressed), got {}",
            PUBLIC_KEY_LEN,
            bytes.len()
        )));
    }
    if bytes[0] != 0x04 {
        return Err(Error::InvalidPublicKey(
            "P-256 public key must use uncompressed format (0x04 prefix)".into(),
        ));
    }
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| Error::InvalidPublicKey("point is not on P-256".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_commutative() {
        let alice = EcdhP256KeyPair::generate();
        let bob = EcdhP256KeyPair::generate();
        let (a_pub, b_pub) = (alice.public_key().to_vec(), bob.public_key().to_vec());

        let a = alice.agree(&b_pub).unwrap();
        let b = bob.agree(&a_pub).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_public_key_format() {
        let kp = EcdhP256KeyPair::generate();
        assert_eq!(kp.public_key().len(), PUBLIC_KEY_LEN);
        assert_eq!(kp.public_key()[0], 0x04);
    }

    #[test]
    fn test_from_private_is_deterministic() {
        let a = EcdhP256KeyPair::from_private(&[0x42; 32]).unwrap();
        let b = EcdhP256KeyPair::from_private(&[0x42; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_from_private_rejects_zero_and_bad_length() {
        assert!(matches!(
            EcdhP256KeyPair::from_private(&[0u8; 32]),
            Err(Error::InvalidPrivateKey(_))
        ));
        assert!(matches!(
            EcdhP256KeyPair::from_private(&[1u8; 31]),
            Err(Error::InvalidKeyLength(_))
        ));
    }

    #[test]
    fn test_agree_rejects_compressed_key() {
        let kp = EcdhP256KeyPair::generate();
        let mut compressed = vec![0x02];
        compressed.extend_from_slice(&[0x11; 64]);
        assert!(matches!(kp.agree(&compressed), Err(Error::InvalidPublicKey(_))));
    }

    #[test]
    fn test_agree_rejects_off_curve_point() {
        let kp = EcdhP256KeyPair::generate();
        let mut bogus = vec![0x04];
        bogus.extend_from_slice(&[0xFF; 64]);
        assert!(kp.agree(&bogus).is_err());
    }

    #[test]
    fn test_agree_rejects_wrong_length() {
        let kp = EcdhP256KeyPair::generate();
        assert!(matches!(kp.agree(&[0x04; 33]), Err(Error::InvalidKeyLength(_))));
    }
}
