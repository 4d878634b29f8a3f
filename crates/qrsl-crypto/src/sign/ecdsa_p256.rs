//! ECDSA over P-256 with SHA-256.

use crate::{Error, Result};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

/// Length of a fixed-size `r ‖ s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// ECDSA P-256 signing keypair.
pub struct EcdsaP256KeyPair {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

impl EcdsaP256KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Restore from a 32-byte big-endian scalar.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.len() != 32 {
            return Err(Error::InvalidKeyLength(format!(
                "P-256 signing key must be 32 bytes, got {}",
                secret.len()
            )));
        }
        SigningKey::from_slice(secret)
            .map(Self::from_signing_key)
            .map_err(|_| Error::InvalidPrivateKey("Invalid P-256 signing key".into()))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Self {
            signing_key,
            public_key,
        }
    }

    /// Uncompressed SEC1 public key (65 bytes).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The 32-byte scalar.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.signing_key.to_bytes().to_vec())
    }

    /// Sign `message`, returning `r ‖ s`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_bytes().to_vec()
    }
}

/// Verify an `r ‖ s` signature under a SEC1 public key.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_length() {
        let kp = EcdsaP256KeyPair::generate();
        assert_eq!(kp.sign(b"x").len(), SIGNATURE_LEN);
        assert_eq!(kp.public_key().len(), 65);
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let kp = EcdsaP256KeyPair::generate();
        let sig = kp.sign(b"msg");
        assert!(verify(kp.public_key(), b"msg", &sig));
        assert!(!verify(&[0u8; 65], b"msg", &sig));
        assert!(!verify(kp.public_key(), b"msg", &sig[..63]));
        assert!(!verify(kp.public_key(), b"msg", &[0u8; 64]));
    }

    #[test]
    fn test_from_secret_rejects_zero() {
        assert!(EcdsaP256KeyPair::from_secret(&[0u8; 32]).is_err());
        assert!(EcdsaP256KeyPair::from_secret(&[1u8; 16]).is_err());
    }
}
