//! Digital signatures.
//!
//! - ECDSA P-256 with SHA-256: fixed 64-byte `r ‖ s` signatures
//! - ML-DSA-65 / ML-DSA-87 (FIPS 204): deterministic signing, empty context
//!
//! [`SigningKeyPair`] hides the algorithm behind one type so callers can keep
//! keys for several algorithms in the same keyring. [`verify`] never errors;
//! any malformed key or signature simply fails verification.
//!
//! # Security
//!
//! - Secret keys are exported only as `Zeroizing` bytes.
//! - ECDSA signatures are accepted only in the fixed 64-byte `r ‖ s` form;
//!   DER input fails verification.
//! - Verification takes the public key as bytes. Which key to trust for a
//!   peer is the caller's decision.
//!
//! # Example
//!
//! ```
//! use qrsl_crypto::sign::{self, SigningKeyPair};
//! use qrsl_crypto::SignatureAlgorithm;
//!
//! # fn main() -> Result<(), qrsl_crypto::Error> {
//! for algorithm in [SignatureAlgorithm::EcdsaP256, SignatureAlgorithm::MlDsa65] {
//!     let keypair = SigningKeyPair::generate(algorithm);
//!     let signature = keypair.sign(b"payload")?;
//!     let public = keypair.public_key();
//!
//!     assert!(sign::verify(algorithm, &public, b"payload", &signature));
//!     assert!(!sign::verify(algorithm, &public, b"tampered", &signature));
//! }
//! # Ok(())
//! # }
//! ```

pub mod ecdsa_p256;
pub mod mldsa;

use crate::suite::SignatureAlgorithm;
use crate::Result;
use zeroize::Zeroizing;

pub use self::ecdsa_p256::EcdsaP256KeyPair;
pub use self::mldsa::MlDsaKeyPair;

/// A signing keypair for any supported algorithm.
pub enum SigningKeyPair {
    /// ECDSA P-256.
    EcdsaP256(EcdsaP256KeyPair),
    /// ML-DSA-65 or ML-DSA-87.
    MlDsa(MlDsaKeyPair),
}

impl SigningKeyPair {
    /// Generate a fresh keypair.
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => Self::EcdsaP256(EcdsaP256KeyPair::generate()),
            SignatureAlgorithm::MlDsa65 | SignatureAlgorithm::MlDsa87 => {
                Self::MlDsa(MlDsaKeyPair::generate(algorithm))
            }
        }
    }

    /// Restore a keypair from the bytes returned by [`SigningKeyPair::secret_bytes`].
    pub fn from_secret(algorithm: SignatureAlgorithm, secret: &[u8]) -> Result<Self> {
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                EcdsaP256KeyPair::from_secret(secret).map(Self::EcdsaP256)
            }
            SignatureAlgorithm::MlDsa65 | SignatureAlgorithm::MlDsa87 => {
                MlDsaKeyPair::from_seed(algorithm, secret).map(Self::MlDsa)
            }
        }
    }

    /// Algorithm of this keypair.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::EcdsaP256(_) => SignatureAlgorithm::EcdsaP256,
            Self::MlDsa(kp) => kp.algorithm(),
        }
    }

    /// Encoded public key.
    pub fn public_key(&self) -> Vec<u8> {
        match self {
            Self::EcdsaP256(kp) => kp.public_key().to_vec(),
            Self::MlDsa(kp) => kp.public_key().to_vec(),
        }
    }

    /// Compact secret encoding: the P-256 scalar or the 32-byte ML-DSA seed.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::EcdsaP256(kp) => kp.secret_bytes(),
            Self::MlDsa(kp) => Zeroizing::new(kp.seed().to_vec()),
        }
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::EcdsaP256(kp) => Ok(kp.sign(message)),
            Self::MlDsa(kp) => kp.sign(message),
        }
    }
}

/// Verify `signature` over `message` under an encoded public key.
pub fn verify(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> bool {
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => ecdsa_p256::verify(public_key, message, signature),
        SignatureAlgorithm::MlDsa65 | SignatureAlgorithm::MlDsa87 => {
            mldsa::verify(algorithm, public_key, message, signature)
        }
    }
}
