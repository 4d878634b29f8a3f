//! ML-DSA signatures (FIPS 204).
//!
//! Keypairs are stored as their 32-byte key-generation seed and expanded on
//! load, which keeps exported secrets small. Signing is deterministic with an
//! empty context string.

use crate::suite::SignatureAlgorithm;
use crate::{Error, Result};
use ml_dsa::{EncodedSignature, EncodedVerifyingKey, KeyGen, MlDsa65, MlDsa87, Signature, VerifyingKey, B32};
use zeroize::Zeroizing;

const CONTEXT: &[u8] = b"";

macro_rules! ml_dsa_params {
    ($name:ident, $params:ty) => {
        mod $name {
            use super::*;

            pub(super) fn public_key(seed: &[u8; 32]) -> Vec<u8> {
                let xi: B32 = (*seed).into();
                let kp = <$params>::key_gen_internal(&xi);
                kp.verifying_key().encode().to_vec()
            }

            pub(super) fn sign(seed: &[u8; 32], message: &[u8]) -> Result<Vec<u8>> {
                let xi: B32 = (*seed).into();
                let kp = <$params>::key_gen_internal(&xi);
                kp.signing_key()
                    .sign_deterministic(message, CONTEXT)
                    .map(|sig| sig.encode().to_vec())
                    .map_err(|_| Error::Signature("ML-DSA signing failed".into()))
            }

            pub(super) fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
                let Ok(encoded_key) = EncodedVerifyingKey::<$params>::try_from(public_key) else {
                    return false;
                };
                let Ok(encoded_sig) = EncodedSignature::<$params>::try_from(signature) else {
                    return false;
                };
                let Some(sig) = Signature::<$params>::decode(&encoded_sig) else {
                    return false;
                };
                VerifyingKey::<$params>::decode(&encoded_key).verify_with_context(message, CONTEXT, &sig)
            }
        }
    };
}

ml_dsa_params!(level3, MlDsa65);
ml_dsa_params!(level5, MlDsa87);

/// ML-DSA keypair held as its generation seed plus the encoded public key.
pub struct MlDsaKeyPair {
    algorithm: SignatureAlgorithm,
    seed: Zeroizing<[u8; 32]>,
    public_key: Vec<u8>,
}

impl MlDsaKeyPair {
    /// Generate a fresh keypair for ML-DSA-65 or ML-DSA-87.
    ///
    /// ECDSA requests are treated as ML-DSA-65.
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        use rand::RngCore;
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut *seed);
        Self::expand(normalize(algorithm), seed)
    }

    /// Restore from a 32-byte seed.
    pub fn from_seed(algorithm: SignatureAlgorithm, seed: &[u8]) -> Result<Self> {
        if !algorithm.is_post_quantum() {
            return Err(Error::Unsupported(format!("{} is not an ML-DSA algorithm", algorithm)));
        }
        let mut stored = Zeroizing::new([0u8; 32]);
        if seed.len() != stored.len() {
            return Err(Error::InvalidKeyLength(format!(
                "ML-DSA seed must be 32 bytes, got {}",
                seed.len()
            )));
        }
        stored.copy_from_slice(seed);
        Ok(Self::expand(algorithm, stored))
    }

    fn expand(algorithm: SignatureAlgorithm, seed: Zeroizing<[u8; 32]>) -> Self {
        let public_key = match algorithm {
            SignatureAlgorithm::MlDsa87 => level5::public_key(&seed),
            _ => level3::public_key(&seed),
        };
        Self {
            algorithm,
            seed,
            public_key,
        }
    }

    /// ML-DSA parameter set.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Encoded verifying key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The key-generation seed.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            SignatureAlgorithm::MlDsa87 => level5::sign(&self.seed, message),
            _ => level3::sign(&self.seed, message),
        }
    }
}

fn normalize(algorithm: SignatureAlgorithm) -> SignatureAlgorithm {
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => SignatureAlgorithm::MlDsa65,
        other => other,
    }
}

/// Verify an encoded ML-DSA signature.
pub fn verify(algorithm: SignatureAlgorithm, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    match algorithm {
        SignatureAlgorithm::MlDsa65 => level3::verify(public_key, message, signature),
        SignatureAlgorithm::MlDsa87 => level5::verify(public_key, message, signature),
        SignatureAlgorithm::EcdsaP256 => false,
    }
}
