//! ML-KEM key encapsulation (FIPS 203).
//!
//! One [`MlKemKeyPair`] type covers both parameter sets; the variant is
//! carried at runtime. Key bytes are kept in their FIPS 203 encodings so a
//! keypair can be exported to, and restored from, a secret store.
//!
//! # Example
//!
//! ```
//! use qrsl_crypto::kex::MlKemKeyPair;
//! use qrsl_crypto::KemVariant;
//!
//! # fn example() -> Result<(), qrsl_crypto::Error> {
//! let recipient = MlKemKeyPair::generate(KemVariant::MlKem768);
//! let sent = MlKemKeyPair::encapsulate(KemVariant::MlKem768, recipient.public_key())?;
//! let received = recipient.decapsulate(&sent.ciphertext)?;
//! assert_eq!(*sent.shared_secret, *received);
//! # Ok(())
//! # }
//! ```

use crate::suite::KemVariant;
use crate::{Error, Result};
use kem::{Decapsulate, Encapsulate};
use ml_kem::kem::{DecapsulationKey, EncapsulationKey};
use ml_kem::{EncodedSizeUser, KemCore};
use zeroize::Zeroizing;

/// Shared secret plus the ciphertext that transports it.
pub struct KemOutput {
    /// 32-byte shared secret.
    pub shared_secret: Zeroizing<[u8; 32]>,
    /// Ciphertext to send to the key holder.
    pub ciphertext: Vec<u8>,
}

macro_rules! ml_kem_params {
    ($name:ident, $kem:ty, $params:ty, dk = $dk:expr, ek = $ek:expr, ct = $ct:expr) => {
        mod $name {
            use super::*;

            pub(super) const DK_LEN: usize = $dk;
            pub(super) const EK_LEN: usize = $ek;
            pub(super) const CT_LEN: usize = $ct;

            pub(super) fn generate() -> (Zeroizing<Vec<u8>>, Vec<u8>) {
                let (dk, ek) = <$kem>::generate(&mut rand::rngs::OsRng);
                (
                    Zeroizing::new(dk.as_bytes().to_vec()),
                    ek.as_bytes().to_vec(),
                )
            }

            pub(super) fn encapsulate(ek: &[u8]) -> Result<(Vec<u8>, Zeroizing<[u8; 32]>)> {
                let ek_bytes: &[u8; EK_LEN] = ek.try_into().map_err(|_| Error::InvalidLength {
                    expected: EK_LEN,
                    actual: ek.len(),
                })?;
                let key = EncapsulationKey::<$params>::from_bytes(&(*ek_bytes).into());
                let (ct, ss) = key
                    .encapsulate(&mut rand::rngs::OsRng)
                    .map_err(|e| Error::KeyExchange(format!("encapsulation failed: {:?}", e)))?;

                let mut secret = Zeroizing::new([0u8; 32]);
                secret.copy_from_slice(&ss[..]);
                Ok((ct.to_vec(), secret))
            }

            pub(super) fn decapsulate(dk: &[u8], ct: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
                let ct_bytes: &[u8; CT_LEN] = ct.try_into().map_err(|_| Error::InvalidLength {
                    expected: CT_LEN,
                    actual: ct.len(),
                })?;
                let dk_bytes: &[u8; DK_LEN] = dk
                    .try_into()
                    .map_err(|_| Error::InvalidPrivateKey("decapsulation key length".into()))?;
                let key = DecapsulationKey::<$params>::from_bytes(&(*dk_bytes).into());
                let ss = key
                    .decapsulate(&(*ct_bytes).into())
                    .map_err(|e| Error::KeyExchange(format!("decapsulation failed: {:?}", e)))?;

                let mut secret = Zeroizing::new([0u8; 32]);
                secret.copy_from_slice(&ss[..]);
                Ok(secret)
            }
        }
    };
}

ml_kem_params!(p768, ml_kem::MlKem768, ml_kem::MlKem768Params, dk = 2400, ek = 1184, ct = 1088);
ml_kem_params!(p1024, ml_kem::MlKem1024, ml_kem::MlKem1024Params, dk = 3168, ek = 1568, ct = 1568);

/// ML-KEM decapsulation/encapsulation keypair.
pub struct MlKemKeyPair {
    variant: KemVariant,
    decapsulation_key: Zeroizing<Vec<u8>>,
    encapsulation_key: Vec<u8>,
}

impl MlKemKeyPair {
    /// Generate a fresh keypair.
    pub fn generate(variant: KemVariant) -> Self {
        let (decapsulation_key, encapsulation_key) = match variant {
            KemVariant::MlKem768 => p768::generate(),
            KemVariant::MlKem1024 => p1024::generate(),
        };
        Self {
            variant,
            decapsulation_key,
            encapsulation_key,
        }
    }

    /// Restore a keypair from its encoded halves.
    pub fn from_bytes(variant: KemVariant, secret: &[u8], public: &[u8]) -> Result<Self> {
        let (dk_len, ek_len) = match variant {
            KemVariant::MlKem768 => (p768::DK_LEN, p768::EK_LEN),
            KemVariant::MlKem1024 => (p1024::DK_LEN, p1024::EK_LEN),
        };
        if secret.len() != dk_len {
            return Err(Error::InvalidPrivateKey(format!(
                "{} decapsulation key must be {} bytes, got {}",
                variant,
                dk_len,
                secret.len()
            )));
        }
        if public.len() != ek_len {
            return Err(Error::InvalidPublicKey(format!(
                "{} encapsulation key must be {} bytes, got {}",
                variant,
                ek_len,
                public.len()
            )));
        }
        Ok(Self {
            variant,
            decapsulation_key: Zeroizing::new(secret.to_vec()),
            encapsulation_key: public.to_vec(),
        })
    }

    /// Parameter set of this keypair.
    pub fn variant(&self) -> KemVariant {
        self.variant
    }

    /// Encoded encapsulation key.
    pub fn public_key(&self) -> &[u8] {
        &self.encapsulation_key
    }

    /// Encoded decapsulation key. Handle with care.
    pub fn secret_key(&self) -> &[u8] {
        &self.decapsulation_key
    }

    /// Encapsulate a fresh shared secret to `recipient_public`.
    pub fn encapsulate(variant: KemVariant, recipient_public: &[u8]) -> Result<KemOutput> {
        let (ciphertext, shared_secret) = match variant {
            KemVariant::MlKem768 => p768::encapsulate(recipient_public)?,
            KemVariant::MlKem1024 => p1024::encapsulate(recipient_public)?,
        };
        Ok(KemOutput {
            shared_secret,
            ciphertext,
        })
    }

    /// Recover the shared secret from `ciphertext`.
    ///
    /// A well-formed but foreign ciphertext yields an unrelated secret
    /// (implicit rejection), never an error.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        match self.variant {
            KemVariant::MlKem768 => p768::decapsulate(&self.decapsulation_key, ciphertext),
            KemVariant::MlKem1024 => p1024::decapsulate(&self.decapsulation_key, ciphertext),
        }
    }
}
