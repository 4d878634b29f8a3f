//! X-Wing hybrid KEM: X25519 + ML-KEM-768 with a SHA3-256 combiner.
//!
//! Layout follows draft-connolly-cfrg-xwing-kem:
//! - public key: `pk_M (1184) ‖ pk_X (32)`
//! - ciphertext: `ct_M (1088) ‖ ct_X (32)`
//! - shared secret: `SHA3-256(ss_M ‖ ss_X ‖ ct_X ‖ pk_X ‖ label)`
//!
//! The shared secret stays secure as long as either component holds.
//! Keys are generated from independent randomness rather than the draft's
//! seed expansion, so the draft's test vectors do not apply.

use super::ml_kem::{KemOutput, MlKemKeyPair};
use super::x25519::X25519KeyPair;
use crate::suite::KemVariant;
use crate::{Error, Result};
use sha3::{Digest, Sha3_256};
use zeroize::Zeroizing;

const LABEL: &[u8] = br"\.//^\";

const MLKEM_PK_LEN: usize = 1184;
const MLKEM_SK_LEN: usize = 2400;
const MLKEM_CT_LEN: usize = 1088;
const X25519_LEN: usize = 32;

/// Encoded X-Wing public key length.
pub const PUBLIC_KEY_LEN: usize = MLKEM_PK_LEN + X25519_LEN;

/// Encoded X-Wing ciphertext length.
pub const CIPHERTEXT_LEN: usize = MLKEM_CT_LEN + X25519_LEN;

/// Encoded X-Wing secret key length.
pub const SECRET_KEY_LEN: usize = MLKEM_SK_LEN + X25519_LEN;

/// X-Wing decapsulation keypair.
pub struct XWingKeyPair {
    ml_kem: MlKemKeyPair,
    x25519: X25519KeyPair,
    public_key: Vec<u8>,
}

impl XWingKeyPair {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Self::assemble(MlKemKeyPair::generate(KemVariant::MlKem768), X25519KeyPair::generate())
    }

    /// Restore from `dk_M ‖ sk_X` and `pk_M ‖ pk_X`.
    pub fn from_bytes(secret: &[u8], public: &[u8]) -> Result<Self> {
        if secret.len() != SECRET_KEY_LEN {
            return Err(Error::InvalidPrivateKey(format!(
                "X-Wing secret key must be {} bytes, got {}",
                SECRET_KEY_LEN,
                secret.len()
            )));
        }
        if public.len() != PUBLIC_KEY_LEN {
            return Err(Error::InvalidPublicKey(format!(
                "X-Wing public key must be {} bytes, got {}",
                PUBLIC_KEY_LEN,
                public.len()
            )));
        }
        let ml_kem = MlKemKeyPair::from_bytes(
            KemVariant::MlKem768,
            &secret[..MLKEM_SK_LEN],
            &public[..MLKEM_PK_LEN],
        )?;
        let mut scalar = Zeroizing::new([0u8; 32]);
        scalar.copy_from_slice(&secret[MLKEM_SK_LEN..]);
        let x25519 = X25519KeyPair::from_private(*scalar);
        if x25519.public_key()[..] != public[MLKEM_PK_LEN..] {
            return Err(Error::InvalidPublicKey(
                "X25519 half does not match the stored scalar".into(),
            ));
        }
        Ok(Self::assemble(ml_kem, x25519))
    }

    fn assemble(ml_kem: MlKemKeyPair, x25519: X25519KeyPair) -> Self {
        let mut public_key = Vec::with_capacity(PUBLIC_KEY_LEN);
        public_key.extend_from_slice(ml_kem.public_key());
        public_key.extend_from_slice(x25519.public_key());
        Self {
            ml_kem,
            x25519,
            public_key,
        }
    }

    /// Encoded public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Encoded secret key (`dk_M ‖ sk_X`).
    pub fn secret_key(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(SECRET_KEY_LEN));
        out.extend_from_slice(self.ml_kem.secret_key());
        out.extend_from_slice(&*self.x25519.private_bytes());
        out
    }

    /// Encapsulate to an encoded X-Wing public key.
    pub fn encapsulate(recipient_public: &[u8]) -> Result<KemOutput> {
        if recipient_public.len() != PUBLIC_KEY_LEN {
            return Err(Error::InvalidLength {
                expected: PUBLIC_KEY_LEN,
                actual: recipient_public.len(),
            });
        }
        let (pk_m, pk_x) = recipient_public.split_at(MLKEM_PK_LEN);
        let pk_x: &[u8; 32] = pk_x
            .try_into()
            .map_err(|_| Error::InvalidPublicKey("X25519 half".into()))?;

        let ephemeral = X25519KeyPair::generate();
        let ss_x = ephemeral.exchange(pk_x)?;
        let ct_x = *ephemeral.public_key();
        let inner = MlKemKeyPair::encapsulate(KemVariant::MlKem768, pk_m)?;

        let shared_secret = combine(&inner.shared_secret, &ss_x, &ct_x, pk_x);
        let mut ciphertext = inner.ciphertext;
        ciphertext.extend_from_slice(&ct_x);

        Ok(KemOutput {
            shared_secret,
            ciphertext,
        })
    }

    /// Recover the shared secret from an X-Wing ciphertext.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        if ciphertext.len() != CIPHERTEXT_LEN {
            return Err(Error::InvalidLength {
                expected: CIPHERTEXT_LEN,
                actual: ciphertext.len(),
            });
        }
        let (ct_m, ct_x) = ciphertext.split_at(MLKEM_CT_LEN);
        let ct_x: &[u8; 32] = ct_x
            .try_into()
            .map_err(|_| Error::InvalidLength {
                expected: X25519_LEN,
                actual: ct_x.len(),
            })?;

        let ss_m = self.ml_kem.decapsulate(ct_m)?;
        let ss_x = self.x25519.exchange(ct_x)?;
        Ok(combine(&ss_m, &ss_x, ct_x, self.x25519.public_key()))
    }
}

fn combine(ss_m: &[u8; 32], ss_x: &[u8; 32], ct_x: &[u8; 32], pk_x: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha3_256::new();
    hasher.update(ss_m);
    hasher.update(ss_x);
    hasher.update(ct_x);
    hasher.update(pk_x);
    hasher.update(LABEL);

    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&hasher.finalize());
    out
}
