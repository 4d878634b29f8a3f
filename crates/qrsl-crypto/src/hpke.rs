//! Hybrid public-key encryption.
//!
//! Two constructions live here:
//!
//! - [`seal`]/[`open`]: RFC 9180 base mode with X-Wing as the KEM,
//!   HKDF-SHA256 and AES-256-GCM. This is what the native backend offers.
//! - [`seal_emulated`]/[`open_emulated`]: ML-KEM encapsulation, then
//!   HKDF(`hpke-seal`), then an AEAD seal with a random nonce. Backends
//!   without a real HPKE implementation use this.
//!
//! The two are not wire-compatible. A message sealed with one can only be
//! opened with the matching function.

use crate::aead::{aes256gcm_decrypt, aes256gcm_encrypt, AeadCodec};
use crate::kdf::{self, labels};
use crate::kex::{MlKemKeyPair, XWingKeyPair};
use crate::suite::{AeadAlgorithm, KemVariant};
use crate::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// KEM identifier assigned to X-Wing.
pub const KEM_ID_XWING: u16 = 0x647a;

/// HKDF-SHA256 KDF identifier.
pub const KDF_ID_HKDF_SHA256: u16 = 0x0001;

const MODE_BASE: u8 = 0x00;
const VERSION_LABEL: &[u8] = b"HPKE-v1";
const NK: usize = 32;
const NN: usize = 12;

/// Encapsulated key plus ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpkeSealed {
    /// KEM encapsulation sent alongside the ciphertext.
    pub enc: Vec<u8>,
    /// Sealed payload.
    pub ciphertext: Vec<u8>,
}

fn suite_id() -> [u8; 10] {
    let mut id = [0u8; 10];
    id[..4].copy_from_slice(b"HPKE");
    id[4..6].copy_from_slice(&KEM_ID_XWING.to_be_bytes());
    id[6..8].copy_from_slice(&KDF_ID_HKDF_SHA256.to_be_bytes());
    id[8..10].copy_from_slice(&AeadAlgorithm::Aes256Gcm.hpke_id().to_be_bytes());
    id
}

fn labeled_extract(salt: &[u8], label: &[u8], ikm: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut labeled_ikm = Zeroizing::new(Vec::with_capacity(
        VERSION_LABEL.len() + 10 + label.len() + ikm.len(),
    ));
    labeled_ikm.extend_from_slice(VERSION_LABEL);
    labeled_ikm.extend_from_slice(&suite_id());
    labeled_ikm.extend_from_slice(label);
    labeled_ikm.extend_from_slice(ikm);

    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), &labeled_ikm);
    Zeroizing::new(prk.to_vec())
}

fn labeled_expand(prk: &[u8], label: &[u8], info: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let length = u16::try_from(len)
        .map_err(|_| Error::KeyDerivation("HPKE expand length exceeds u16".into()))?;
    let mut labeled_info = Vec::with_capacity(2 + VERSION_LABEL.len() + 10 + label.len() + info.len());
    labeled_info.extend_from_slice(&length.to_be_bytes());
    labeled_info.extend_from_slice(VERSION_LABEL);
    labeled_info.extend_from_slice(&suite_id());
    labeled_info.extend_from_slice(label);
    labeled_info.extend_from_slice(info);

    let hk = Hkdf::<Sha256>::from_prk(prk)
        .map_err(|_| Error::KeyDerivation("HPKE PRK too short".into()))?;
    let mut out = Zeroizing::new(vec![0u8; len]);
    hk.expand(&labeled_info, &mut out)
        .map_err(|_| Error::KeyDerivation("HPKE expand failed".into()))?;
    Ok(out)
}

/// Base-mode key schedule. Returns the AEAD key and base nonce.
fn key_schedule(shared_secret: &[u8], info: &[u8]) -> Result<(Zeroizing<[u8; NK]>, [u8; NN])> {
    let psk_id_hash = labeled_extract(b"", b"psk_id_hash", b"");
    let info_hash = labeled_extract(b"", b"info_hash", info);

    let mut context = Vec::with_capacity(1 + psk_id_hash.len() + info_hash.len());
    context.push(MODE_BASE);
    context.extend_from_slice(&psk_id_hash);
    context.extend_from_slice(&info_hash);

    let secret = labeled_extract(shared_secret, b"secret", b"");
    let key_bytes = labeled_expand(&secret, b"key", &context, NK)?;
    let nonce_bytes = labeled_expand(&secret, b"base_nonce", &context, NN)?;

    let mut key = Zeroizing::new([0u8; NK]);
    key.copy_from_slice(&key_bytes);
    let mut nonce = [0u8; NN];
    nonce.copy_from_slice(&nonce_bytes);
    Ok((key, nonce))
}

/// Single-shot HPKE seal to an X-Wing public key.
pub fn seal(recipient_public: &[u8], info: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<HpkeSealed> {
    let encapsulated = XWingKeyPair::encapsulate(recipient_public)?;
    let (key, nonce) = key_schedule(&*encapsulated.shared_secret, info)?;
    let ciphertext = aes256gcm_encrypt(&key, &nonce, plaintext, aad)?;
    Ok(HpkeSealed {
        enc: encapsulated.ciphertext,
        ciphertext,
    })
}

/// Single-shot HPKE open with the recipient's X-Wing keypair.
///
/// # Errors
/// Returns `Error::Decryption` when `info`, `aad` or the ciphertext do not
/// match what was sealed.
pub fn open(
    recipient: &XWingKeyPair,
    sealed: &HpkeSealed,
    info: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let shared_secret = recipient.decapsulate(&sealed.enc)?;
    let (key, nonce) = key_schedule(&*shared_secret, info)?;
    aes256gcm_decrypt(&key, &nonce, &sealed.ciphertext, aad)
}

/// KEM-then-AEAD seal used where HPKE is unavailable.
///
/// `ciphertext` carries the combined AEAD encoding; `enc` is the ML-KEM
/// ciphertext. An absent `aad` binds [`labels::HPKE_DEFAULT_CONTEXT`].
pub fn seal_emulated(
    variant: KemVariant,
    recipient_public: &[u8],
    aad: Option<&[u8]>,
    plaintext: &[u8],
) -> Result<HpkeSealed> {
    let encapsulated = MlKemKeyPair::encapsulate(variant, recipient_public)?;
    let key = kdf::derive_key(&*encapsulated.shared_secret, None, Some(labels::HPKE_SEAL), 32)?;
    let ciphertext = AeadCodec::default().seal_combined(
        key.as_bytes(),
        plaintext,
        aad.unwrap_or(labels::HPKE_DEFAULT_CONTEXT),
    )?;
    Ok(HpkeSealed {
        enc: encapsulated.ciphertext,
        ciphertext,
    })
}

/// Open a message produced by [`seal_emulated`].
pub fn open_emulated(
    recipient: &MlKemKeyPair,
    sealed: &HpkeSealed,
    aad: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    let shared_secret = recipient.decapsulate(&sealed.enc)?;
    let key = kdf::derive_key(&*shared_secret, None, Some(labels::HPKE_SEAL), 32)?;
    AeadCodec::default().open_combined(
        key.as_bytes(),
        &sealed.ciphertext,
        aad.unwrap_or(labels::HPKE_DEFAULT_CONTEXT),
    )
}
