//! Key derivation functions (HKDF-SHA256).
//!
//! Every derivation in the session layer goes through [`derive_key`] with a
//! distinct `info` label from [`labels`]. Identical input keying material fed
//! through two different labels yields unrelated keys.
//!
//! # Security
//!
//! - Output is capped at 255 blocks (RFC 5869 §2.3); longer requests and
//!   zero-length requests fail rather than truncate.
//! - Derived bytes are `Zeroizing`, and [`SymmetricKey`] equality runs in
//!   constant time through `subtle`.
//! - Without a salt, rotations from the same master repeat their output.
//!   Callers that rotate pass a fresh random salt.
//!
//! # Example
//!
//! ```
//! use qrsl_crypto::kdf::{derive_key, derive_session_key, labels, DEFAULT_KEY_LEN};
//!
//! # fn main() -> Result<(), qrsl_crypto::Error> {
//! let shared = [0x42u8; 32];
//! let session = derive_key(&shared, None, Some(labels::FORWARD_SECRECY), DEFAULT_KEY_LEN)?;
//! assert_eq!(session.len(), 32);
//!
//! // Same input, different label: unrelated key.
//! let sealing = derive_key(&shared, None, Some(labels::HPKE_SEAL), DEFAULT_KEY_LEN)?;
//! assert_ne!(session, sealing);
//!
//! // Per-peer keys are bound to the peer id.
//! let alice = derive_session_key(&shared, Some(b"salt"), "alice")?;
//! let bob = derive_session_key(&shared, Some(b"salt"), "bob")?;
//! assert_ne!(alice, bob);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// SHA-256 output length in bytes.
pub const HASH_LEN: usize = 32;

/// Largest output HKDF-SHA256 can expand to (RFC 5869 §2.3).
pub const MAX_OUTPUT_LEN: usize = 255 * HASH_LEN;

/// Default length of derived session keys.
pub const DEFAULT_KEY_LEN: usize = 32;

/// Domain-separation labels used as HKDF `info`.
pub mod labels {
    /// Prefix for per-peer session keys derived from a master secret.
    pub const SESSION_PREFIX: &str = "session-";

    /// Session keys derived from an ephemeral ECDH agreement.
    pub const FORWARD_SECRECY: &[u8] = b"quantum-forward-secrecy";

    /// AEAD keys for the KEM-based HPKE emulation.
    pub const HPKE_SEAL: &[u8] = b"hpke-seal";

    /// Associated data bound into HPKE seal/open when the caller supplies none.
    pub const HPKE_DEFAULT_CONTEXT: &[u8] = b"qrsl-hpke-default-context";

    /// Build the `session-<peer>` info label.
    pub fn session_info(peer_id: &str) -> Vec<u8> {
        let mut info = Vec::with_capacity(SESSION_PREFIX.len() + peer_id.len());
        info.extend_from_slice(SESSION_PREFIX.as_bytes());
        info.extend_from_slice(peer_id.as_bytes());
        info
    }
}

/// Symmetric key material.
///
/// The bytes are zeroized on drop, `Debug` never prints them, and equality
/// runs in constant time.
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<Vec<u8>>);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Generate a random key of `len` bytes from the OS RNG.
    pub fn random(len: usize) -> Self {
        use rand::RngCore;
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Borrow the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow as a 32-byte AEAD key.
    pub fn as_array(&self) -> Result<&[u8; 32]> {
        self.0.as_slice().try_into().map_err(|_| Error::InvalidLength {
            expected: 32,
            actual: self.0.len(),
        })
    }
}

impl From<Zeroizing<Vec<u8>>> for SymmetricKey {
    fn from(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }
}

impl From<Zeroizing<[u8; 32]>> for SymmetricKey {
    fn from(bytes: Zeroizing<[u8; 32]>) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for SymmetricKey {}

impl core::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SymmetricKey([REDACTED; {}])", self.0.len())
    }
}

/// Generic HKDF-SHA256 key derivation per RFC 5869.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (empty slice for no salt)
/// * `info` - Context and application-specific information
/// * `output_len` - Length of output key material
///
/// # Example
/// ```
/// use qrsl_crypto::kdf::hkdf_sha256;
///
/// let ikm = &[0x0b; 22];
/// let salt = &hex::decode("000102030405060708090a0b0c").unwrap();
/// let info = &hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();
///
/// let okm = hkdf_sha256(ikm, salt, info, 42).unwrap();
/// assert_eq!(okm.len(), 42);
/// ```
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if output_len == 0 || output_len > MAX_OUTPUT_LEN {
        return Err(Error::KeyDerivation(format!(
            "output length {} outside 1..={}",
            output_len, MAX_OUTPUT_LEN
        )));
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new(vec![0u8; output_len]);
    hk.expand(info, &mut okm)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;

    Ok(okm)
}

/// Derive a symmetric key from a master or shared secret.
///
/// An absent salt is treated as the RFC 5869 default (a zero-filled block),
/// an absent info as the empty string. The function is pure: equal inputs
/// always give equal keys.
pub fn derive_key(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: Option<&[u8]>,
    output_len: usize,
) -> Result<SymmetricKey> {
    hkdf_sha256(ikm, salt.unwrap_or(&[]), info.unwrap_or(&[]), output_len).map(SymmetricKey::from)
}

/// Derive the 32-byte session key for `peer_id` from a master secret.
pub fn derive_session_key(master: &[u8], salt: Option<&[u8]>, peer_id: &str) -> Result<SymmetricKey> {
    let info = labels::session_info(peer_id);
    derive_key(master, salt, Some(&info), DEFAULT_KEY_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test HKDF-SHA256 against RFC 5869 Test Case 1.
    #[test]
    fn test_hkdf_rfc5869() {
        let ikm = [0x0b; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let okm = hkdf_sha256(&ikm, &salt, &info, 42).unwrap();

        let expected = hex::decode(
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865",
        )
        .unwrap();
        assert_eq!(&okm[..], &expected[..]);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let master = [0x42u8; 32];
        let a = derive_key(&master, Some(b"salt"), Some(b"info"), 32).unwrap();
        let b = derive_key(&master, Some(b"salt"), Some(b"info"), 32).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_derive_domain_separation() {
        let master = [0x42u8; 32];
        let fs = derive_key(&master, None, Some(labels::FORWARD_SECRECY), 32).unwrap();
        let hpke = derive_key(&master, None, Some(labels::HPKE_SEAL), 32).unwrap();
        let alice = derive_session_key(&master, None, "alice").unwrap();
        let bob = derive_session_key(&master, None, "bob").unwrap();

        assert_ne!(fs, hpke);
        assert_ne!(alice, bob);
        assert_ne!(alice, fs);
    }

    #[test]
    fn test_derive_salt_changes_output() {
        let master = [7u8; 32];
        let a = derive_key(&master, Some(&[1u8; 32]), None, 32).unwrap();
        let b = derive_key(&master, Some(&[2u8; 32]), None, 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_length_bounds() {
        let master = [1u8; 32];
        assert!(derive_key(&master, None, None, MAX_OUTPUT_LEN).is_ok());
        assert!(matches!(
            derive_key(&master, None, None, MAX_OUTPUT_LEN + 1),
            Err(Error::KeyDerivation(_))
        ));
        assert!(matches!(
            derive_key(&master, None, None, 0),
            Err(Error::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_session_info_label() {
        assert_eq!(labels::session_info("peer-7"), b"session-peer-7".to_vec());
    }

    #[test]
    fn test_symmetric_key_debug_redacted() {
        let key = SymmetricKey::from_bytes(&[0xAB; 32]);
        let shown = format!("{:?}", key);
        assert!(!shown.contains("ab") && !shown.contains("171"));
        assert!(shown.contains("REDACTED"));
    }

    #[test]
    fn test_symmetric_key_as_array() {
        assert!(SymmetricKey::from_bytes(&[0u8; 32]).as_array().is_ok());
        assert!(matches!(
            SymmetricKey::from_bytes(&[0u8; 16]).as_array(),
            Err(Error::InvalidLength { expected: 32, actual: 16 })
        ));
    }
}
