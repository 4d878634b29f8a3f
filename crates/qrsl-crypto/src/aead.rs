//! AEAD sealing of application payloads.
//!
//! Implements:
//! - AES-256-GCM (NIST SP 800-38D), the default
//! - ChaCha20-Poly1305 (RFC 8439)
//!
//! Every [`AeadCodec::seal`] draws a fresh 12-byte nonce from the OS RNG.
//! Callers never supply nonces, so a nonce cannot repeat under one key
//! except by RNG collision.
//!
//! The combined wire encoding of a [`SealedBox`] is
//! `nonce (12) ‖ tag (16) ‖ ciphertext`.
//!
//! # Security
//!
//! - Keys must be exactly 32 bytes; anything else is an error, never padded.
//! - A failed open reports only `Decryption`, whatever the cause: wrong
//!   key, tampered tag, ciphertext or associated data.
//! - Opened plaintext is returned in `Zeroizing`.
//!
//! # Example
//!
//! ```
//! use qrsl_crypto::{AeadCodec, SymmetricKey};
//!
//! # fn main() -> Result<(), qrsl_crypto::Error> {
//! let key = SymmetricKey::random(32);
//! let codec = AeadCodec::default();
//!
//! let combined = codec.seal_combined(key.as_bytes(), b"hello", b"header")?;
//! assert_eq!(combined.len(), 12 + 16 + 5);
//!
//! let opened = codec.open_combined(key.as_bytes(), &combined, b"header")?;
//! assert_eq!(&*opened, b"hello");
//!
//! // Associated data is authenticated.
//! assert!(codec.open_combined(key.as_bytes(), &combined, b"other").is_err());
//! # Ok(())
//! # }
//! ```

use crate::suite::AeadAlgorithm;
use crate::{Error, Result};
use rand::RngCore;
use zeroize::Zeroizing;

/// AEAD nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AEAD tag length in bytes.
pub const TAG_LEN: usize = 16;

/// AEAD key length in bytes.
pub const KEY_LEN: usize = 32;

/// Shortest valid combined encoding (empty ciphertext).
pub const MIN_COMBINED_LEN: usize = NONCE_LEN + TAG_LEN;

/// Output of a seal operation with the tag detached from the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Random per-message nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Authentication tag.
    pub tag: [u8; TAG_LEN],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Encode as `nonce ‖ tag ‖ ciphertext`.
    pub fn to_combined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_COMBINED_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decode `nonce ‖ tag ‖ ciphertext`.
    ///
    /// # Errors
    /// Returns `Error::InvalidLength` when fewer than 28 bytes are given.
    pub fn from_combined(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_COMBINED_LEN {
            return Err(Error::InvalidLength {
                expected: MIN_COMBINED_LEN,
                actual: bytes.len(),
            });
        }
        let mut nonce = [0u8; NONCE_LEN];
        let mut tag = [0u8; TAG_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        tag.copy_from_slice(&bytes[NONCE_LEN..MIN_COMBINED_LEN]);
        Ok(Self {
            nonce,
            tag,
            ciphertext: bytes[MIN_COMBINED_LEN..].to_vec(),
        })
    }
}

/// Symmetric seal/open with a session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AeadCodec {
    algorithm: AeadAlgorithm,
}

impl AeadCodec {
    /// Create a codec for the given algorithm.
    pub fn new(algorithm: AeadAlgorithm) -> Self {
        Self { algorithm }
    }

    /// The algorithm this codec uses.
    pub fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under `key` with a fresh random nonce.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyLength` unless `key` is 32 bytes.
    pub fn seal(&self, key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<SealedBox> {
        let key = key_array(key)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut sealed = match self.algorithm {
            AeadAlgorithm::Aes256Gcm => aes256gcm_encrypt(key, &nonce, plaintext, aad)?,
            AeadAlgorithm::ChaCha20Poly1305 => {
                chacha20poly1305_encrypt(key, &nonce, plaintext, aad)?
            }
        };

        let split = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[split..]);
        sealed.truncate(split);

        Ok(SealedBox {
            nonce,
            tag,
            ciphertext: sealed,
        })
    }

    /// Authenticate and decrypt a sealed box.
    ///
    /// # Errors
    /// Returns `Error::Decryption` on any authentication failure. Partial
    /// plaintext is never returned.
    pub fn open(&self, key: &[u8], sealed: &SealedBox, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let key = key_array(key)?;
        let mut joined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
        joined.extend_from_slice(&sealed.ciphertext);
        joined.extend_from_slice(&sealed.tag);

        match self.algorithm {
            AeadAlgorithm::Aes256Gcm => aes256gcm_decrypt(key, &sealed.nonce, &joined, aad),
            AeadAlgorithm::ChaCha20Poly1305 => {
                chacha20poly1305_decrypt(key, &sealed.nonce, &joined, aad)
            }
        }
    }

    /// Seal and return the combined encoding.
    pub fn seal_combined(&self, key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.seal(key, plaintext, aad).map(|sealed| sealed.to_combined())
    }

    /// Open a combined encoding.
    ///
    /// Inputs too short to hold a nonce and tag are reported as
    /// `Error::Decryption`, same as a bad tag.
    pub fn open_combined(&self, key: &[u8], combined: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let sealed = SealedBox::from_combined(combined)
            .map_err(|e| Error::Decryption(format!("malformed sealed box: {}", e)))?;
        self.open(key, &sealed, aad)
    }
}

fn key_array(key: &[u8]) -> Result<&[u8; KEY_LEN]> {
    key.try_into().map_err(|_| {
        Error::InvalidKeyLength(format!("AEAD key must be {} bytes, got {}", KEY_LEN, key.len()))
    })
}

/// Encrypt with ChaCha20-Poly1305. Returns `ciphertext ‖ tag`.
pub fn chacha20poly1305_encrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    use chacha20poly1305::aead::{Aead, KeyInit, Payload};
    use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Encryption("ChaCha20-Poly1305 encryption failed".into()))
}

/// Decrypt `ciphertext ‖ tag` with ChaCha20-Poly1305.
///
/// # Errors
/// Returns `Error::Decryption` if tag verification fails.
pub fn chacha20poly1305_decrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext_and_tag: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    use chacha20poly1305::aead::{Aead, KeyInit, Payload};
    use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext_and_tag,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| Error::Decryption("ChaCha20-Poly1305 authentication failed".into()))
}

/// Encrypt with AES-256-GCM. Returns `ciphertext ‖ tag`.
pub fn aes256gcm_encrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    use aes_gcm::aead::{Aead, KeyInit, Payload};
    use aes_gcm::{Aes256Gcm, Nonce};

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::Encryption("Invalid AES-256-GCM key length".into()))?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Encryption("AES-256-GCM encryption failed".into()))
}

/// Decrypt `ciphertext ‖ tag` with AES-256-GCM.
///
/// # Errors
/// Returns `Error::Decryption` if tag verification fails.
pub fn aes256gcm_decrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext_and_tag: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    use aes_gcm::aead::{Aead, KeyInit, Payload};
    use aes_gcm::{Aes256Gcm, Nonce};

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::Decryption("Invalid AES-256-GCM key length".into()))?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext_and_tag,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| Error::Decryption("AES-256-GCM authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const KEY: [u8; 32] = [0x42; 32];

    fn codecs() -> [AeadCodec; 2] {
        [
            AeadCodec::new(AeadAlgorithm::Aes256Gcm),
            AeadCodec::new(AeadAlgorithm::ChaCha20Poly1305),
        ]
    }

    #[test]
    fn test_default_is_aes256gcm() {
        assert_eq!(AeadCodec::default().algorithm(), AeadAlgorithm::Aes256Gcm);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        for codec in codecs() {
            for len in [0usize, 1, 15, 16, 17, 4096] {
                let plaintext = vec![0x5Au8; len];
                let sealed = codec.seal(&KEY, &plaintext, b"aad").unwrap();
                assert_eq!(sealed.ciphertext.len(), len);
                let opened = codec.open(&KEY, &sealed, b"aad").unwrap();
                assert_eq!(&opened[..], &plaintext[..]);
            }
        }
    }

    /// Test that nonces are never reused across seals under the same key.
    #[test]
    fn test_nonce_unique_per_seal() {
        let codec = AeadCodec::default();
        let mut seen = HashSet::new();
        for _ in 0..512 {
            let sealed = codec.seal(&KEY, b"same plaintext", b"").unwrap();
            assert!(seen.insert(sealed.nonce), "nonce repeated");
        }
    }

    #[test]
    fn test_open_wrong_key() {
        for codec in codecs() {
            let sealed = codec.seal(&KEY, b"secret", b"").unwrap();
            let result = codec.open(&[0x43; 32], &sealed, b"");
            assert!(matches!(result, Err(Error::Decryption(_))));
        }
    }

    #[test]
    fn test_open_wrong_aad() {
        for codec in codecs() {
            let sealed = codec.seal(&KEY, b"secret", b"context-a").unwrap();
            let result = codec.open(&KEY, &sealed, b"context-b");
            assert!(matches!(result, Err(Error::Decryption(_))));
        }
    }

    /// Test that every single-bit flip in the tag or ciphertext is rejected.
    #[test]
    fn test_open_rejects_bit_flips() {
        for codec in codecs() {
            let sealed = codec.seal(&KEY, b"flip me please", b"").unwrap();

            for byte in 0..TAG_LEN {
                for bit in 0..8 {
                    let mut mutated = sealed.clone();
                    mutated.tag[byte] ^= 1 << bit;
                    assert!(matches!(
                        codec.open(&KEY, &mutated, b""),
                        Err(Error::Decryption(_))
                    ));
                }
            }

            for byte in 0..sealed.ciphertext.len() {
                for bit in 0..8 {
                    let mut mutated = sealed.clone();
                    mutated.ciphertext[byte] ^= 1 << bit;
                    assert!(matches!(
                        codec.open(&KEY, &mutated, b""),
                        Err(Error::Decryption(_))
                    ));
                }
            }
        }
    }

    #[test]
    fn test_combined_layout() {
        let codec = AeadCodec::default();
        let sealed = codec.seal(&KEY, b"abc", b"").unwrap();
        let combined = sealed.to_combined();

        assert_eq!(combined.len(), MIN_COMBINED_LEN + 3);
        assert_eq!(&combined[..NONCE_LEN], &sealed.nonce);
        assert_eq!(&combined[NONCE_LEN..MIN_COMBINED_LEN], &sealed.tag);
        assert_eq!(SealedBox::from_combined(&combined).unwrap(), sealed);
    }

    #[test]
    fn test_combined_empty_ciphertext() {
        let codec = AeadCodec::default();
        let combined = codec.seal_combined(&KEY, b"", b"").unwrap();
        assert_eq!(combined.len(), MIN_COMBINED_LEN);
        assert!(codec.open_combined(&KEY, &combined, b"").unwrap().is_empty());
    }

    #[test]
    fn test_combined_too_short() {
        assert!(matches!(
            SealedBox::from_combined(&[0u8; 27]),
            Err(Error::InvalidLength { expected: 28, actual: 27 })
        ));
        assert!(matches!(
            AeadCodec::default().open_combined(&KEY, &[0u8; 10], b""),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_seal_rejects_short_key() {
        let result = AeadCodec::default().seal(&[0u8; 16], b"x", b"");
        assert!(matches!(result, Err(Error::InvalidKeyLength(_))));
    }

    /// Test ChaCha20-Poly1305 against RFC 8439 §2.8.2.
    #[test]
    fn test_chacha20poly1305_rfc8439() {
        let key = hex::decode("808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f")
            .unwrap();
        let nonce = hex::decode("070000004041424344454647").unwrap();
        let aad = hex::decode("50515253c0c1c2c3c4c5c6c7").unwrap();
        let plaintext = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";

        let mut key_arr = [0u8; 32];
        key_arr.copy_from_slice(&key);
        let mut nonce_arr = [0u8; 12];
        nonce_arr.copy_from_slice(&nonce);

        let out = chacha20poly1305_encrypt(&key_arr, &nonce_arr, plaintext, &aad).unwrap();
        let tag = &out[out.len() - TAG_LEN..];
        assert_eq!(hex::encode(tag), "1ae10b594f09e26a7e902ecbd0600691");

        let back = chacha20poly1305_decrypt(&key_arr, &nonce_arr, &out, &aad).unwrap();
        assert_eq!(&back[..], &plaintext[..]);
    }
}
