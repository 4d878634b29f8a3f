//! Cryptographic primitives for the qrsl secure session layer.
//!
//! This crate provides:
//! - HKDF-SHA256 key derivation with fixed domain-separation labels
//! - AEAD sealing (AES-256-GCM, ChaCha20-Poly1305) with random nonces
//! - Key agreement: ECDH P-256, X25519, ML-KEM-768/1024 and the X-Wing hybrid KEM
//! - HPKE base mode over X-Wing
//! - Signatures: ECDSA P-256 and ML-DSA-65/87
//!
//! Secret material is wrapped in `Zeroizing` and erased on drop.
//! Constant-time comparisons go through the `subtle` crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod hpke;
pub mod kdf;
pub mod kex;
pub mod sign;
pub mod suite;

pub use aead::{AeadCodec, SealedBox};
pub use error::{Error, Result};
pub use kdf::SymmetricKey;
pub use suite::{AeadAlgorithm, CryptoSuite, KemVariant, SignatureAlgorithm};
