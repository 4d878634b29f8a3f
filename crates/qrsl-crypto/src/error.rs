//! Errors raised by the primitives in this crate.

use thiserror::Error;

/// Result alias used throughout `qrsl-crypto`.
pub type Result<T> = core::result::Result<T, Error>;

/// Primitive-level failure.
///
/// Messages never include key material. Callers in `qrsl-core` map these to
/// session errors (`Decryption` becomes `DecryptionFailed`, and so on).
#[derive(Debug, Error)]
pub enum Error {
    /// ECDH agreement, X25519 or KEM encapsulation/decapsulation failed.
    #[error("key exchange: {0}")]
    KeyExchange(String),

    /// AEAD seal failed.
    #[error("seal: {0}")]
    Encryption(String),

    /// AEAD authentication failed; no plaintext is released.
    #[error("open: {0}")]
    Decryption(String),

    /// HKDF expand rejected the requested output.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// A fixed-size input had the wrong length.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Algorithm or variant this build does not offer.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Symmetric key of the wrong size for the chosen cipher.
    #[error("bad key length: {0}")]
    InvalidKeyLength(String),

    /// Secret key bytes that do not decode.
    #[error("bad private key: {0}")]
    InvalidPrivateKey(String),

    /// Public key bytes that do not decode or are not on the curve.
    #[error("bad public key: {0}")]
    InvalidPublicKey(String),

    /// Signing failed or a signature could not be decoded.
    #[error("signature: {0}")]
    Signature(String),
}
