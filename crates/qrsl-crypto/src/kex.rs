//! Key agreement and key encapsulation.
//!
//! - ECDH P-256: the ephemeral agreement behind forward-secret session keys
//! - X25519 (RFC 7748): the classical half of X-Wing
//! - ML-KEM-768 / ML-KEM-1024 (FIPS 203)
//! - X-Wing: X25519 + ML-KEM-768 with a SHA3-256 combiner

pub mod ecdh_p256;
pub mod ml_kem;
pub mod x25519;
pub mod xwing;

pub use self::ecdh_p256::EcdhP256KeyPair;
pub use self::ml_kem::{KemOutput, MlKemKeyPair};
pub use self::x25519::X25519KeyPair;
pub use self::xwing::XWingKeyPair;
