//! Crypto backends behind one trait.
//!
//! Three implementations:
//! - [`ClassicalProvider`]: ECDSA P-256 only
//! - [`NativePqcProvider`]: ML-KEM, ML-DSA and X-Wing HPKE held in a
//!   process-lifetime keyring
//! - [`LegacyBridgeProvider`]: the same ML-KEM/ML-DSA operations with keys
//!   persisted through a [`qrsl_platform::SecretStore`] and HPKE emulated as
//!   KEM, then HKDF, then AEAD
//!
//! [`ProviderSelector`] picks one at runtime.
//!
//! Keys are addressed by `(peer, algorithm)`. A signing key is the local
//! identity presented to that peer; the matching verifying key for the peer's
//! own signatures is registered with [`CryptoProvider::import_verifying_key`].
//! KEM and HPKE keypairs are generated per peer on first use.
//!
//! Sealed HPKE payloads are not portable between the native and the legacy
//! backend.

mod classical;
mod keyring;
mod legacy;
mod native;
pub mod selector;

pub use self::classical::ClassicalProvider;
pub use self::legacy::LegacyBridgeProvider;
pub use self::native::NativePqcProvider;
pub use self::selector::{BackendDiagnostics, ProviderSelector};

use crate::error::Result;
use core::fmt;
use qrsl_crypto::hpke::HpkeSealed;
use qrsl_crypto::kex::KemOutput;
use qrsl_crypto::{CryptoSuite, KemVariant, SignatureAlgorithm};
use zeroize::Zeroizing;

/// Which PQC backend is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// No PQC backend; classical only.
    None,
    /// OS-provided PQC.
    NativePqc,
    /// Library-bridge PQC with persisted keys.
    LegacyBridge,
}

impl BackendKind {
    /// Suite offered by this backend.
    pub fn suite(&self) -> CryptoSuite {
        match self {
            Self::None => CryptoSuite::ClassicalP256,
            Self::NativePqc => CryptoSuite::HybridXWing,
            Self::LegacyBridge => CryptoSuite::PqcMlKemMlDsa,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::NativePqc => "native-pqc",
            Self::LegacyBridge => "legacy-bridge",
        };
        f.write_str(name)
    }
}

/// A cryptographic backend.
///
/// `verify` never fails loudly: a missing key, malformed signature or absent
/// backend all yield `false`. Every other operation reports
/// `UnsupportedAlgorithm` for algorithms the backend lacks.
pub trait CryptoProvider: Send + Sync {
    /// Backend identity.
    fn kind(&self) -> BackendKind;

    /// Suite this backend implements.
    fn suite(&self) -> CryptoSuite;

    /// Sign `data` with the local key for `peer_id`, creating it on first use.
    fn sign(&self, data: &[u8], peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>>;

    /// Verify a signature from `peer_id`.
    fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        peer_id: &str,
        algorithm: SignatureAlgorithm,
    ) -> bool;

    /// Public half of the local signing key for `peer_id`, creating it on first use.
    fn verifying_key(&self, peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>>;

    /// Register the public key `peer_id` signs with.
    fn import_verifying_key(
        &self,
        peer_id: &str,
        algorithm: SignatureAlgorithm,
        public_key: &[u8],
    ) -> Result<()>;

    /// Encapsulate a fresh secret to the KEM keypair held for `peer_id`.
    fn kem_encapsulate(&self, peer_id: &str, variant: KemVariant) -> Result<KemOutput>;

    /// Recover a secret encapsulated with [`CryptoProvider::kem_encapsulate`].
    fn kem_decapsulate(
        &self,
        peer_id: &str,
        encapsulated: &[u8],
        variant: KemVariant,
    ) -> Result<Zeroizing<[u8; 32]>>;

    /// Seal `plaintext` to the HPKE keypair held for `peer_id`.
    ///
    /// An absent `aad` binds a fixed default context, identically on both sides.
    fn hpke_seal(&self, peer_id: &str, plaintext: &[u8], aad: Option<&[u8]>) -> Result<HpkeSealed>;

    /// Open a payload sealed with [`CryptoProvider::hpke_seal`].
    fn hpke_open(
        &self,
        peer_id: &str,
        sealed: &HpkeSealed,
        aad: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>>;
}
