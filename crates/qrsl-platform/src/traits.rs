//! Collaborator traits for secret storage and capability probing.

use crate::error::{Error, Result};
use core::fmt;
use core::str::FromStr;
use serde::Deserialize;
use tracing::warn;
use zeroize::Zeroizing;

/// Opaque persistent key storage.
///
/// Entries are addressed by a namespaced `service` string (see
/// [`service_name`]) and an `account`, which is the peer identifier.
///
/// Implementations:
/// - Apple keychain, Android Keystore or an encrypted file in production
/// - [`crate::mock::MemorySecretStore`] in tests
pub trait SecretStore: Send + Sync {
    /// Read an entry. `None` when absent.
    fn export_key(&self, service: &str, account: &str) -> Option<Zeroizing<Vec<u8>>>;

    /// Write an entry, replacing any existing one. Returns `false` on failure.
    fn import_key(&self, data: &[u8], service: &str, account: &str) -> bool;

    /// Remove an entry. Returns `true` if something was removed.
    fn delete_key(&self, service: &str, account: &str) -> bool;
}

/// Import a public/private pair, failing if either write is rejected.
///
/// A rejected private write removes the public half again so the store
/// never holds half a keypair.
pub fn store_keypair(
    store: &dyn SecretStore,
    public_service: &str,
    private_service: &str,
    account: &str,
    public: &[u8],
    private: &[u8],
) -> Result<()> {
    if !store.import_key(public, public_service, account) {
        return Err(Error::Keystore(format!("import of {} rejected", public_service)));
    }
    if !store.import_key(private, private_service, account) {
        warn!(service = %private_service, account = %account, "Private key import rejected, rolling back");
        store.delete_key(public_service, account);
        return Err(Error::Keystore(format!("import of {} rejected", private_service)));
    }
    Ok(())
}

/// Role component of a key-store service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Public half.
    Pub,
    /// Private half.
    Priv,
    /// Derived material kept for the process lifetime (shared secrets, caches).
    Mem,
}

impl KeyRole {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pub => "Pub",
            Self::Priv => "Priv",
            Self::Mem => "Mem",
        }
    }
}

/// Build a `"<Algorithm>-<Variant>-<Role>"` service name, e.g. `ML-DSA-65-Priv`.
pub fn service_name(algorithm: &str, variant: &str, role: KeyRole) -> String {
    format!("{}-{}-{}", algorithm, variant, role.as_str())
}

/// Host OS version as `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct PlatformVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl PlatformVersion {
    /// Construct a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PlatformVersion {
    type Err = Error;

    /// Parse `"26"`, `"26.1"` or `"26.1.3"` (patch is ignored).
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let parse = |part: Option<&str>| -> Result<u32> {
            match part {
                None => Ok(0),
                Some(p) => p.parse().map_err(|_| Error::InvalidVersion(s.to_string())),
            }
        };
        let major = match parts.next() {
            Some(p) if !p.is_empty() => parse(Some(p))?,
            _ => return Err(Error::InvalidVersion(s.to_string())),
        };
        let minor = parse(parts.next())?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for PlatformVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// First OS release whose system crypto library ships ML-KEM, ML-DSA and X-Wing HPKE.
pub const NATIVE_PQC_MIN_VERSION: PlatformVersion = PlatformVersion::new(26, 0);

/// Reports what cryptographic backends the host offers.
///
/// Probing may be expensive; the provider selector calls it once and
/// caches the outcome until an explicit reload.
pub trait CapabilityProbe: Send + Sync {
    /// Running OS version.
    fn platform_version(&self) -> PlatformVersion;

    /// Minimum OS version with native PQC support.
    fn native_pqc_min_version(&self) -> PlatformVersion {
        NATIVE_PQC_MIN_VERSION
    }

    /// Whether the library-bridge PQC implementation is linked in.
    fn legacy_bridge_linked(&self) -> bool;

    /// Whether native PQC is usable on this host.
    fn native_pqc_available(&self) -> bool {
        self.platform_version() >= self.native_pqc_min_version()
    }
}
