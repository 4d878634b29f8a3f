//! Mock implementations for testing.
//!
//! Deterministic, in-memory, and instrumented so tests can assert how
//! often the collaborators were consulted.

use crate::traits::{CapabilityProbe, PlatformVersion, SecretStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use zeroize::Zeroizing;

type Entries = HashMap<(String, String), Zeroizing<Vec<u8>>>;

/// In-memory [`SecretStore`].
///
/// Clones share the same backing map, which lets a test hand one clone to
/// a provider and inspect the other.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    entries: Arc<RwLock<Entries>>,
    reject_imports: Arc<AtomicBool>,
    exports: Arc<AtomicUsize>,
    imports: Arc<AtomicUsize>,
}

impl MemorySecretStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent imports fail, as a locked keychain would.
    pub fn set_reject_imports(&self, reject: bool) {
        self.reject_imports.store(reject, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists.
    pub fn contains(&self, service: &str, account: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(&(service.to_string(), account.to_string())))
            .unwrap_or(false)
    }

    /// Number of `export_key` calls so far.
    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    /// Number of successful `import_key` calls so far.
    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }
}

impl SecretStore for MemorySecretStore {
    fn export_key(&self, service: &str, account: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        self.entries
            .read()
            .ok()?
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }

    fn import_key(&self, data: &[u8], service: &str, account: &str) -> bool {
        if self.reject_imports.load(Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                (service.to_string(), account.to_string()),
                Zeroizing::new(data.to_vec()),
            );
            self.imports.fetch_add(1, Ordering::SeqCst);
            return true;
        }
        false
    }

    fn delete_key(&self, service: &str, account: &str) -> bool {
        self.entries
            .write()
            .map(|mut e| e.remove(&(service.to_string(), account.to_string())).is_some())
            .unwrap_or(false)
    }
}

/// Adjustable [`CapabilityProbe`] that counts how often it is consulted.
#[derive(Clone)]
pub struct MockCapabilityProbe {
    version: Arc<RwLock<PlatformVersion>>,
    legacy: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
}

impl MockCapabilityProbe {
    /// A host with native PQC support.
    pub fn native() -> Self {
        Self::with(PlatformVersion::new(26, 0), true)
    }

    /// An older host with only the legacy bridge.
    pub fn legacy_only() -> Self {
        Self::with(PlatformVersion::new(17, 0), true)
    }

    /// A host with no PQC at all.
    pub fn classical_only() -> Self {
        Self::with(PlatformVersion::new(17, 0), false)
    }

    /// Explicit version and bridge presence.
    pub fn with(version: PlatformVersion, legacy_bridge_linked: bool) -> Self {
        Self {
            version: Arc::new(RwLock::new(version)),
            legacy: Arc::new(AtomicBool::new(legacy_bridge_linked)),
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate an OS upgrade or downgrade.
    pub fn set_version(&self, version: PlatformVersion) {
        if let Ok(mut v) = self.version.write() {
            *v = version;
        }
    }

    /// Simulate the bridge library appearing or disappearing.
    pub fn set_legacy_bridge(&self, linked: bool) {
        self.legacy.store(linked, Ordering::SeqCst);
    }

    /// Number of `platform_version` calls so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl CapabilityProbe for MockCapabilityProbe {
    fn platform_version(&self) -> PlatformVersion {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.version
            .read()
            .map(|v| *v)
            .unwrap_or(PlatformVersion::new(0, 0))
    }

    fn legacy_bridge_linked(&self) -> bool {
        self.legacy.load(Ordering::SeqCst)
    }
}
