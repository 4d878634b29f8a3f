//! Runtime backend selection.
//!
//! Order: native PQC when the OS is new enough, then the legacy bridge when
//! it is linked, then nothing (classical only). The probe runs on first use
//! and the outcome is cached until [`ProviderSelector::reload`].

use super::{BackendKind, ClassicalProvider, CryptoProvider, LegacyBridgeProvider, NativePqcProvider};
use qrsl_crypto::CryptoSuite;
use qrsl_platform::{CapabilityProbe, PlatformVersion, SecretStore};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Clone)]
struct Resolved {
    backend: BackendKind,
    provider: Option<Arc<dyn CryptoProvider>>,
    platform_version: PlatformVersion,
}

/// Snapshot of what the selector resolved, for logs and health endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDiagnostics {
    /// Selected backend.
    pub backend: BackendKind,
    /// Suite of the selected backend.
    pub suite: CryptoSuite,
    /// OS version seen by the last probe.
    pub platform_version: PlatformVersion,
    /// Number of probes since construction (first resolution included).
    pub probes: u64,
}

impl fmt::Display for BackendDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backend={} suite={} platform={} probes={}",
            self.backend, self.suite, self.platform_version, self.probes
        )
    }
}

/// Picks and caches the PQC backend.
pub struct ProviderSelector {
    probe: Arc<dyn CapabilityProbe>,
    store: Arc<dyn SecretStore>,
    classical: Arc<ClassicalProvider>,
    resolved: RwLock<Option<Resolved>>,
    probes: AtomicU64,
}

impl ProviderSelector {
    /// Selector over a capability probe and the store used by the legacy bridge.
    pub fn new(probe: Arc<dyn CapabilityProbe>, store: Arc<dyn SecretStore>) -> Self {
        Self {
            probe,
            store,
            classical: Arc::new(ClassicalProvider::new()),
            resolved: RwLock::new(None),
            probes: AtomicU64::new(0),
        }
    }

    fn resolve(&self, previous: Option<&Resolved>) -> Resolved {
        let platform_version = self.probe.platform_version();
        let backend = if platform_version >= self.probe.native_pqc_min_version() {
            BackendKind::NativePqc
        } else if self.probe.legacy_bridge_linked() {
            BackendKind::LegacyBridge
        } else {
            BackendKind::None
        };
        self.probes.fetch_add(1, Ordering::Relaxed);

        let provider = match previous {
            Some(prev) if prev.backend == backend => prev.provider.clone(),
            _ => match backend {
                BackendKind::NativePqc => {
                    Some(Arc::new(NativePqcProvider::new()) as Arc<dyn CryptoProvider>)
                }
                BackendKind::LegacyBridge => Some(Arc::new(LegacyBridgeProvider::new(Arc::clone(
                    &self.store,
                ))) as Arc<dyn CryptoProvider>),
                BackendKind::None => None,
            },
        };
        info!(
            backend = %backend,
            suite = %backend.suite(),
            platform = %platform_version,
            "Resolved crypto backend"
        );
        Resolved {
            backend,
            provider,
            platform_version,
        }
    }

    fn current(&self) -> Resolved {
        if let Some(resolved) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return resolved.clone();
        }
        let mut slot = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(resolved) = slot.as_ref() {
            return resolved.clone();
        }
        let resolved = self.resolve(None);
        *slot = Some(resolved.clone());
        resolved
    }

    /// Selected backend.
    pub fn capabilities(&self) -> BackendKind {
        self.current().backend
    }

    /// Suite of the selected backend.
    pub fn suite(&self) -> CryptoSuite {
        self.current().backend.suite()
    }

    /// The PQC provider, or `None` when running classical only.
    pub fn pqc_provider(&self) -> Option<Arc<dyn CryptoProvider>> {
        self.current().provider
    }

    /// The classical provider. Always available.
    pub fn classical_provider(&self) -> Arc<dyn CryptoProvider> {
        Arc::clone(&self.classical) as Arc<dyn CryptoProvider>
    }

    /// Re-probe the host. Keys survive when the backend does not change.
    pub fn reload(&self) -> BackendKind {
        let mut slot = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        let resolved = self.resolve(slot.as_ref());
        let backend = resolved.backend;
        *slot = Some(resolved);
        backend
    }

    /// What is selected and how often the host was probed.
    pub fn diagnostics(&self) -> BackendDiagnostics {
        let resolved = self.current();
        BackendDiagnostics {
            backend: resolved.backend,
            suite: resolved.backend.suite(),
            platform_version: resolved.platform_version,
            probes: self.probes.load(Ordering::Relaxed),
        }
    }
}
