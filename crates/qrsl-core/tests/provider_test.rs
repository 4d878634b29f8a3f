// Provider selection, HPKE emulation and hybrid signing policy.

use qrsl_core::provider::{
    BackendKind, ClassicalProvider, CryptoProvider, LegacyBridgeProvider, NativePqcProvider,
    ProviderSelector,
};
use qrsl_core::{Error, HybridSigner, PolicyHandle, PolicySnapshot, Result, SecurityPolicy};
use qrsl_crypto::hpke::HpkeSealed;
use qrsl_crypto::kex::KemOutput;
use qrsl_crypto::{CryptoSuite, KemVariant, SignatureAlgorithm};
use qrsl_platform::mock::{MemorySecretStore, MockCapabilityProbe};
use qrsl_platform::PlatformVersion;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Wraps a provider and counts every call into it.
struct CountingProvider {
    inner: Arc<dyn CryptoProvider>,
    calls: AtomicUsize,
    fail_signing: bool,
}

impl CountingProvider {
    fn new(inner: Arc<dyn CryptoProvider>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_signing: false,
        }
    }

    fn failing(inner: Arc<dyn CryptoProvider>) -> Self {
        Self {
            fail_signing: true,
            ..Self::new(inner)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl CryptoProvider for CountingProvider {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn suite(&self) -> CryptoSuite {
        self.inner.suite()
    }

    fn sign(&self, data: &[u8], peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        self.hit();
        if self.fail_signing {
            return Err(Error::BackendUnavailable("simulated outage".into()));
        }
        self.inner.sign(data, peer_id, algorithm)
    }

    fn verify(&self, data: &[u8], signature: &[u8], peer_id: &str, algorithm: SignatureAlgorithm) -> bool {
        self.hit();
        self.inner.verify(data, signature, peer_id, algorithm)
    }

    fn verifying_key(&self, peer_id: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>> {
        self.hit();
        self.inner.verifying_key(peer_id, algorithm)
    }

    fn import_verifying_key(&self, peer_id: &str, algorithm: SignatureAlgorithm, public_key: &[u8]) -> Result<()> {
        self.hit();
        self.inner.import_verifying_key(peer_id, algorithm, public_key)
    }

    fn kem_encapsulate(&self, peer_id: &str, variant: KemVariant) -> Result<KemOutput> {
        self.hit();
        self.inner.kem_encapsulate(peer_id, variant)
    }

    fn kem_decapsulate(&self, peer_id: &str, encapsulated: &[u8], variant: KemVariant) -> Result<Zeroizing<[u8; 32]>> {
        self.hit();
        self.inner.kem_decapsulate(peer_id, encapsulated, variant)
    }

    fn hpke_seal(&self, peer_id: &str, plaintext: &[u8], aad: Option<&[u8]>) -> Result<HpkeSealed> {
        self.hit();
        self.inner.hpke_seal(peer_id, plaintext, aad)
    }

    fn hpke_open(&self, peer_id: &str, sealed: &HpkeSealed, aad: Option<&[u8]>) -> Result<Zeroizing<Vec<u8>>> {
        self.hit();
        self.inner.hpke_open(peer_id, sealed, aad)
    }
}

// ============================================================================
// HPKE
// ============================================================================

/// The legacy bridge's KEM + HKDF + AEAD emulation round-trips 0, 1 and 4096 bytes.
#[test]
fn test_legacy_hpke_emulation_roundtrip() {
    let store = MemorySecretStore::new();
    let provider = LegacyBridgeProvider::new(Arc::new(store.clone()));

    for len in [0usize, 1, 4096] {
        let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let sealed = provider.hpke_seal("peer", &plaintext, None).unwrap();
        assert_eq!(sealed.ciphertext.len(), 12 + 16 + len, "nonce ‖ tag ‖ ciphertext");

        let opened = provider.hpke_open("peer", &sealed, None).unwrap();
        assert_eq!(&*opened, plaintext.as_slice());
    }
    assert!(store.contains("ML-KEM-768-Priv", "peer"));
}

#[test]
fn test_hpke_tampering_fails_authentication() {
    let providers: [Arc<dyn CryptoProvider>; 2] = [
        Arc::new(NativePqcProvider::new()),
        Arc::new(LegacyBridgeProvider::new(Arc::new(MemorySecretStore::new()))),
    ];
    for provider in providers {
        let sealed = provider.hpke_seal("p", b"attack at dawn", Some(b"ctx")).unwrap();

        let mut flipped = sealed.clone();
        let last = flipped.ciphertext.len() - 1;
        flipped.ciphertext[last] ^= 0x01;
        assert!(matches!(
            provider.hpke_open("p", &flipped, Some(b"ctx")),
            Err(Error::DecryptionFailed)
        ));

        assert!(matches!(
            provider.hpke_open("p", &sealed, None),
            Err(Error::DecryptionFailed)
        ));
    }
}

// ============================================================================
// Hybrid signing policy
// ============================================================================

/// With PQC disabled the PQC provider is never touched, and a classical-only
/// credential verifies.
#[test]
fn test_pqc_disabled_never_calls_pqc_provider() {
    let pqc = Arc::new(CountingProvider::new(Arc::new(NativePqcProvider::new())));
    let signer = HybridSigner::new(
        Arc::new(ClassicalProvider::new()),
        Some(pqc.clone() as Arc<dyn CryptoProvider>),
    );

    let policy = PolicyHandle::new(SecurityPolicy {
        enable_pqc: false,
        ..SecurityPolicy::default()
    });
    let snapshot = policy.snapshot();

    let credential = signer.sign(b"data", "peer", &snapshot).unwrap();
    assert!(credential.pqc.is_none());
    let keys = signer.verifying_keys("peer", &snapshot).unwrap();
    signer.trust("peer", &keys).unwrap();
    assert!(signer.verify(b"data", &credential, "peer", &snapshot));
    assert_eq!(pqc.calls(), 0);
    assert_eq!(signer.stats().classical_only, 1);
}

#[test]
fn test_pqc_failure_degrades_to_classical() {
    let pqc = Arc::new(CountingProvider::failing(Arc::new(NativePqcProvider::new())));
    let signer = HybridSigner::new(
        Arc::new(ClassicalProvider::new()),
        Some(pqc.clone() as Arc<dyn CryptoProvider>),
    );
    let snapshot = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa65);

    let credential = signer.sign(b"data", "peer", &snapshot).unwrap();
    assert!(!credential.is_hybrid());
    assert_eq!(pqc.calls(), 1);
    assert_eq!(signer.stats().pqc_fallbacks, 1);

    assert!(matches!(
        signer.sign(b"data", "peer", &snapshot.requiring_pqc()),
        Err(Error::SignatureFailed(_))
    ));
}

#[test]
fn test_policy_algorithm_names() {
    for (name, expected) in [
        ("ML-DSA-65", SignatureAlgorithm::MlDsa65),
        ("ML-DSA-87", SignatureAlgorithm::MlDsa87),
        ("ECDSA-P256", SignatureAlgorithm::MlDsa65),
        ("unknown", SignatureAlgorithm::MlDsa65),
    ] {
        let handle = PolicyHandle::new(SecurityPolicy {
            pqc_signature_algorithm: name.into(),
            ..SecurityPolicy::default()
        });
        assert_eq!(handle.snapshot().algorithm, expected, "{}", name);
    }
}

// ============================================================================
// Selector
// ============================================================================

#[test]
fn test_selector_drives_signer_backend() {
    let probe = MockCapabilityProbe::classical_only();
    let selector = Arc::new(ProviderSelector::new(
        Arc::new(probe.clone()),
        Arc::new(MemorySecretStore::new()),
    ));
    let signer = HybridSigner::from_selector(Arc::clone(&selector));
    let snapshot = PolicySnapshot::hybrid(SignatureAlgorithm::MlDsa87);

    assert!(!signer.sign(b"m", "p", &snapshot).unwrap().is_hybrid());

    probe.set_legacy_bridge(true);
    assert!(!signer.sign(b"m", "p", &snapshot).unwrap().is_hybrid(), "cached until reload");

    assert_eq!(selector.reload(), BackendKind::LegacyBridge);
    let credential = signer.sign(b"m", "p", &snapshot).unwrap();
    assert!(credential.is_hybrid());
    signer
        .trust("p", &signer.verifying_keys("p", &snapshot).unwrap())
        .unwrap();
    assert!(signer.verify(b"m", &credential, "p", &snapshot));

    probe.set_version(PlatformVersion::new(26, 1));
    assert_eq!(selector.reload(), BackendKind::NativePqc);
    assert_eq!(selector.diagnostics().suite, CryptoSuite::HybridXWing);
}
