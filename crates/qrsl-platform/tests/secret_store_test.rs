//! Trait contract tests for SecretStore and CapabilityProbe.
//!
//! These tests verify that mock implementations satisfy the trait contracts.

use qrsl_platform::mock::{MemorySecretStore, MockCapabilityProbe};
use qrsl_platform::traits::store_keypair;
use qrsl_platform::{service_name, CapabilityProbe, KeyRole, PlatformVersion, SecretStore};
use std::sync::Arc;

// ============================================================================
// SecretStore Contract Tests
// ============================================================================

#[test]
fn test_secret_store_export_missing_returns_none() {
    let store = MemorySecretStore::new();
    assert!(store.export_key("ML-KEM-768-Priv", "peer-a").is_none());
}

#[test]
fn test_secret_store_import_then_export() {
    let store = MemorySecretStore::new();
    assert!(store.import_key(b"secret bytes", "ML-KEM-768-Priv", "peer-a"));

    let exported = store.export_key("ML-KEM-768-Priv", "peer-a").unwrap();
    assert_eq!(&exported[..], b"secret bytes");
}

#[test]
fn test_secret_store_accounts_are_isolated() {
    let store = MemorySecretStore::new();
    store.import_key(b"a", "ML-DSA-65-Pub", "peer-a");
    store.import_key(b"b", "ML-DSA-65-Pub", "peer-b");

    assert_eq!(&store.export_key("ML-DSA-65-Pub", "peer-a").unwrap()[..], b"a");
    assert_eq!(&store.export_key("ML-DSA-65-Pub", "peer-b").unwrap()[..], b"b");
    assert!(store.export_key("ML-DSA-87-Pub", "peer-a").is_none());
}

#[test]
fn test_secret_store_import_replaces() {
    let store = MemorySecretStore::new();
    store.import_key(b"old", "svc", "acct");
    store.import_key(b"new", "svc", "acct");
    assert_eq!(&store.export_key("svc", "acct").unwrap()[..], b"new");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_secret_store_rejecting_imports() {
    let store = MemorySecretStore::new();
    store.set_reject_imports(true);
    assert!(!store.import_key(b"x", "svc", "acct"));
    assert!(store.is_empty());
}

#[test]
fn test_secret_store_delete() {
    let store = MemorySecretStore::new();
    store.import_key(b"x", "svc", "acct");
    assert!(store.delete_key("svc", "acct"));
    assert!(!store.delete_key("svc", "acct"));
    assert!(!store.contains("svc", "acct"));
}

#[test]
fn test_secret_store_clones_share_state() {
    let store = MemorySecretStore::new();
    let shared: Arc<dyn SecretStore> = Arc::new(store.clone());
    shared.import_key(b"x", "svc", "acct");
    assert!(store.contains("svc", "acct"));
    assert_eq!(store.import_count(), 1);
}

#[test]
fn test_store_keypair_all_or_nothing() {
    let store = MemorySecretStore::new();
    let public = service_name("ML-KEM", "768", KeyRole::Pub);
    let private = service_name("ML-KEM", "768", KeyRole::Priv);

    store_keypair(&store, &public, &private, "peer-a", b"pk", b"sk").unwrap();
    assert!(store.contains(&public, "peer-a"));
    assert!(store.contains(&private, "peer-a"));

    store.set_reject_imports(true);
    assert!(store_keypair(&store, &public, &private, "peer-b", b"pk", b"sk").is_err());
    assert!(!store.contains(&public, "peer-b"));
}

// ============================================================================
// CapabilityProbe Contract Tests
// ============================================================================

#[test]
fn test_probe_native_host() {
    let probe = MockCapabilityProbe::native();
    assert!(probe.native_pqc_available());
    assert!(probe.legacy_bridge_linked());
}

#[test]
fn test_probe_legacy_host() {
    let probe = MockCapabilityProbe::legacy_only();
    assert!(!probe.native_pqc_available());
    assert!(probe.legacy_bridge_linked());
}

#[test]
fn test_probe_classical_host() {
    let probe = MockCapabilityProbe::classical_only();
    assert!(!probe.native_pqc_available());
    assert!(!probe.legacy_bridge_linked());
}

#[test]
fn test_probe_counts_calls_and_tracks_upgrades() {
    let probe = MockCapabilityProbe::legacy_only();
    assert!(!probe.native_pqc_available());

    probe.set_version(PlatformVersion::new(26, 2));
    assert!(probe.native_pqc_available());
    assert_eq!(probe.probe_count(), 2);
}
