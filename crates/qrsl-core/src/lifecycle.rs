//! Per-peer session-key lifecycle.
//!
//! [`KeyLifecycleManager`] owns the current session key of every peer
//! together with its derivation time and usage count, all behind one mutex.
//! Rotation replaces the key wholesale. The replaced key is kept only as a
//! draining key that can still open traffic sent before the peer switched,
//! and callers bound how long it stays usable with
//! [`KeyLifecycleManager::draining_key`].

use crate::error::{Error, Result};
use qrsl_crypto::kdf;
use qrsl_crypto::SymmetricKey;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// When a session key must be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    max_key_age: Duration,
    max_usage_count: Option<u64>,
    pre_rotation_window: Duration,
}

impl RotationPolicy {
    /// Build a policy.
    ///
    /// # Errors
    /// `InvalidConfig` unless `pre_rotation_window < max_key_age`.
    pub fn new(
        max_key_age: Duration,
        max_usage_count: Option<u64>,
        pre_rotation_window: Duration,
    ) -> Result<Self> {
        if pre_rotation_window >= max_key_age {
            return Err(Error::InvalidConfig(format!(
                "pre-rotation window {:?} must be shorter than max key age {:?}",
                pre_rotation_window, max_key_age
            )));
        }
        Ok(Self {
            max_key_age,
            max_usage_count,
            pre_rotation_window,
        })
    }

    /// Maximum key age.
    pub fn max_key_age(&self) -> Duration {
        self.max_key_age
    }

    /// Usage cap, if any.
    pub fn max_usage_count(&self) -> Option<u64> {
        self.max_usage_count
    }

    /// Pre-rotation window.
    pub fn pre_rotation_window(&self) -> Duration {
        self.pre_rotation_window
    }

    /// Whether a key of this age and usage is due for rotation.
    ///
    /// The pre-rotation threshold is always the earlier of the two age
    /// checks; both are kept so the rule reads the same as the policy.
    pub fn is_due(&self, age: Duration, usage: u64) -> bool {
        age >= self.max_key_age
            || age >= self.max_key_age - self.pre_rotation_window
            || self.max_usage_count.is_some_and(|max| usage >= max)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_key_age: Duration::from_secs(3600),
            max_usage_count: None,
            pre_rotation_window: Duration::from_secs(300),
        }
    }
}

/// A peer's current session key and when it was derived.
#[derive(Debug, Clone)]
pub struct SessionKeyInfo {
    /// The key.
    pub key: SymmetricKey,
    /// Derivation time.
    pub derived_at: Instant,
    /// `<peer>#<generation>`.
    pub id: String,
}

/// Non-secret view of a peer's key state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    /// Key identifier.
    pub id: String,
    /// Time since derivation.
    pub age: Duration,
    /// Operations performed with the key.
    pub usage: u64,
}

#[derive(Debug)]
struct PeerKeys {
    info: SessionKeyInfo,
    usage: u64,
}

#[derive(Debug)]
struct Retired {
    key: SymmetricKey,
    retired_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    peers: HashMap<String, PeerKeys>,
    retired: HashMap<String, Retired>,
    generations: HashMap<String, u64>,
}

impl Inner {
    fn store(&mut self, peer_id: &str, key: SymmetricKey, now: Instant) -> String {
        let generation = self.generations.entry(peer_id.to_string()).or_insert(0);
        *generation += 1;
        let id = format!("{}#{}", peer_id, generation);
        let replaced = self.peers.insert(
            peer_id.to_string(),
            PeerKeys {
                info: SessionKeyInfo {
                    key,
                    derived_at: now,
                    id: id.clone(),
                },
                usage: 0,
            },
        );
        match replaced {
            Some(old) => {
                self.retired.insert(
                    peer_id.to_string(),
                    Retired {
                        key: old.info.key,
                        retired_at: now,
                    },
                );
            }
            None => {
                self.retired.remove(peer_id);
            }
        }
        id
    }
}

/// Per-peer session keys with rotation accounting.
#[derive(Debug, Default)]
pub struct KeyLifecycleManager {
    policy: RotationPolicy,
    inner: Mutex<Inner>,
}

impl KeyLifecycleManager {
    /// Manager with the given rotation policy.
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The rotation policy.
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `peer_id` needs a new key now.
    pub fn should_rotate(&self, peer_id: &str) -> bool {
        self.should_rotate_at(peer_id, Instant::now())
    }

    /// Whether `peer_id` needs a new key at `now`. True when no key exists.
    pub fn should_rotate_at(&self, peer_id: &str, now: Instant) -> bool {
        match self.lock().peers.get(peer_id) {
            None => true,
            Some(entry) => self
                .policy
                .is_due(now.saturating_duration_since(entry.info.derived_at), entry.usage),
        }
    }

    /// Derive and install a fresh key for `peer_id` from `master`.
    ///
    /// Without a salt a random 32-byte salt is used, so repeated rotations
    /// from the same master never produce the same key.
    pub fn rotate(&self, peer_id: &str, master: &[u8], salt: Option<&[u8]>) -> Result<SymmetricKey> {
        self.rotate_at(peer_id, master, salt, Instant::now())
    }

    /// [`KeyLifecycleManager::rotate`] with an explicit clock.
    pub fn rotate_at(
        &self,
        peer_id: &str,
        master: &[u8],
        salt: Option<&[u8]>,
        now: Instant,
    ) -> Result<SymmetricKey> {
        let mut random_salt = [0u8; 32];
        let salt = match salt {
            Some(salt) => salt,
            None => {
                rand::rngs::OsRng.fill_bytes(&mut random_salt);
                &random_salt
            }
        };
        let key = kdf::derive_session_key(master, Some(salt), peer_id)?;
        let id = self.lock().store(peer_id, key.clone(), now);
        debug!(peer = %peer_id, key_id = %id, "Rotated session key");
        Ok(key)
    }

    /// Install a key produced elsewhere (e.g. by a forward-secret exchange).
    /// Returns the new key id.
    pub fn install(&self, peer_id: &str, key: SymmetricKey) -> String {
        self.install_at(peer_id, key, Instant::now())
    }

    /// [`KeyLifecycleManager::install`] with an explicit clock.
    pub fn install_at(&self, peer_id: &str, key: SymmetricKey, now: Instant) -> String {
        let id = self.lock().store(peer_id, key, now);
        debug!(peer = %peer_id, key_id = %id, "Installed session key");
        id
    }

    /// Count one use of the peer's current key.
    pub fn record_usage(&self, peer_id: &str) {
        if let Some(entry) = self.lock().peers.get_mut(peer_id) {
            entry.usage = entry.usage.saturating_add(1);
        }
    }

    /// The peer's current key, if any.
    pub fn current_key(&self, peer_id: &str) -> Option<SymmetricKey> {
        self.lock().peers.get(peer_id).map(|e| e.info.key.clone())
    }

    /// The peer's current key, or `KeyNotFound`.
    pub fn require_key(&self, peer_id: &str) -> Result<SymmetricKey> {
        self.current_key(peer_id)
            .ok_or_else(|| Error::KeyNotFound(peer_id.to_string()))
    }

    /// The key replaced by the peer's last rotation, if it was retired less
    /// than `drain` before `now`. An expired key is erased on the way out.
    pub fn draining_key(&self, peer_id: &str, now: Instant, drain: Duration) -> Option<SymmetricKey> {
        let mut inner = self.lock();
        let retired = inner.retired.get(peer_id)?;
        if now.saturating_duration_since(retired.retired_at) < drain {
            return Some(retired.key.clone());
        }
        inner.retired.remove(peer_id);
        debug!(peer = %peer_id, "Drain window closed, previous key erased");
        None
    }

    /// Full key info for the peer.
    pub fn key_info(&self, peer_id: &str) -> Option<SessionKeyInfo> {
        self.lock().peers.get(peer_id).map(|e| e.info.clone())
    }

    /// Id, age and usage of the peer's key.
    pub fn status(&self, peer_id: &str) -> Option<KeyStatus> {
        let now = Instant::now();
        self.lock().peers.get(peer_id).map(|e| KeyStatus {
            id: e.info.id.clone(),
            age: now.saturating_duration_since(e.info.derived_at),
            usage: e.usage,
        })
    }

    /// Drop the peer's key, including any draining key.
    pub fn remove(&self, peer_id: &str) -> bool {
        let mut inner = self.lock();
        inner.retired.remove(peer_id);
        inner.peers.remove(peer_id).is_some()
    }

    /// Drop every key.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.peers.clear();
        inner.retired.clear();
    }

    /// Number of peers with a key.
    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    /// True when no peer has a key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
