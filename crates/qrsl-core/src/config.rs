//! Session timing configuration and the live security policy.

use crate::error::{Error, Result};
use qrsl_crypto::SignatureAlgorithm;
use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::warn;

/// Per-session timing and behaviour knobs.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use qrsl_core::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{"rekey_message_threshold": 100}"#).unwrap();
/// assert_eq!(config.rekey_message_threshold, 100);
/// assert_eq!(config.heartbeat_interval_ms, 30_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Liveness packet interval while ready.
    pub heartbeat_interval_ms: u64,
    /// Minimum spacing between manually requested heartbeats.
    pub heartbeat_min_spacing_ms: u64,
    /// Messages since the last rotation that trigger a rekey.
    pub rekey_message_threshold: u64,
    /// Time since the last rotation that triggers a rekey.
    pub rekey_interval_ms: u64,
    /// How long to wait for `rekeyAck` before retrying.
    pub rekey_ack_timeout_ms: u64,
    /// Rekey requests sent per cycle before giving up on it.
    pub rekey_max_attempts: u32,
    /// How long to wait for the peer's key exchange before resending ours.
    pub handshake_timeout_ms: u64,
    /// Key-exchange transmissions before the handshake fails terminally.
    pub handshake_max_attempts: u32,
    /// Outbound connect attempts.
    pub connect_max_attempts: u32,
    /// Fixed delay between connect attempts.
    pub connect_retry_delay_ms: u64,
    /// Fail the session when nothing arrives from the peer for this long.
    pub peer_idle_timeout_ms: Option<u64>,
    /// The transport already authenticates the channel (e.g. mutual TLS).
    ///
    /// Handshake and message packets then go out with an empty signature.
    pub outer_channel_authenticated: bool,
    /// Count inbound heartbeats toward the message-count rekey threshold.
    pub count_heartbeats_toward_rekey: bool,
    /// Maximum distance between a control packet's timestamp and the local
    /// clock. Older or further-future `keyExchange`, `rekey` and `rekeyAck`
    /// packets are dropped.
    pub max_packet_age_ms: u64,
    /// How long the previous session key still opens inbound messages after
    /// a rotation. Zero disables the drain window.
    pub key_drain_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            heartbeat_min_spacing_ms: 1_000,
            rekey_message_threshold: 500,
            rekey_interval_ms: 900_000,
            rekey_ack_timeout_ms: 5_000,
            rekey_max_attempts: 3,
            handshake_timeout_ms: 5_000,
            handshake_max_attempts: 3,
            connect_max_attempts: 3,
            connect_retry_delay_ms: 2_000,
            peer_idle_timeout_ms: None,
            outer_channel_authenticated: false,
            count_heartbeats_toward_rekey: false,
            max_packet_age_ms: 60_000,
            key_drain_ms: 30_000,
        }
    }
}

impl SessionConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the state machine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("rekey_message_threshold", self.rekey_message_threshold),
            ("rekey_interval_ms", self.rekey_interval_ms),
            ("rekey_ack_timeout_ms", self.rekey_ack_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("rekey_max_attempts", u64::from(self.rekey_max_attempts)),
            ("handshake_max_attempts", u64::from(self.handshake_max_attempts)),
            ("connect_max_attempts", u64::from(self.connect_max_attempts)),
            ("max_packet_age_ms", self.max_packet_age_ms),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }
        if self.heartbeat_min_spacing_ms > self.heartbeat_interval_ms {
            return Err(Error::InvalidConfig(
                "heartbeat_min_spacing_ms exceeds heartbeat_interval_ms".into(),
            ));
        }
        if let Some(idle) = self.peer_idle_timeout_ms {
            if idle <= self.heartbeat_interval_ms {
                return Err(Error::InvalidConfig(
                    "peer_idle_timeout_ms must exceed heartbeat_interval_ms".into(),
                ));
            }
        }
        Ok(())
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Manual heartbeat spacing.
    pub fn heartbeat_min_spacing(&self) -> Duration {
        Duration::from_millis(self.heartbeat_min_spacing_ms)
    }

    /// Time-based rekey threshold.
    pub fn rekey_interval(&self) -> Duration {
        Duration::from_millis(self.rekey_interval_ms)
    }

    /// Rekey ack timeout.
    pub fn rekey_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.rekey_ack_timeout_ms)
    }

    /// Handshake retransmit timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Delay between connect attempts.
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// Control packet freshness window.
    pub fn max_packet_age(&self) -> Duration {
        Duration::from_millis(self.max_packet_age_ms)
    }

    /// Drain window for the previous session key.
    pub fn key_drain(&self) -> Duration {
        Duration::from_millis(self.key_drain_ms)
    }

    /// Idle timeout, if enabled.
    pub fn peer_idle_timeout(&self) -> Option<Duration> {
        self.peer_idle_timeout_ms.map(Duration::from_millis)
    }
}

/// Operator-facing security settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Add PQC signatures and verify them when present.
    pub enable_pqc: bool,
    /// Configuration name of the PQC signature algorithm, e.g. `ML-DSA-65`.
    pub pqc_signature_algorithm: String,
    /// Refuse to fall back to classical-only credentials.
    pub require_pqc: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            enable_pqc: true,
            pqc_signature_algorithm: "ML-DSA-65".into(),
            require_pqc: false,
        }
    }
}

/// Immutable view of the policy for one signing or verification decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// PQC signing and verification enabled.
    pub enable_pqc: bool,
    /// PQC signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// PQC-only operation.
    pub require_pqc: bool,
}

impl PolicySnapshot {
    /// Classical-only snapshot.
    pub fn classical() -> Self {
        Self {
            enable_pqc: false,
            algorithm: SignatureAlgorithm::MlDsa65,
            require_pqc: false,
        }
    }

    /// Hybrid snapshot with the given PQC algorithm.
    pub fn hybrid(algorithm: SignatureAlgorithm) -> Self {
        Self {
            enable_pqc: true,
            algorithm,
            require_pqc: false,
        }
    }

    /// Same snapshot with PQC-only operation required.
    pub fn requiring_pqc(mut self) -> Self {
        self.enable_pqc = true;
        self.require_pqc = true;
        self
    }
}

impl From<&SecurityPolicy> for PolicySnapshot {
    fn from(policy: &SecurityPolicy) -> Self {
        let algorithm = match policy.pqc_signature_algorithm.parse::<SignatureAlgorithm>() {
            Ok(alg) if alg.is_post_quantum() => alg,
            Ok(alg) => {
                warn!(algorithm = %alg, "PQC signature algorithm is classical, using ML-DSA-65");
                SignatureAlgorithm::MlDsa65
            }
            Err(_) => {
                warn!(
                    algorithm = %policy.pqc_signature_algorithm,
                    "Unknown PQC signature algorithm, using ML-DSA-65"
                );
                SignatureAlgorithm::MlDsa65
            }
        };
        Self {
            enable_pqc: policy.enable_pqc,
            algorithm,
            require_pqc: policy.require_pqc,
        }
    }
}

/// Shared, live-updatable security policy.
///
/// Sessions take a [`PolicySnapshot`] at each decision point, so an update
/// applies to the very next signature without restarting anything.
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle {
    inner: Arc<RwLock<SecurityPolicy>>,
}

impl PolicyHandle {
    /// Wrap a policy.
    pub fn new(policy: SecurityPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    /// Current policy as a snapshot.
    pub fn snapshot(&self) -> PolicySnapshot {
        let policy = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        PolicySnapshot::from(&*policy)
    }

    /// Replace the policy.
    pub fn update(&self, policy: SecurityPolicy) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Toggle PQC without touching the other fields.
    pub fn set_pqc_enabled(&self, enabled: bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .enable_pqc = enabled;
    }
}
