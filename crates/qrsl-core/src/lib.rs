//! Sans-IO core of the qrsl secure session layer.
//!
//! This crate implements:
//! - Key lifecycle: per-peer session keys, rotation policy, usage accounting
//! - Forward secrecy: single-use ephemeral P-256 agreement with erase-on-use
//! - Crypto providers: classical, native PQC and legacy-bridge backends
//!   behind one trait, plus runtime selection with cached capability probing
//! - Hybrid signing: classical + optional ML-DSA credentials
//! - Wire framing: the JSON `SecurePacket` record
//! - The per-peer `SecureSession` state machine (handshake, heartbeat, rekey)
//!
//! No I/O happens here. Sessions consume packets and timestamps and return
//! outputs; `qrsl-transport` drives them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod forward_secrecy;
pub mod lifecycle;
pub mod packet;
pub mod provider;
pub mod session;
pub mod signer;

pub use config::{PolicyHandle, PolicySnapshot, SecurityPolicy, SessionConfig};
pub use error::{Error, Result};
pub use forward_secrecy::ForwardSecrecyExchange;
pub use lifecycle::{KeyLifecycleManager, RotationPolicy};
pub use packet::{PacketType, SecurePacket};
pub use provider::{BackendKind, CryptoProvider, ProviderSelector};
pub use session::{SecureSession, SessionContext, SessionOutput, SessionState};
pub use signer::{HybridCredential, HybridSigner, SignerStats, VerifyingKeys};
