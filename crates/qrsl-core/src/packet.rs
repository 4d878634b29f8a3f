//! `SecurePacket` wire framing.
//!
//! Packets travel as a JSON record:
//!
//! ```text
//! {"type":"keyExchange","data":"04ab…","timestamp":1718000000.25,"signature":""}
//! ```
//!
//! Byte fields are lowercase hex. `data` depends on the type: the raw
//! public key for `keyExchange`, the combined `nonce‖tag‖ciphertext` for
//! `message`, and empty for `heartbeat`, `rekey` and `rekeyAck`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Upper bound on an encoded packet accepted by [`SecurePacket::decode`].
pub const MAX_PACKET_LEN: usize = 1 << 20;

/// Packet type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacketType {
    /// Encrypted application payload.
    Message,
    /// Ephemeral public key.
    KeyExchange,
    /// Liveness.
    Heartbeat,
    /// Request a fresh handshake.
    Rekey,
    /// Acknowledge a rekey request.
    RekeyAck,
}

impl PacketType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::KeyExchange => "keyExchange",
            Self::Heartbeat => "heartbeat",
            Self::Rekey => "rekey",
            Self::RekeyAck => "rekeyAck",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurePacket {
    /// Packet type.
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    /// Type-dependent payload.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Seconds since the Unix epoch at creation.
    pub timestamp: f64,
    /// Serialized `HybridCredential`, or empty.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SecurePacket {
    /// Unsigned packet stamped with the current wall-clock time.
    pub fn new(packet_type: PacketType, data: Vec<u8>) -> Self {
        Self {
            packet_type,
            data,
            timestamp: unix_seconds(),
            signature: Vec::new(),
        }
    }

    /// `keyExchange` carrying an ephemeral public key.
    pub fn key_exchange(public_key: Vec<u8>) -> Self {
        Self::new(PacketType::KeyExchange, public_key)
    }

    /// `message` carrying a combined AEAD encoding.
    pub fn message(combined: Vec<u8>) -> Self {
        Self::new(PacketType::Message, combined)
    }

    /// Empty `heartbeat`.
    pub fn heartbeat() -> Self {
        Self::new(PacketType::Heartbeat, Vec::new())
    }

    /// Empty `rekey`.
    pub fn rekey() -> Self {
        Self::new(PacketType::Rekey, Vec::new())
    }

    /// Empty `rekeyAck`.
    pub fn rekey_ack() -> Self {
        Self::new(PacketType::RekeyAck, Vec::new())
    }

    /// Attach a signature.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// True when the packet carries a signature.
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Bytes covered by the packet signature: type name, a zero byte, the
    /// big-endian bits of the timestamp, then data.
    ///
    /// Binding the type stops a signed key exchange from being replayed as a
    /// message and vice versa; binding the timestamp lets the receiver
    /// enforce [`SecurePacket::is_fresh`] on signed packets.
    pub fn signing_input(&self) -> Vec<u8> {
        let tag = self.packet_type.as_str().as_bytes();
        let mut input = Vec::with_capacity(tag.len() + 9 + self.data.len());
        input.extend_from_slice(tag);
        input.push(0);
        input.extend_from_slice(&self.timestamp.to_bits().to_be_bytes());
        input.extend_from_slice(&self.data);
        input
    }

    /// Whether the timestamp is within `max_age` of the local wall clock.
    /// Clock skew is tolerated in both directions.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.is_fresh_at(unix_seconds(), max_age)
    }

    /// [`SecurePacket::is_fresh`] against an explicit Unix time in seconds.
    pub fn is_fresh_at(&self, now_unix: f64, max_age: Duration) -> bool {
        (now_unix - self.timestamp).abs() <= max_age.as_secs_f64()
    }

    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::InvalidPacket(e.to_string()))
    }

    /// Parse JSON bytes.
    ///
    /// # Errors
    /// `InvalidPacket` for oversized input, malformed JSON, unknown types,
    /// bad hex or a non-finite timestamp.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PACKET_LEN {
            return Err(Error::InvalidPacket(format!(
                "{} bytes exceeds limit of {}",
                bytes.len(),
                MAX_PACKET_LEN
            )));
        }
        let packet: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::InvalidPacket(e.to_string()))?;
        if !packet.timestamp.is_finite() {
            return Err(Error::InvalidPacket("timestamp is not finite".into()));
        }
        Ok(packet)
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}
