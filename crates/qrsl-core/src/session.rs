//! Per-peer secure session state machine.
//!
//! ```text
//! Connecting --transport ready--> Handshaking --keyExchange completed--> Ready
//! Ready --message or time threshold--> Rekeying --rekeyAck | keyExchange--> Ready
//! Rekeying --ack timeout, attempts exhausted--> Ready (cycle abandoned)
//! any --close--> Closed          any --fail / handshake exhausted / idle--> Failed
//! ```
//!
//! The session is sans-IO. Every entry point takes the current [`Instant`]
//! and returns the [`SessionOutput`]s the caller must act on: packets to
//! send, plaintext to deliver, and lifecycle notifications. Timers are
//! expressed through [`SecureSession::next_deadline`] and [`SecureSession::poll`].
//!
//! Inbound dispatch:
//!
//! | type          | accepted in        | effect                                              |
//! |---------------|--------------------|-----------------------------------------------------|
//! | `keyExchange` | Connecting, Handshaking, Rekeying; Ready only while our ephemeral is pending or the peer asked to rekey | answer with our ephemeral if none pending, derive and install the key |
//! | `message`     | Ready, Rekeying    | verify signature if present, decrypt under the current key, then the draining previous key |
//! | `heartbeat`   | any open state     | liveness; optionally counts toward the rekey threshold |
//! | `rekey`       | any open state     | only reply `rekeyAck`; no ephemeral is generated, the accompanying `keyExchange` carries the new handshake |
//! | `rekeyAck`    | Rekeying           | clear the in-flight rekey                           |
//!
//! `keyExchange`, `rekey` and `rekeyAck` are control packets. They are
//! dropped when their timestamp falls outside `max_packet_age`, and unless
//! the outer channel authenticates the peer they must carry a valid
//! signature. That signature also covers the public keys of the exchange
//! that produced the current key, so a control packet from an earlier key
//! epoch never verifies again.

use crate::config::{PolicyHandle, SessionConfig};
use crate::error::{Error, Result};
use crate::forward_secrecy::ForwardSecrecyExchange;
use crate::lifecycle::KeyLifecycleManager;
use crate::packet::{PacketType, SecurePacket};
use crate::signer::{HybridCredential, HybridSigner};
use qrsl_crypto::AeadCodec;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for the transport.
    Connecting,
    /// Ephemeral key sent, waiting for the peer's.
    Handshaking,
    /// Session key installed.
    Ready,
    /// Ready, with a rekey request in flight.
    Rekeying,
    /// Terminal failure.
    Failed,
    /// Closed by the owner.
    Closed,
}

impl SessionState {
    /// Application traffic may flow.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Ready | Self::Rekeying)
    }

    /// No further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Rekeying => "rekeying",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Something the session owner must do.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    /// Encode and transmit this packet.
    Send(SecurePacket),
    /// Hand decrypted application data to the application.
    Deliver(Vec<u8>),
    /// A new session key is installed.
    Established {
        /// Identifier of the installed key.
        key_id: String,
    },
    /// A rekey cycle was given up; traffic continues under the current key.
    RekeyAbandoned {
        /// Rekey requests sent in the abandoned cycle.
        attempts: u32,
    },
    /// The session failed terminally.
    Failed(String),
}

/// Shared services a session runs against.
///
/// The lifecycle manager and the ephemeral exchange are keyed by peer, so
/// one context can serve every session of a process.
#[derive(Clone)]
pub struct SessionContext {
    /// Session keys.
    pub lifecycle: Arc<KeyLifecycleManager>,
    /// Pending ephemeral keys.
    pub exchange: Arc<ForwardSecrecyExchange>,
    /// Packet signing.
    pub signer: Arc<HybridSigner>,
    /// Live security policy.
    pub policy: PolicyHandle,
    /// Timers and thresholds.
    pub config: SessionConfig,
    /// Message encryption.
    pub codec: AeadCodec,
}

impl SessionContext {
    /// Context with fresh key stores, default policy and default config.
    pub fn new(signer: Arc<HybridSigner>) -> Self {
        Self {
            lifecycle: Arc::new(KeyLifecycleManager::default()),
            exchange: Arc::new(ForwardSecrecyExchange::new()),
            signer,
            policy: PolicyHandle::default(),
            config: SessionConfig::default(),
            codec: AeadCodec::default(),
        }
    }

    /// Replace the config.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the policy handle.
    pub fn with_policy(mut self, policy: PolicyHandle) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the message codec.
    pub fn with_codec(mut self, codec: AeadCodec) -> Self {
        self.codec = codec;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Attempts {
    sent: u32,
    deadline: Instant,
}

/// One peer's session.
pub struct SecureSession {
    peer_id: String,
    ctx: SessionContext,
    state: SessionState,
    key_id: Option<String>,
    handshake: Option<Attempts>,
    rekey: Option<Attempts>,
    messages_since_rotation: u64,
    rotated_at: Instant,
    next_heartbeat: Instant,
    last_heartbeat_sent: Option<Instant>,
    last_inbound: Instant,
    /// Public keys (ours, theirs) of the exchange behind the current key.
    epoch: Option<(Vec<u8>, Vec<u8>)>,
    /// Last `keyExchange` we sent, repeated verbatim for a retransmitting peer.
    own_key_exchange: Option<SecurePacket>,
    echoed: bool,
    peer_rekey_requested: bool,
}

impl SecureSession {
    /// New session in `Connecting`.
    pub fn new(peer_id: impl Into<String>, ctx: SessionContext, now: Instant) -> Self {
        let next_heartbeat = now + ctx.config.heartbeat_interval();
        Self {
            peer_id: peer_id.into(),
            ctx,
            state: SessionState::Connecting,
            key_id: None,
            handshake: None,
            rekey: None,
            messages_since_rotation: 0,
            rotated_at: now,
            next_heartbeat,
            last_heartbeat_sent: None,
            last_inbound: now,
            epoch: None,
            own_key_exchange: None,
            echoed: false,
            peer_rekey_requested: false,
        }
    }

    /// Peer identifier.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifier of the installed session key.
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Whether a rekey request awaits its ack.
    pub fn rekey_in_flight(&self) -> bool {
        self.rekey.is_some()
    }

    /// Rekey requests sent in the current cycle.
    pub fn rekey_attempts(&self) -> u32 {
        self.rekey.map_or(0, |r| r.sent)
    }

    /// Messages sent (and, if configured, heartbeats received) since the last rotation.
    pub fn messages_since_rotation(&self) -> u64 {
        self.messages_since_rotation
    }

    /// Shared services.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// The transport is up: send our ephemeral key.
    pub fn on_transport_ready(&mut self, now: Instant) -> Result<Vec<SessionOutput>> {
        if self.state != SessionState::Connecting {
            debug!(peer = %self.peer_id, state = %self.state, "Transport ready ignored");
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        self.last_inbound = now;
        self.transition(SessionState::Handshaking);
        self.send_own_key_exchange(&mut out)?;
        self.handshake = Some(Attempts {
            sent: 1,
            deadline: now + self.ctx.config.handshake_timeout(),
        });
        Ok(out)
    }

    /// Process one inbound packet.
    ///
    /// Forged, missing or malformed signatures on control packets, stale
    /// control packets and unrequested key exchanges drop the packet and
    /// return no outputs.
    ///
    /// # Errors
    /// - `ConnectionClosed` once closed or failed
    /// - `DecryptionFailed` when a message does not open under the session key
    /// - `EphemeralKeyMissing`, `KeyNotFound` or `Crypto` abort only this
    ///   handshake step; the state is left as it was
    pub fn handle_packet(&mut self, packet: SecurePacket, now: Instant) -> Result<Vec<SessionOutput>> {
        if self.state.is_terminal() {
            return Err(Error::ConnectionClosed);
        }
        self.last_inbound = now;
        let mut out = Vec::new();
        match packet.packet_type {
            PacketType::KeyExchange => self.on_key_exchange(&packet, now, &mut out)?,
            PacketType::Message => self.on_message(&packet, now, &mut out)?,
            PacketType::Heartbeat => self.on_heartbeat(now, &mut out)?,
            PacketType::Rekey => self.on_rekey(&packet, &mut out)?,
            PacketType::RekeyAck => self.on_rekey_ack(&packet),
        }
        Ok(out)
    }

    /// Encrypt, sign and frame application data.
    ///
    /// # Errors
    /// `PeerNotConnected` before the handshake completes, `ConnectionClosed`
    /// after close or failure.
    pub fn send_message(&mut self, plaintext: &[u8], now: Instant) -> Result<Vec<SessionOutput>> {
        self.require_established()?;
        let key = self.ctx.lifecycle.require_key(&self.peer_id)?;
        let combined = self
            .ctx
            .codec
            .seal_combined(key.as_bytes(), plaintext, &[])
            .map_err(Error::from_seal)?;
        let packet = self.sign_packet(SecurePacket::message(combined))?;

        self.ctx.lifecycle.record_usage(&self.peer_id);
        self.messages_since_rotation += 1;

        let mut out = vec![SessionOutput::Send(packet)];
        self.maybe_start_rekey(now, &mut out)?;
        Ok(out)
    }

    /// Send a heartbeat now rather than waiting for the interval.
    ///
    /// # Errors
    /// `RateLimited` when called again within `heartbeat_min_spacing`.
    pub fn send_heartbeat(&mut self, now: Instant) -> Result<Vec<SessionOutput>> {
        self.require_established()?;
        if let Some(last) = self.last_heartbeat_sent {
            if now.saturating_duration_since(last) < self.ctx.config.heartbeat_min_spacing() {
                return Err(Error::RateLimited);
            }
        }
        let mut out = Vec::new();
        self.emit_heartbeat(now, &mut out);
        Ok(out)
    }

    /// Run every timer that is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<SessionOutput>> {
        let mut out = Vec::new();
        if self.state.is_terminal() {
            return Ok(out);
        }

        if let Some(idle) = self.ctx.config.peer_idle_timeout() {
            if self.state != SessionState::Connecting
                && now.saturating_duration_since(self.last_inbound) >= idle
            {
                warn!(peer = %self.peer_id, idle_ms = idle.as_millis() as u64, "Peer idle, failing session");
                out.extend(self.fail(Error::HeartbeatTimeout.to_string()));
                return Ok(out);
            }
        }

        if let Some(handshake) = self.handshake {
            if now >= handshake.deadline {
                if handshake.sent >= self.ctx.config.handshake_max_attempts {
                    let reason = format!("handshake timed out after {} attempts", handshake.sent);
                    out.extend(self.fail(reason));
                    return Ok(out);
                }
                debug!(peer = %self.peer_id, attempt = handshake.sent + 1, "Retransmitting key exchange");
                self.send_own_key_exchange(&mut out)?;
                self.handshake = Some(Attempts {
                    sent: handshake.sent + 1,
                    deadline: now + self.ctx.config.handshake_timeout(),
                });
            }
        }

        if let Some(rekey) = self.rekey {
            if now >= rekey.deadline {
                if rekey.sent >= self.ctx.config.rekey_max_attempts {
                    warn!(peer = %self.peer_id, attempts = rekey.sent, "Rekey unacknowledged, abandoning cycle");
                    self.rekey = None;
                    if self.ctx.exchange.discard(&self.peer_id) {
                        debug!(peer = %self.peer_id, "Abandoned rekey ephemeral erased");
                    }
                    self.reset_rotation_counters(now);
                    self.transition(SessionState::Ready);
                    out.push(SessionOutput::RekeyAbandoned {
                        attempts: rekey.sent,
                    });
                } else {
                    debug!(peer = %self.peer_id, attempt = rekey.sent + 1, "Retrying rekey");
                    self.send_rekey_request(&mut out)?;
                    self.rekey = Some(Attempts {
                        sent: rekey.sent + 1,
                        deadline: now + self.ctx.config.rekey_ack_timeout(),
                    });
                }
            }
        }

        if self.state.is_established() && now >= self.next_heartbeat {
            self.emit_heartbeat(now, &mut out);
        }

        self.maybe_start_rekey(now, &mut out)?;
        Ok(out)
    }

    /// Earliest instant at which [`SecureSession::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.state.is_terminal() {
            return None;
        }
        let mut deadlines = Vec::with_capacity(5);
        deadlines.extend(self.handshake.map(|h| h.deadline));
        deadlines.extend(self.rekey.map(|r| r.deadline));
        if self.state.is_established() {
            deadlines.push(self.next_heartbeat);
        }
        if self.state == SessionState::Ready {
            deadlines.push(self.rotated_at + self.ctx.config.rekey_interval());
        }
        if self.state != SessionState::Connecting {
            if let Some(idle) = self.ctx.config.peer_idle_timeout() {
                deadlines.push(self.last_inbound + idle);
            }
        }
        deadlines.into_iter().min()
    }

    /// Close the session and erase its key material.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.erase_secrets();
        self.transition(SessionState::Closed);
    }

    /// Fail the session terminally.
    pub fn fail(&mut self, reason: impl Into<String>) -> Vec<SessionOutput> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        let reason = reason.into();
        warn!(peer = %self.peer_id, reason = %reason, "Session failed");
        self.erase_secrets();
        self.transition(SessionState::Failed);
        vec![SessionOutput::Failed(reason)]
    }

    fn erase_secrets(&mut self) {
        self.ctx.exchange.discard(&self.peer_id);
        self.ctx.lifecycle.remove(&self.peer_id);
        self.handshake = None;
        self.rekey = None;
        self.key_id = None;
        self.epoch = None;
        self.own_key_exchange = None;
        self.peer_rekey_requested = false;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(peer = %self.peer_id, from = %self.state, to = %next, "Session state change");
            self.state = next;
        }
    }

    fn require_established(&self) -> Result<()> {
        match self.state {
            SessionState::Ready | SessionState::Rekeying => Ok(()),
            SessionState::Closed | SessionState::Failed => Err(Error::ConnectionClosed),
            SessionState::Connecting | SessionState::Handshaking => {
                Err(Error::PeerNotConnected(self.peer_id.clone()))
            }
        }
    }

    /// Bytes a control packet's signature covers: the packet's signing
    /// input, then the current epoch's public keys with the sender's first.
    /// Nothing is appended before the first handshake.
    fn control_input(&self, packet: &SecurePacket, outbound: bool) -> Vec<u8> {
        let mut input = packet.signing_input();
        if let Some((local, remote)) = &self.epoch {
            let (first, second) = if outbound { (local, remote) } else { (remote, local) };
            input.extend_from_slice(first);
            input.extend_from_slice(second);
        }
        input
    }

    fn sign_packet(&self, packet: SecurePacket) -> Result<SecurePacket> {
        let input = packet.signing_input();
        self.sign_over(packet, &input)
    }

    fn sign_control(&self, packet: SecurePacket) -> Result<SecurePacket> {
        let input = self.control_input(&packet, true);
        self.sign_over(packet, &input)
    }

    fn sign_over(&self, packet: SecurePacket, input: &[u8]) -> Result<SecurePacket> {
        if self.ctx.config.outer_channel_authenticated {
            return Ok(packet);
        }
        let policy = self.ctx.policy.snapshot();
        let credential = self.ctx.signer.sign(input, &self.peer_id, &policy)?;
        Ok(packet.with_signature(credential.to_bytes()?))
    }

    /// Message signatures are optional; the AEAD tag authenticates the
    /// payload. A present signature must verify.
    fn message_signature_ok(&self, packet: &SecurePacket) -> bool {
        !packet.is_signed() || self.credential_ok(packet, &packet.signing_input())
    }

    /// Control packets must be fresh, and signed unless the outer channel
    /// authenticates the peer.
    fn control_packet_ok(&self, packet: &SecurePacket) -> bool {
        if !packet.is_fresh(self.ctx.config.max_packet_age()) {
            warn!(peer = %self.peer_id, packet_type = %packet.packet_type, timestamp = packet.timestamp, "Stale control packet, dropping");
            return false;
        }
        if !packet.is_signed() {
            if self.ctx.config.outer_channel_authenticated {
                return true;
            }
            warn!(peer = %self.peer_id, packet_type = %packet.packet_type, "Unsigned control packet, dropping");
            return false;
        }
        self.credential_ok(packet, &self.control_input(packet, false))
    }

    fn credential_ok(&self, packet: &SecurePacket, input: &[u8]) -> bool {
        let credential = match HybridCredential::from_bytes(&packet.signature) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(peer = %self.peer_id, packet_type = %packet.packet_type, error = %e, "Malformed signature, dropping packet");
                return false;
            }
        };
        let policy = self.ctx.policy.snapshot();
        if !self.ctx.signer.verify(input, &credential, &self.peer_id, &policy) {
            warn!(peer = %self.peer_id, packet_type = %packet.packet_type, "Signature rejected, dropping packet");
            return false;
        }
        true
    }

    /// Send the pending ephemeral public key, generating one if none is pending.
    fn send_own_key_exchange(&mut self, out: &mut Vec<SessionOutput>) -> Result<()> {
        let public = match self.ctx.exchange.pending_public_key(&self.peer_id) {
            Some(public) => public,
            None => self.ctx.exchange.generate_ephemeral(&self.peer_id),
        };
        let packet = self.sign_control(SecurePacket::key_exchange(public))?;
        self.own_key_exchange = Some(packet.clone());
        out.push(SessionOutput::Send(packet));
        Ok(())
    }

    fn send_rekey_request(&mut self, out: &mut Vec<SessionOutput>) -> Result<()> {
        out.push(SessionOutput::Send(self.sign_control(SecurePacket::rekey())?));
        self.send_own_key_exchange(out)
    }

    fn emit_heartbeat(&mut self, now: Instant, out: &mut Vec<SessionOutput>) {
        out.push(SessionOutput::Send(SecurePacket::heartbeat()));
        self.last_heartbeat_sent = Some(now);
        self.next_heartbeat = now + self.ctx.config.heartbeat_interval();
    }

    fn reset_rotation_counters(&mut self, now: Instant) {
        self.messages_since_rotation = 0;
        self.rotated_at = now;
    }

    fn maybe_start_rekey(&mut self, now: Instant, out: &mut Vec<SessionOutput>) -> Result<()> {
        if self.state != SessionState::Ready || self.rekey.is_some() {
            return Ok(());
        }
        let by_count = self.messages_since_rotation >= self.ctx.config.rekey_message_threshold;
        let by_time =
            now.saturating_duration_since(self.rotated_at) >= self.ctx.config.rekey_interval();
        if !(by_count || by_time) {
            return Ok(());
        }
        info!(
            peer = %self.peer_id,
            messages = self.messages_since_rotation,
            by_time,
            "Starting rekey"
        );
        // Each cycle gets its own ephemeral; retries within it reuse this one.
        self.ctx.exchange.generate_ephemeral(&self.peer_id);
        self.send_rekey_request(out)?;
        self.rekey = Some(Attempts {
            sent: 1,
            deadline: now + self.ctx.config.rekey_ack_timeout(),
        });
        self.transition(SessionState::Rekeying);
        Ok(())
    }

    fn on_key_exchange(
        &mut self,
        packet: &SecurePacket,
        now: Instant,
        out: &mut Vec<SessionOutput>,
    ) -> Result<()> {
        if let Some((local, remote)) = &self.epoch {
            if *remote == packet.data {
                // Peer retransmitted. Repeat our half, signed as first sent,
                // at most once per exchange.
                match &self.own_key_exchange {
                    Some(ours) if !self.echoed && ours.data == *local => {
                        debug!(peer = %self.peer_id, "Duplicate key exchange, repeating our public key");
                        out.push(SessionOutput::Send(ours.clone()));
                        self.echoed = true;
                    }
                    _ => debug!(peer = %self.peer_id, "Duplicate key exchange ignored"),
                }
                return Ok(());
            }
        }
        if !self.control_packet_ok(packet) {
            return Ok(());
        }
        if self.state == SessionState::Ready
            && !self.peer_rekey_requested
            && !self.ctx.exchange.has_pending(&self.peer_id)
        {
            warn!(peer = %self.peer_id, "Unrequested key exchange while ready, dropping");
            return Ok(());
        }

        let mut reply = Vec::new();
        let local_public = match self.ctx.exchange.pending_public_key(&self.peer_id) {
            Some(public) => public,
            None => {
                self.send_own_key_exchange(&mut reply)?;
                self.ctx.exchange.pending_public_key(&self.peer_id).unwrap_or_default()
            }
        };
        let key = self.ctx.exchange.complete_exchange(&self.peer_id, &packet.data)?;
        let key_id = self.ctx.lifecycle.install_at(&self.peer_id, key, now);
        out.append(&mut reply);

        self.epoch = Some((local_public, packet.data.clone()));
        self.echoed = false;
        self.peer_rekey_requested = false;
        self.handshake = None;
        self.rekey = None;
        self.reset_rotation_counters(now);
        self.next_heartbeat = now + self.ctx.config.heartbeat_interval();
        self.key_id = Some(key_id.clone());
        self.transition(SessionState::Ready);
        info!(peer = %self.peer_id, key_id = %key_id, "Session key installed");
        out.push(SessionOutput::Established { key_id });
        Ok(())
    }

    fn on_message(
        &mut self,
        packet: &SecurePacket,
        now: Instant,
        out: &mut Vec<SessionOutput>,
    ) -> Result<()> {
        if !self.state.is_established() {
            warn!(peer = %self.peer_id, state = %self.state, "Message before handshake, dropping");
            return Ok(());
        }
        if !self.message_signature_ok(packet) {
            return Ok(());
        }
        let key = self.ctx.lifecycle.require_key(&self.peer_id)?;
        let plaintext = match self.ctx.codec.open_combined(key.as_bytes(), &packet.data, &[]) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                // Sent under the key this rotation replaced.
                let drained = self
                    .ctx
                    .lifecycle
                    .draining_key(&self.peer_id, now, self.ctx.config.key_drain())
                    .and_then(|previous| {
                        self.ctx
                            .codec
                            .open_combined(previous.as_bytes(), &packet.data, &[])
                            .ok()
                    });
                match drained {
                    Some(plaintext) => {
                        debug!(peer = %self.peer_id, "Message opened under the draining key");
                        plaintext
                    }
                    None => return Err(Error::from_open(e)),
                }
            }
        };
        out.push(SessionOutput::Deliver(plaintext.to_vec()));
        Ok(())
    }

    fn on_heartbeat(&mut self, now: Instant, out: &mut Vec<SessionOutput>) -> Result<()> {
        if self.ctx.config.count_heartbeats_toward_rekey && self.state.is_established() {
            self.messages_since_rotation += 1;
            self.maybe_start_rekey(now, out)?;
        }
        Ok(())
    }

    /// Only acknowledges. The initiator's `keyExchange` follows the request
    /// and is answered by `on_key_exchange`.
    fn on_rekey(&mut self, packet: &SecurePacket, out: &mut Vec<SessionOutput>) -> Result<()> {
        if !self.control_packet_ok(packet) {
            return Ok(());
        }
        debug!(peer = %self.peer_id, "Rekey requested by peer");
        self.peer_rekey_requested = true;
        out.push(SessionOutput::Send(self.sign_control(SecurePacket::rekey_ack())?));
        Ok(())
    }

    fn on_rekey_ack(&mut self, packet: &SecurePacket) {
        if !self.control_packet_ok(packet) {
            return;
        }
        if self.rekey.take().is_some() {
            debug!(peer = %self.peer_id, "Rekey acknowledged");
            if self.state == SessionState::Rekeying {
                self.transition(SessionState::Ready);
            }
        } else {
            debug!(peer = %self.peer_id, "Unsolicited rekeyAck ignored");
        }
    }
}

impl Drop for SecureSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.ctx.exchange.discard(&self.peer_id);
        }
    }
}

impl fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state)
            .field("key_id", &self.key_id)
            .field("rekey_attempts", &self.rekey_attempts())
            .finish_non_exhaustive()
    }
}
