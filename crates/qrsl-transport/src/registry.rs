//! Peer-to-session routing.

use crate::driver::{wait_established, SessionEvent, SessionHandle};
use crate::error::Result;
use crate::transport::{connect_with_retry, Connector, Transport};
use qrsl_core::{SecureSession, SessionContext, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Live sessions keyed by peer.
///
/// All sessions share one [`SessionContext`], so key material for every
/// peer lives in the same lifecycle manager and ephemeral store. Frame
/// routing takes only a read lock.
///
/// Opening, closing and pruning hold `membership` for their whole run.
/// Session secrets are keyed by peer, so an outgoing session must finish
/// erasing them before its replacement generates any.
pub struct SessionRegistry {
    ctx: SessionContext,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    membership: Mutex<()>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRegistry {
    /// Create a registry and the stream of events from its sessions.
    pub fn new(ctx: SessionContext) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let registry = Self {
            ctx,
            sessions: RwLock::new(HashMap::new()),
            membership: Mutex::new(()),
            events,
        };
        (registry, rx)
    }

    /// Shared session services.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Start a session with `peer_id` over an already connected transport.
    ///
    /// An existing session with the same peer is closed, and its key
    /// material erased, before the new session starts.
    pub async fn open(&self, peer_id: &str, transport: Arc<dyn Transport>) -> Result<()> {
        let _membership = self.membership.lock().await;
        if let Some(previous) = self.take(peer_id) {
            debug!(peer = %peer_id, "Replacing existing session");
            previous.close().await;
        }

        let now = tokio::time::Instant::now().into_std();
        let session = SecureSession::new(peer_id, self.ctx.clone(), now);
        let handle = SessionHandle::spawn(session, transport, self.events.clone());
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer_id.to_string(), handle);
        info!(peer = %peer_id, "Session opened");
        Ok(())
    }

    /// Connect through `connector` using the configured retry bound, then
    /// open a session.
    pub async fn connect(&self, connector: &dyn Connector, peer_id: &str) -> Result<()> {
        let config = &self.ctx.config;
        let transport = connect_with_retry(
            connector,
            peer_id,
            config.connect_max_attempts,
            config.connect_retry_delay(),
        )
        .await?;
        self.open(peer_id, transport).await
    }

    /// Hand an inbound frame to the session for `peer_id`.
    ///
    /// # Errors
    /// `PeerNotConnected` when no session exists; `ChannelClosed` when the
    /// session has already terminated.
    pub fn route_frame(&self, peer_id: &str, frame: Vec<u8>) -> Result<()> {
        self.lookup(peer_id, |handle| handle.deliver(frame))?
    }

    /// Encrypt and send application data to `peer_id`.
    pub async fn send(&self, peer_id: &str, data: Vec<u8>) -> Result<()> {
        let sender = self.lookup(peer_id, SessionHandle::sender)?;
        sender.send(data).await
    }

    /// Send an out-of-band heartbeat to `peer_id`.
    pub async fn heartbeat(&self, peer_id: &str) -> Result<()> {
        let sender = self.lookup(peer_id, SessionHandle::sender)?;
        sender.heartbeat().await
    }

    /// Wait until the session with `peer_id` is established.
    pub async fn established(&self, peer_id: &str) -> Result<()> {
        let state = self.lookup(peer_id, SessionHandle::watch_state)?;
        wait_established(state).await
    }

    /// Close the session with `peer_id`. Returns false if there was none.
    pub async fn close(&self, peer_id: &str) -> bool {
        let _membership = self.membership.lock().await;
        match self.take(peer_id) {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every session and drop all remaining key material.
    pub async fn close_all(&self) {
        let _membership = self.membership.lock().await;
        let handles: Vec<SessionHandle> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        let count = handles.len();
        for handle in handles {
            handle.close().await;
        }
        self.ctx.exchange.clear_all();
        self.ctx.lifecycle.clear();
        info!(sessions = count, "All sessions closed");
    }

    /// Remove sessions that have failed or closed on their own.
    pub async fn prune(&self) -> usize {
        let _membership = self.membership.lock().await;
        let dead: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let peers: Vec<String> = sessions
                .iter()
                .filter(|(_, handle)| handle.state().is_terminal())
                .map(|(peer, _)| peer.clone())
                .collect();
            peers.iter().filter_map(|peer| sessions.remove(peer)).collect()
        };
        let count = dead.len();
        for handle in dead {
            handle.close().await;
        }
        count
    }

    /// Peers with a registered session.
    pub fn peers(&self) -> Vec<String> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut peers: Vec<String> = sessions.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// State of the session with `peer_id`.
    pub fn state(&self, peer_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(peer_id).map(SessionHandle::state)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to the handle for `peer_id` under the read lock.
    fn lookup<T>(&self, peer_id: &str, f: impl FnOnce(&SessionHandle) -> T) -> Result<T> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let handle = sessions
            .get(peer_id)
            .ok_or_else(|| qrsl_core::Error::PeerNotConnected(peer_id.to_string()))?;
        Ok(f(handle))
    }

    fn take(&self, peer_id: &str) -> Option<SessionHandle> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer_id)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("peers", &self.peers())
            .finish_non_exhaustive()
    }
}
