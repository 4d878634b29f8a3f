//! In-process loopback transport.
//!
//! [`MemoryTransport::pair`] returns two linked endpoints, each with the
//! receiver for frames sent by the other side. A lossy endpoint silently
//! drops everything it is asked to send.

use crate::error::{Error, Result};
use crate::transport::{Connector, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Frames arriving at one endpoint.
pub type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

/// One end of a loopback link.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    lossy: AtomicBool,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl MemoryTransport {
    /// Create two linked endpoints and their inboxes.
    ///
    /// Frames sent on the first endpoint arrive in the second inbox and vice
    /// versa.
    pub fn pair() -> ((Arc<Self>, Inbox), (Arc<Self>, Inbox)) {
        let (to_b, b_inbox) = mpsc::unbounded_channel();
        let (to_a, a_inbox) = mpsc::unbounded_channel();
        (
            (Arc::new(Self::new(to_b)), a_inbox),
            (Arc::new(Self::new(to_a)), b_inbox),
        )
    }

    fn new(outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            outbound,
            lossy: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Drop (or stop dropping) every outgoing frame.
    pub fn set_lossy(&self, lossy: bool) {
        self.lossy.store(lossy, Ordering::SeqCst);
    }

    /// Frames handed to the other side.
    pub fn frames_sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Frames swallowed while lossy.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        if self.lossy.load(Ordering::SeqCst) {
            trace!(len = frame.len(), "Dropping frame");
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.outbound.send(frame).map_err(|_| Error::ChannelClosed)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fixed transport after failing a configured number of times.
pub struct MemoryConnector {
    transport: Arc<dyn Transport>,
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryConnector {
    /// Always succeeds with `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::failing(transport, 0)
    }

    /// Fails the first `failures` attempts, then succeeds.
    pub fn failing(transport: Arc<dyn Transport>, failures: u32) -> Self {
        Self {
            transport,
            failures_remaining: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    /// Connection attempts seen so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, peer_id: &str) -> Result<Arc<dyn Transport>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::ConnectionFailed(format!(
                "{} unreachable (attempt {})",
                peer_id, attempt
            )));
        }
        Ok(Arc::clone(&self.transport))
    }
}
