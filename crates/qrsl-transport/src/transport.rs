//! Transport boundary and connection retry.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Carries encoded packets to one peer.
///
/// Inbound frames are pushed by the transport owner into
/// [`crate::SessionRegistry::route_frame`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame.
    async fn send(&self, frame: Vec<u8>) -> Result<()>;
}

/// Establishes transports. Connection setup, TLS and path selection live
/// behind this trait.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `peer_id`.
    async fn connect(&self, peer_id: &str) -> Result<Arc<dyn Transport>>;
}

/// Connect with up to `max_attempts` tries and a fixed `delay` between them.
///
/// Returns the last error once the attempts are used up. A `max_attempts`
/// of zero is treated as one.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    peer_id: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<Arc<dyn Transport>> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match connector.connect(peer_id).await {
            Ok(transport) => {
                debug!(peer = %peer_id, attempt, "Connected");
                return Ok(transport);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(peer = %peer_id, attempts = attempt, error = %e, "Giving up on connection");
                return Err(e);
            }
            Err(e) => {
                debug!(peer = %peer_id, attempt, error = %e, "Connect failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
