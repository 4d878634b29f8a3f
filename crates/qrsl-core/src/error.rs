//! Error types for session-layer operations.

use thiserror::Error;

/// Result type alias for session-layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Session-layer errors.
///
/// Verification failures are deliberately absent from most paths: `verify`
/// functions return `false` and the session drops the packet.
/// [`Error::VerificationFailed`] exists for callers that want to surface one.
#[derive(Debug, Error)]
pub enum Error {
    /// No session key for this peer.
    #[error("No session key for peer {0}")]
    KeyNotFound(String),

    /// No pending ephemeral key for this peer (duplicate or late packet).
    #[error("No pending ephemeral key for peer {0}")]
    EphemeralKeyMissing(String),

    /// The backend does not implement the requested algorithm.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No backend able to serve the request is available.
    #[error("Crypto backend unavailable: {0}")]
    BackendUnavailable(String),

    /// AEAD sealing failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD authentication failed.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Signing failed.
    #[error("Signature failed: {0}")]
    SignatureFailed(String),

    /// A signature did not verify.
    #[error("Signature verification failed")]
    VerificationFailed,

    /// No session is registered for this peer, or it is not ready.
    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),

    /// The session is closed or failed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Packet could not be decoded.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Operation not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation called more often than allowed.
    #[error("Rate limited")]
    RateLimited,

    /// Peer sent nothing within the idle timeout.
    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    /// Underlying primitive failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] qrsl_crypto::Error),

    /// Platform collaborator failed.
    #[error("Platform error: {0}")]
    Platform(#[from] qrsl_platform::Error),
}

impl Error {
    /// Map an AEAD open failure onto [`Error::DecryptionFailed`].
    pub fn from_open(err: qrsl_crypto::Error) -> Self {
        match err {
            qrsl_crypto::Error::Decryption(_) => Self::DecryptionFailed,
            other => Self::Crypto(other),
        }
    }

    /// Map an AEAD seal failure onto [`Error::EncryptionFailed`].
    pub fn from_seal(err: qrsl_crypto::Error) -> Self {
        Self::EncryptionFailed(err.to_string())
    }

    /// True for errors that abort one handshake or rekey attempt but leave
    /// the session usable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EphemeralKeyMissing(_) | Self::KeyNotFound(_) | Self::Crypto(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_open_maps_decryption() {
        let err = Error::from_open(qrsl_crypto::Error::Decryption("tag".into()));
        assert!(matches!(err, Error::DecryptionFailed));

        let err = Error::from_open(qrsl_crypto::Error::InvalidKeyLength("short".into()));
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::EphemeralKeyMissing("p".into()).is_retryable());
        assert!(Error::KeyNotFound("p".into()).is_retryable());
        assert!(!Error::ConnectionClosed.is_retryable());
        assert!(!Error::DecryptionFailed.is_retryable());
    }
}
