//! Platform integration errors.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Platform errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Platform feature not available.
    #[error("Platform feature not available: {0}")]
    Unavailable(String),

    /// Keystore rejected an import or returned unusable data.
    #[error("Keystore error: {0}")]
    Keystore(String),

    /// Unparseable platform version string.
    #[error("Invalid platform version: {0}")]
    InvalidVersion(String),
}
