//! Platform boundaries for the qrsl session layer.
//!
//! - [`SecretStore`]: opaque persistent key storage keyed by service + account
//! - [`CapabilityProbe`]: what the host can offer (OS PQC support, legacy bridge)
//!
//! [`mock`] holds in-memory implementations for tests and demos;
//! [`probe::StaticCapabilityProbe`] is the production probe fed by the embedding
//! application.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mock;
pub mod probe;
pub mod traits;

pub use error::{Error, Result};
pub use probe::StaticCapabilityProbe;
pub use traits::{service_name, CapabilityProbe, KeyRole, PlatformVersion, SecretStore};
