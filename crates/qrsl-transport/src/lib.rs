//! Async runtime for qrsl sessions.
//!
//! - [`Transport`] / [`Connector`]: the boundary to whatever carries frames
//!   (TLS stream, QUIC stream, test loopback)
//! - [`connect_with_retry`]: bounded, fixed-delay connection establishment
//! - [`SessionHandle`]: one actor task per session, with crypto offloaded to
//!   the blocking pool and timers driven by the session's deadlines
//! - [`SessionRegistry`]: peer-to-session routing for inbound frames
//! - [`memory`]: in-process loopback transport for tests and demos

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod memory;
pub mod registry;
pub mod transport;

pub use driver::{SessionEvent, SessionHandle};
pub use error::{Error, Result};
pub use registry::SessionRegistry;
pub use transport::{connect_with_retry, Connector, Transport};
