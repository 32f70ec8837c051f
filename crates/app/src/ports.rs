//! Port definitions: traits that adapters implement.
//!
//! The runtime never talks to a broker directly. Devices push and pull
//! their state through a [`Transport`], provided by an adapter crate.

pub mod transport;

pub use transport::{NullTransport, Transport, TransportError};
