//! OPC UA client role
//!
//! The server uses a client to register itself with a discovery server.
//! The wire exchange is a black box behind [`DiscoveryChannel`]; the
//! [`Client`] adds connection state, timeouts and error bookkeeping in a
//! lock domain of its own, independent of any server lock.

pub mod channel;
pub mod client;

pub use channel::DiscoveryChannel;
pub use client::{Client, ClientConfig, ConnectionState};
