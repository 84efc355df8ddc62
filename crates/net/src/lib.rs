//! Gateway connection adapter.
//!
//! The chat network is reached through a gateway sidecar process that owns
//! the wire protocol, the session store, and the credential handshake. This
//! crate speaks JSON frames over a WebSocket to that process and implements
//! the controller's [`ChatConnection`] seam on top of it.
//!
//! [`ChatConnection`]: wabridge_controller::ChatConnection

pub mod connection;
pub mod types;

pub use connection::{GatewayConnection, connect, connect_with_retry};
