//! The bridge controller: turns inbound network events into worker frames,
//! worker commands into network sends, cache reads, and broadcast runs, and
//! reacts to connection-state transitions.

pub mod connection;
pub mod controller;

pub use {
    connection::{ChatConnection, ConnectionState, DisconnectReason, InboundEvent, NetEvent},
    controller::{Bridge, BridgeSettings, Directive, ShutdownReason},
};
