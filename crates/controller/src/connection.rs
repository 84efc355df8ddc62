//! The seam to the external network collaborator.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use {wabridge_common::MediaPayload, wabridge_media::MediaRef};

/// Send and download primitives of the network connection. The wire protocol
/// and the session handshake live behind this trait, outside the bridge.
#[async_trait]
pub trait ChatConnection: Send + Sync + 'static {
    async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()>;
    async fn send_media(&self, to: &str, media: &MediaPayload) -> anyhow::Result<()>;
    async fn download(&self, media: &MediaRef) -> anyhow::Result<Vec<u8>>;
}

/// One received chat message. Consumed once, converted into a worker frame,
/// then discarded.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender: String,
    pub text: String,
    pub sender_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
    pub media: Option<MediaRef>,
}

/// Connection-level happenings delivered by the gateway adapter.
#[derive(Debug, Clone)]
pub enum NetEvent {
    Connecting,
    /// The gateway is waiting on credential entry (QR scan, pairing code);
    /// handled outside the bridge.
    AwaitingCredential,
    Open { user: String },
    Closed { reason: DisconnectReason },
    Inbound(InboundEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The network revoked the session; no credential remains to reconnect
    /// with.
    LoggedOut,
    Other(String),
}

impl DisconnectReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// Connection lifecycle as the controller tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingCredential,
    Open,
    Closed,
}
