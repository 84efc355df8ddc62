//! Wire frames exchanged with the gateway sidecar.

use serde::{Deserialize, Serialize};

use wabridge_common::MediaKind;

/// Gateway → bridge frames.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    Connecting,
    /// Credential entry (QR scan / pairing code) is pending on the gateway.
    PairingRequired,
    Connected {
        user: String,
    },
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        logged_out: bool,
    },
    Message {
        from: String,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        text: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        timestamp_ms: i64,
        #[serde(default)]
        media: Option<GatewayMedia>,
    },
    SendResult {
        request_id: u64,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    DownloadResult {
        request_id: u64,
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Attachment descriptor inside a gateway message frame.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayMedia {
    pub message_ref: String,
    pub kind: MediaKind,
    pub mimetype: String,
    #[serde(default)]
    pub content_hash: Option<String>,
}

/// Bridge → gateway frames.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayRequest {
    SendText {
        request_id: u64,
        to: String,
        text: String,
    },
    SendMedia {
        request_id: u64,
        to: String,
        media_type: MediaKind,
        mimetype: String,
        caption: String,
        /// Base64 attachment bytes. This leg is gateway-local; the worker
        /// IPC channel never carries bytes.
        data: String,
    },
    Download {
        request_id: u64,
        message_ref: String,
    },
}
