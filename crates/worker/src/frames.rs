//! Frame types for the worker IPC channel: one JSON value per line in each
//! direction.

use std::path::PathBuf;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use wabridge_common::MediaKind;

/// Bridge → worker frames.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Connection status report, sent when the network session opens.
    Connection { status: String, user: String },
    /// One inbound chat message. Media is referenced by cache path; the
    /// channel never carries attachment bytes.
    Message {
        from: String,
        text: String,
        name: String,
        timestamp: DateTime<Utc>,
        has_media: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<MediaKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_path: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_mimetype: Option<String>,
    },
}

impl OutboundFrame {
    /// The status frame announcing an authenticated session.
    pub fn connected(user: impl Into<String>) -> Self {
        Self::Connection {
            status: "connected".into(),
            user: user.into(),
        }
    }
}

/// Worker → bridge command frames.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Reply to the sender of the triggering message.
    Reply { to: String, text: String },
    /// Send to an arbitrary recipient, optionally with cached media.
    SendMessage {
        to: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        has_media: bool,
        #[serde(default)]
        media_type: Option<MediaKind>,
        #[serde(default)]
        media_path: Option<PathBuf>,
        #[serde(default)]
        media_mimetype: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },
    /// Mass send with an inline recipient list. Routed through the durable
    /// job machinery so pacing and partial-failure semantics stay uniform.
    Broadcast {
        recipients: Vec<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        has_media: bool,
        #[serde(default)]
        media_type: Option<MediaKind>,
        #[serde(default)]
        media_path: Option<PathBuf>,
        #[serde(default)]
        media_mimetype: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },
    /// Run the persisted broadcast job from the top of its pending list.
    StartBroadcastJob,
    /// Continue a previously interrupted broadcast job.
    ResumeBroadcastJob,
    /// Clear the media cache and report the outcome to `to`.
    ClearCache { to: String },
}

/// One received line, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    Command(WorkerCommand),
    /// Free-text output; surfaced as a log line, never an error.
    Diagnostic(String),
    /// The worker's one-time startup banner.
    Banner,
}

/// Classify one line from the worker's stdout. Empty and whitespace-only
/// lines yield `None`. Lines that do not decode into a known command are
/// diagnostics; the channel never goes out of sync over them.
pub fn classify(line: &str, banner: Option<&str>) -> Option<InboundLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<WorkerCommand>(line) {
        Ok(command) => Some(InboundLine::Command(command)),
        Err(_) => {
            if banner.is_some_and(|b| line.contains(b)) {
                Some(InboundLine::Banner)
            } else {
                Some(InboundLine::Diagnostic(line.to_string()))
            }
        },
    }
}
