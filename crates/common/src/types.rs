//! Media types shared between the cache, the IPC frames, and the send paths.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of attachment the network distinguishes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Wire name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// A cached attachment ready to be sent: the bytes live on disk, never in
/// memory between components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub mimetype: String,
    #[serde(default)]
    pub caption: String,
}
