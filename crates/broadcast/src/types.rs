//! The durable broadcast job record.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use wabridge_common::{MediaKind, MediaPayload};

/// Cached-media reference carried by a job. Field names match the worker's
/// flat media fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub media_path: Option<PathBuf>,
    #[serde(default)]
    pub media_mimetype: Option<String>,
}

impl MediaInfo {
    /// Build the send payload, if this reference actually carries media.
    /// Requires at least a kind and a cache path; the MIME type falls back
    /// to the kind's conventional default.
    pub fn payload(&self, caption: &str) -> Option<MediaPayload> {
        if !self.has_media {
            return None;
        }
        let kind = self.media_type?;
        let path = self.media_path.clone()?;
        let mimetype = self
            .media_mimetype
            .clone()
            .unwrap_or_else(|| default_mimetype(kind).into());
        Some(MediaPayload {
            kind,
            path,
            mimetype,
            caption: caption.to_string(),
        })
    }
}

/// One durable unit of mass-send work. Serialized as a single JSON document;
/// camelCase container fields are the on-disk contract shared with the
/// worker, which may write the record itself before asking for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastJob {
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub media_info: MediaInfo,
    #[serde(default)]
    pub pending_recipients: Vec<String>,
}

impl BroadcastJob {
    /// A fresh active job over `recipients`.
    pub fn new(recipients: Vec<String>, message: Option<String>, media_info: MediaInfo) -> Self {
        Self {
            is_active: true,
            message,
            media_info,
            pending_recipients: recipients,
        }
    }

    /// The media payload for each send, when the job carries media. The job
    /// message doubles as the caption, matching the inbound command shape.
    pub fn payload(&self) -> Option<MediaPayload> {
        self.media_info
            .payload(self.message.as_deref().unwrap_or_default())
    }
}

fn default_mimetype(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image/jpeg",
        MediaKind::Video => "video/mp4",
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shape_matches_contract() {
        let job = BroadcastJob::new(
            vec!["A".into(), "B".into(), "C".into()],
            Some("hi".into()),
            MediaInfo::default(),
        );
        assert_eq!(
            serde_json::to_string(&job).unwrap(),
            r#"{"isActive":true,"message":"hi","mediaInfo":{"has_media":false,"media_type":null,"media_path":null,"media_mimetype":null},"pendingRecipients":["A","B","C"]}"#
        );
    }

    #[test]
    fn test_record_roundtrip() {
        let job = BroadcastJob::new(
            vec!["628@s.whatsapp.net".into()],
            None,
            MediaInfo {
                has_media: true,
                media_type: Some(MediaKind::Video),
                media_path: Some(PathBuf::from("data/k.mp4")),
                media_mimetype: Some("video/mp4".into()),
            },
        );
        let json = serde_json::to_string(&job).unwrap();
        let back: BroadcastJob = serde_json::from_str(&json).unwrap();
        assert_eq!(job, back);
    }

    #[test]
    fn test_worker_written_extra_fields_tolerated() {
        let json = r#"{
            "isActive": true,
            "recipients": ["A", "B"],
            "pendingRecipients": ["B"],
            "message": "promo",
            "mediaInfo": { "has_media": false }
        }"#;
        let job: BroadcastJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.pending_recipients, vec!["B".to_string()]);
        assert_eq!(job.message.as_deref(), Some("promo"));
    }

    #[test]
    fn test_payload_needs_kind_and_path() {
        let mut job = BroadcastJob::new(vec!["A".into()], Some("cap".into()), MediaInfo {
            has_media: true,
            media_type: Some(MediaKind::Image),
            media_path: Some(PathBuf::from("data/x.jpeg")),
            media_mimetype: None,
        });
        let payload = job.payload().unwrap();
        assert_eq!(payload.mimetype, "image/jpeg");
        assert_eq!(payload.caption, "cap");

        job.media_info.media_path = None;
        assert!(job.payload().is_none());

        job.media_info.has_media = false;
        assert!(job.payload().is_none());
    }
}
