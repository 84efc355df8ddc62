//! WebSocket client to the gateway sidecar, with request/response
//! correlation over an id → oneshot map.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    anyhow::{Context, Result, anyhow, bail},
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    chrono::{DateTime, Utc},
    futures::{SinkExt, StreamExt},
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use {
    wabridge_common::MediaPayload,
    wabridge_controller::{ChatConnection, DisconnectReason, InboundEvent, NetEvent},
    wabridge_media::MediaRef,
};

use crate::types::{GatewayFrame, GatewayRequest};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<GatewayFrame>>>>;

/// Live connection to the gateway. Cheap to share behind an `Arc`; dropped
/// wholesale on reconnect.
pub struct GatewayConnection {
    writer_tx: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    next_id: AtomicU64,
}

/// Connect once. Returns the connection handle and the stream of network
/// events for the controller.
pub async fn connect(
    url: &str,
) -> Result<(GatewayConnection, mpsc::UnboundedReceiver<NetEvent>)> {
    info!(%url, "connecting to gateway");
    let (ws, _response) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to gateway at {url}"))?;
    let (mut sink, mut stream) = ws.split();

    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let reader_pending = Arc::clone(&pending);
    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_text(text.as_str(), &reader_pending, &events_tx).await;
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {},
                Err(e) => {
                    warn!(error = %e, "gateway socket error");
                    break;
                },
            }
        }
        // Dropping the pending map entries fails any in-flight request; the
        // controller sees the closure as an ordinary reconnectable disconnect.
        reader_pending.lock().await.clear();
        let _ = events_tx.send(NetEvent::Closed {
            reason: DisconnectReason::Other("gateway connection lost".into()),
        });
    });

    Ok((
        GatewayConnection {
            writer_tx,
            pending,
            next_id: AtomicU64::new(1),
        },
        events_rx,
    ))
}

/// Connect with a bounded number of attempts; the gateway process might
/// still be starting.
pub async fn connect_with_retry(
    url: &str,
    attempts: u32,
) -> Result<(GatewayConnection, mpsc::UnboundedReceiver<NetEvent>)> {
    let attempts = attempts.max(1);
    let mut last_err = anyhow!("no connection attempts made");
    for attempt in 1..=attempts {
        match connect(url).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(attempt, error = %e, "gateway connection attempt failed");
                last_err = e;
            },
        }
        if attempt < attempts {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
    Err(last_err)
}

async fn handle_text(
    text: &str,
    pending: &PendingMap,
    events_tx: &mpsc::UnboundedSender<NetEvent>,
) {
    let frame = match serde_json::from_str::<GatewayFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(target: "gateway", error = %e, raw = %text, "unrecognized gateway frame");
            return;
        },
    };

    match frame {
        GatewayFrame::SendResult { request_id, .. }
        | GatewayFrame::DownloadResult { request_id, .. } => {
            if let Some(tx) = pending.lock().await.remove(&request_id) {
                let _ = tx.send(frame);
            } else {
                warn!(request_id, "gateway response for unknown request id");
            }
        },
        other => {
            if let Some(event) = map_event(other) {
                let _ = events_tx.send(event);
            }
        },
    }
}

/// Map a non-response gateway frame onto a controller event.
fn map_event(frame: GatewayFrame) -> Option<NetEvent> {
    match frame {
        GatewayFrame::Connecting => Some(NetEvent::Connecting),
        GatewayFrame::PairingRequired => Some(NetEvent::AwaitingCredential),
        GatewayFrame::Connected { user } => Some(NetEvent::Open { user }),
        GatewayFrame::Disconnected { reason, logged_out } => {
            let reason = if logged_out {
                DisconnectReason::LoggedOut
            } else {
                DisconnectReason::Other(reason.unwrap_or_else(|| "connection closed".into()))
            };
            Some(NetEvent::Closed { reason })
        },
        GatewayFrame::Message {
            from,
            from_me,
            text,
            name,
            timestamp_ms,
            media,
        } => Some(NetEvent::Inbound(InboundEvent {
            sender: from,
            text,
            sender_name: name,
            timestamp: timestamp(timestamp_ms),
            from_me,
            media: media.map(|m| MediaRef {
                message_ref: m.message_ref,
                kind: m.kind,
                mimetype: m.mimetype,
                content_hash: m.content_hash,
            }),
        })),
        GatewayFrame::SendResult { .. } | GatewayFrame::DownloadResult { .. } => None,
    }
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

impl GatewayConnection {
    /// Issue one request and await its correlated response. Requests carry
    /// no client-side timeout: a hang in the network send stalls the caller,
    /// which is the documented behavior for broadcast sends.
    async fn request(&self, request_id: u64, request: &GatewayRequest) -> Result<GatewayFrame> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        let json = serde_json::to_string(request)?;
        if self.writer_tx.send(Message::Text(json.into())).is_err() {
            self.pending.lock().await.remove(&request_id);
            bail!("gateway connection closed");
        }

        rx.await
            .map_err(|_| anyhow!("gateway closed while awaiting response"))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatConnection for GatewayConnection {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let request_id = self.next_id();
        let response = self
            .request(request_id, &GatewayRequest::SendText {
                request_id,
                to: to.into(),
                text: text.into(),
            })
            .await?;

        match response {
            GatewayFrame::SendResult { success: true, .. } => Ok(()),
            GatewayFrame::SendResult { error, .. } => {
                bail!("send rejected: {}", error.unwrap_or_else(|| "unknown".into()))
            },
            other => bail!("unexpected gateway response: {other:?}"),
        }
    }

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<()> {
        let bytes = tokio::fs::read(&media.path)
            .await
            .with_context(|| format!("read cached media {}", media.path.display()))?;
        let request_id = self.next_id();
        let response = self
            .request(request_id, &GatewayRequest::SendMedia {
                request_id,
                to: to.into(),
                media_type: media.kind,
                mimetype: media.mimetype.clone(),
                caption: media.caption.clone(),
                data: BASE64.encode(bytes),
            })
            .await?;

        match response {
            GatewayFrame::SendResult { success: true, .. } => Ok(()),
            GatewayFrame::SendResult { error, .. } => {
                bail!("media send rejected: {}", error.unwrap_or_else(|| "unknown".into()))
            },
            other => bail!("unexpected gateway response: {other:?}"),
        }
    }

    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>> {
        let request_id = self.next_id();
        let response = self
            .request(request_id, &GatewayRequest::Download {
                request_id,
                message_ref: media.message_ref.clone(),
            })
            .await?;

        match response {
            GatewayFrame::DownloadResult {
                data: Some(data), ..
            } => Ok(BASE64.decode(data).context("decode downloaded media")?),
            GatewayFrame::DownloadResult { error, .. } => {
                bail!(
                    "download failed: {}",
                    error.unwrap_or_else(|| "no data returned".into())
                )
            },
            other => bail!("unexpected gateway response: {other:?}"),
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, wabridge_common::MediaKind};

    #[test]
    fn test_map_connected_to_open() {
        let event = map_event(GatewayFrame::Connected {
            user: "me@s.whatsapp.net".into(),
        });
        assert!(matches!(event, Some(NetEvent::Open { user }) if user == "me@s.whatsapp.net"));
    }

    #[test]
    fn test_map_logged_out_is_terminal() {
        let event = map_event(GatewayFrame::Disconnected {
            reason: Some("401".into()),
            logged_out: true,
        });
        let Some(NetEvent::Closed { reason }) = event else {
            panic!("expected closed event");
        };
        assert!(reason.is_terminal());
    }

    #[test]
    fn test_map_ordinary_disconnect_keeps_reason() {
        let event = map_event(GatewayFrame::Disconnected {
            reason: Some("stream errored (515)".into()),
            logged_out: false,
        });
        let Some(NetEvent::Closed { reason }) = event else {
            panic!("expected closed event");
        };
        assert_eq!(
            reason,
            DisconnectReason::Other("stream errored (515)".into())
        );
    }

    #[test]
    fn test_map_message_to_inbound_event() {
        let event = map_event(GatewayFrame::Message {
            from: "62811@s.whatsapp.net".into(),
            from_me: false,
            text: "!help".into(),
            name: Some("Ayu".into()),
            timestamp_ms: 1_714_550_000_000,
            media: Some(crate::types::GatewayMedia {
                message_ref: "3EB0".into(),
                kind: MediaKind::Video,
                mimetype: "video/mp4".into(),
                content_hash: Some("h".into()),
            }),
        });
        let Some(NetEvent::Inbound(event)) = event else {
            panic!("expected inbound event");
        };
        assert_eq!(event.sender, "62811@s.whatsapp.net");
        assert_eq!(event.media.unwrap().kind, MediaKind::Video);
        assert_eq!(event.timestamp.timestamp_millis(), 1_714_550_000_000);
    }

    #[test]
    fn test_bogus_timestamp_falls_back_to_now() {
        let ts = timestamp(i64::MAX);
        assert!(ts <= Utc::now());
    }
}
