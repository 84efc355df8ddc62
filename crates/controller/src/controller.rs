//! Bridge state machine and dispatch.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::sync::mpsc,
    tracing::{debug, error, info, warn},
};

use {
    wabridge_broadcast::{BroadcastJob, Delivery, JobManager, MediaInfo},
    wabridge_common::MediaPayload,
    wabridge_media::{MediaAsset, MediaDownloader, MediaRef, MediaStore},
    wabridge_worker::{OutboundFrame, WorkerCommand, WorkerEvent, WorkerSupervisor},
};

use crate::connection::{ChatConnection, ConnectionState, DisconnectReason, InboundEvent, NetEvent};

/// Why the process must terminate. Emitted over the shutdown channel (for
/// failures detected on spawned tasks) or returned as a [`Directive`]; the
/// binary owns the actual exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A broadcast send failed; the durable record holds the unsent
    /// remainder for a manual resume after restart.
    BroadcastSendFailed,
    /// The network logged this session out for good.
    LoggedOut,
}

/// What the caller should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    /// Rebuild the network session and re-register event handlers.
    Reconnect,
    Shutdown(ShutdownReason),
}

/// Controller knobs, resolved from config by the binary.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Only events whose text begins with this prefix reach the worker.
    pub command_prefix: String,
    /// Settle delay between connection-open and the automatic resume attempt.
    pub resume_settle: Duration,
}

/// The single bridge instance. Owns exclusive references to its connection,
/// supervisor, media store, and job manager; all mutation goes through here.
pub struct Bridge<C: ChatConnection> {
    conn: Arc<C>,
    supervisor: WorkerSupervisor,
    media: Arc<MediaStore>,
    jobs: Arc<JobManager>,
    settings: BridgeSettings,
    state: ConnectionState,
    self_id: Option<String>,
    shutdown_tx: mpsc::UnboundedSender<ShutdownReason>,
}

impl<C: ChatConnection> Bridge<C> {
    pub fn new(
        conn: Arc<C>,
        supervisor: WorkerSupervisor,
        media: Arc<MediaStore>,
        jobs: Arc<JobManager>,
        settings: BridgeSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ShutdownReason>) {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        (
            Self {
                conn,
                supervisor,
                media,
                jobs,
                settings,
                state: ConnectionState::Disconnected,
                self_id: None,
                shutdown_tx,
            },
            shutdown_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Swap in a rebuilt connection after a reconnect. In-flight tasks keep
    /// the old handle until they finish.
    pub fn set_connection(&mut self, conn: Arc<C>) {
        self.conn = conn;
        self.state = ConnectionState::Connecting;
    }

    pub async fn handle_net_event(&mut self, event: NetEvent) -> Directive {
        match event {
            NetEvent::Connecting => {
                self.state = ConnectionState::Connecting;
                debug!("connecting to network");
                Directive::Continue
            },
            NetEvent::AwaitingCredential => {
                self.state = ConnectionState::AwaitingCredential;
                info!("gateway is waiting for credential entry");
                Directive::Continue
            },
            NetEvent::Open { user } => {
                self.on_open(user).await;
                Directive::Continue
            },
            NetEvent::Closed { reason } => self.on_closed(reason).await,
            NetEvent::Inbound(event) => {
                self.on_inbound(event).await;
                Directive::Continue
            },
        }
    }

    async fn on_open(&mut self, user: String) {
        info!(%user, "connected to network");
        self.state = ConnectionState::Open;
        self.self_id = Some(user.clone());

        if let Err(e) = self.supervisor.start().await {
            error!(error = %e, "failed to start worker");
            return;
        }
        self.supervisor.send(&OutboundFrame::connected(&user)).await;

        // Let the session settle, then self-heal any interrupted broadcast.
        // A no-op when nothing is pending; the re-entrancy guard absorbs
        // races with worker-issued runs.
        let jobs = Arc::clone(&self.jobs);
        let delivery = BroadcastDelivery(Arc::clone(&self.conn));
        let shutdown_tx = self.shutdown_tx.clone();
        let settle = self.settings.resume_settle;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            debug!("attempting automatic broadcast resume after reconnect");
            run_job(&jobs, &delivery, &shutdown_tx).await;
        });
    }

    async fn on_closed(&mut self, reason: DisconnectReason) -> Directive {
        self.state = ConnectionState::Closed;
        self.supervisor.stop().await;

        if reason.is_terminal() {
            error!("logged out by the network, no credential left to reconnect with");
            Directive::Shutdown(ShutdownReason::LoggedOut)
        } else {
            warn!(?reason, "connection closed, rebuilding session");
            Directive::Reconnect
        }
    }

    async fn on_inbound(&mut self, event: InboundEvent) {
        if !self.should_forward(&event) {
            return;
        }

        let media = match &event.media {
            Some(media_ref) => match self.resolve_media(media_ref).await {
                Ok(asset) => Some(asset),
                Err(e) => {
                    warn!(error = %e, "media resolution failed, forwarding without media");
                    None
                },
            },
            None => None,
        };

        let frame = OutboundFrame::Message {
            from: event.sender,
            text: event.text,
            name: event.sender_name.unwrap_or_else(|| "Unknown".into()),
            timestamp: event.timestamp,
            has_media: media.is_some(),
            media_type: media.as_ref().map(|a| a.kind),
            media_path: media.as_ref().map(|a| a.path.clone()),
            media_mimetype: media.as_ref().map(|a| a.mimetype.clone()),
        };
        self.supervisor.send(&frame).await;
    }

    /// Inbound filtering: content-free events, self-authored events sent to
    /// other chats (feedback-loop guard), and anything not starting with the
    /// command prefix never reach the worker.
    fn should_forward(&self, event: &InboundEvent) -> bool {
        if event.text.is_empty() && event.media.is_none() {
            return false;
        }
        if event.from_me && self.self_id.as_deref() != Some(event.sender.as_str()) {
            return false;
        }
        event.text.starts_with(&self.settings.command_prefix)
    }

    async fn resolve_media(&self, media_ref: &MediaRef) -> wabridge_media::Result<MediaAsset> {
        let downloader = ConnDownloader(&*self.conn);
        self.media.fetch_or_download(media_ref, &downloader).await
    }

    pub async fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Diagnostic(line) => info!(target: "worker", "{line}"),
            WorkerEvent::Exited { generation } => self.on_worker_exit(generation).await,
            WorkerEvent::Command(command) => self.dispatch(command).await,
        }
    }

    async fn on_worker_exit(&mut self, generation: u64) {
        if !self.supervisor.is_current(generation) {
            debug!("ignoring exit event from a replaced worker instance");
            return;
        }

        let status = self.supervisor.reap().await;
        warn!(?status, "worker exited");

        if self.state == ConnectionState::Open && self.supervisor.restart_on_exit() {
            info!("restarting worker");
            if let Err(e) = self.supervisor.start().await {
                error!(error = %e, "failed to restart worker");
                return;
            }
            if let Some(user) = self.self_id.clone() {
                self.supervisor.send(&OutboundFrame::connected(user)).await;
            }
        }
    }

    async fn dispatch(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Reply { to, text } => {
                if let Err(e) = self.conn.send_text(&to, &text).await {
                    warn!(%to, error = %e, "failed to send reply");
                }
            },
            WorkerCommand::SendMessage {
                to,
                text,
                has_media,
                media_type,
                media_path,
                media_mimetype,
                caption,
            } => {
                let info = MediaInfo {
                    has_media,
                    media_type,
                    media_path,
                    media_mimetype,
                };
                let result = match info.payload(caption.as_deref().unwrap_or(&text)) {
                    Some(payload) => self.conn.send_media(&to, &payload).await,
                    None => self.conn.send_text(&to, &text).await,
                };
                if let Err(e) = result {
                    warn!(%to, error = %e, "failed to send message");
                }
            },
            WorkerCommand::Broadcast {
                recipients,
                text,
                has_media,
                media_type,
                media_path,
                media_mimetype,
                caption,
            } => {
                let message = Some(text).filter(|t| !t.is_empty()).or(caption);
                let job = BroadcastJob::new(recipients, message, MediaInfo {
                    has_media,
                    media_type,
                    media_path,
                    media_mimetype,
                });
                info!(
                    recipients = job.pending_recipients.len(),
                    "installing inline broadcast as a durable job"
                );
                if let Err(e) = self.jobs.install(&job).await {
                    error!(error = %e, "failed to persist broadcast job");
                    return;
                }
                self.spawn_job_run();
            },
            WorkerCommand::StartBroadcastJob | WorkerCommand::ResumeBroadcastJob => {
                self.spawn_job_run();
            },
            WorkerCommand::ClearCache { to } => {
                let reply = match self.media.clear().await {
                    Ok(count) => format!("Media cache cleared: {count} file(s) removed."),
                    Err(e) => {
                        warn!(error = %e, "cache clear failed");
                        "Failed to clear the media cache.".to_string()
                    },
                };
                if let Err(e) = self.conn.send_text(&to, &reply).await {
                    warn!(%to, error = %e, "failed to send cache-clear report");
                }
            },
        }
    }

    /// The runner sleeps between sends, so it must never run on the event
    /// path: spawn it and report fatal outcomes over the shutdown channel.
    fn spawn_job_run(&self) {
        let jobs = Arc::clone(&self.jobs);
        let delivery = BroadcastDelivery(Arc::clone(&self.conn));
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            run_job(&jobs, &delivery, &shutdown_tx).await;
        });
    }
}

async fn run_job<C: ChatConnection>(
    jobs: &JobManager,
    delivery: &BroadcastDelivery<C>,
    shutdown_tx: &mpsc::UnboundedSender<ShutdownReason>,
) {
    match jobs.run(delivery).await {
        Ok(outcome) => debug!(?outcome, "broadcast run finished"),
        Err(e @ wabridge_broadcast::Error::SendFailed { .. }) => {
            error!(error = %e, "fatal broadcast failure, requesting shutdown");
            let _ = shutdown_tx.send(ShutdownReason::BroadcastSendFailed);
        },
        Err(e) => error!(error = %e, "broadcast run errored"),
    }
}

/// Adapter: the job runner's delivery seam over the live connection.
struct BroadcastDelivery<C>(Arc<C>);

#[async_trait]
impl<C: ChatConnection> Delivery for BroadcastDelivery<C> {
    async fn deliver_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
        self.0.send_text(to, text).await
    }

    async fn deliver_media(&self, to: &str, media: &MediaPayload) -> anyhow::Result<()> {
        self.0.send_media(to, media).await
    }
}

/// Adapter: the media cache's download seam over the live connection.
struct ConnDownloader<'a, C>(&'a C);

#[async_trait]
impl<C: ChatConnection> MediaDownloader for ConnDownloader<'_, C> {
    async fn download(&self, media: &MediaRef) -> anyhow::Result<Vec<u8>> {
        self.0.download(media).await
    }
}
