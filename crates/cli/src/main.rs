use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    tracing::{error, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    wabridge_broadcast::{AuditLog, FileStore, JobManager, JobStore},
    wabridge_config::{WabridgeConfig, discover_and_load, load_config},
    wabridge_controller::{
        Bridge, BridgeSettings, Directive, DisconnectReason, NetEvent, ShutdownReason,
    },
    wabridge_media::MediaStore,
    wabridge_worker::{WorkerConfig, WorkerSupervisor},
};

#[derive(Parser)]
#[command(
    name = "wabridge",
    about = "Bridge between a chat-network session and an external worker process"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file path (overrides discovery).
    #[arg(long, global = true, env = "WABRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config value).
    #[arg(long, global = true, env = "WABRIDGE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default when no subcommand is provided).
    Run,
    /// Inspect or cancel the persisted broadcast job.
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Media cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// Print the job record: active flag, pending count, payload summary.
    Status,
    /// Delete the job record, abandoning the pending remainder.
    Cancel,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete cached media files; the job record and audit log survive.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config).await,
        Commands::Job {
            action: JobAction::Status,
        } => job_status(&config).await,
        Commands::Job {
            action: JobAction::Cancel,
        } => job_cancel(&config).await,
        Commands::Cache {
            action: CacheAction::Clear,
        } => cache_clear(&config).await,
    }
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn run_bridge(config: WabridgeConfig) -> Result<()> {
    let (supervisor, mut worker_rx) = WorkerSupervisor::new(WorkerConfig {
        program: config.worker.program.clone(),
        args: config.worker.args.clone(),
        startup_banner: config.worker.startup_banner.clone(),
        restart_on_exit: config.worker.restart_on_exit,
    });
    let media = Arc::new(MediaStore::new(config.storage.cache_dir()));
    let jobs = Arc::new(JobManager::new(
        Arc::new(FileStore::new(config.storage.job_path())),
        AuditLog::new(config.storage.audit_path()),
        config.broadcast.delay_range(),
    ));
    let settings = BridgeSettings {
        command_prefix: config.bridge.command_prefix.clone(),
        resume_settle: Duration::from_secs(config.bridge.resume_settle_secs),
    };

    let (conn, mut net_rx) =
        wabridge_net::connect_with_retry(&config.gateway.url, config.gateway.connect_attempts)
            .await?;
    let (mut bridge, mut shutdown_rx) =
        Bridge::new(Arc::new(conn), supervisor, media, jobs, settings);

    loop {
        tokio::select! {
            event = net_rx.recv() => {
                let event = event.unwrap_or(NetEvent::Closed {
                    reason: DisconnectReason::Other("gateway stream ended".into()),
                });
                match bridge.handle_net_event(event).await {
                    Directive::Continue => {},
                    Directive::Reconnect => {
                        let (conn, rx) = wabridge_net::connect_with_retry(
                            &config.gateway.url,
                            config.gateway.connect_attempts,
                        )
                        .await?;
                        net_rx = rx;
                        bridge.set_connection(Arc::new(conn));
                    },
                    Directive::Shutdown(reason) => return finish(reason),
                }
            },
            Some(event) = worker_rx.recv() => {
                bridge.handle_worker_event(event).await;
            },
            Some(reason) = shutdown_rx.recv() => {
                return finish(reason);
            },
        }
    }
}

fn finish(reason: ShutdownReason) -> Result<()> {
    match reason {
        ShutdownReason::LoggedOut => {
            info!("session logged out by the network, exiting");
            Ok(())
        },
        ShutdownReason::BroadcastSendFailed => {
            error!(
                "broadcast send failed; the pending remainder is on disk, \
                 resume with the worker's resume command after restart"
            );
            std::process::exit(1);
        },
    }
}

async fn job_status(config: &WabridgeConfig) -> Result<()> {
    let store = FileStore::new(config.storage.job_path());
    match store.load().await? {
        None => println!("no broadcast job on record"),
        Some(job) => {
            println!("active:  {}", job.is_active);
            println!("pending: {} recipient(s)", job.pending_recipients.len());
            if let Some(message) = &job.message {
                println!("message: {message}");
            }
            println!("media:   {}", job.media_info.has_media);
        },
    }
    Ok(())
}

async fn job_cancel(config: &WabridgeConfig) -> Result<()> {
    let store = FileStore::new(config.storage.job_path());
    if store.delete().await? {
        println!("broadcast job cancelled");
    } else {
        println!("no broadcast job on record");
    }
    Ok(())
}

async fn cache_clear(config: &WabridgeConfig) -> Result<()> {
    let store = MediaStore::new(config.storage.cache_dir());
    let deleted = store.clear().await?;
    println!("{deleted} file(s) removed");
    Ok(())
}
