//! Worker process lifecycle: spawn, replace, stop, and stdio plumbing.

use std::process::Stdio;

use {
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStdin, Command},
        sync::mpsc,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    error::{Error, Result},
    frames::{InboundLine, OutboundFrame, WorkerCommand, classify},
};

/// How to run the worker executable.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// One-time startup banner filtered from the diagnostic stream.
    pub startup_banner: Option<String>,
    /// Restart the worker when it exits while the connection is open.
    /// Intentional stops never trigger a restart regardless of this flag.
    pub restart_on_exit: bool,
}

/// Events surfaced to the controller from the running worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Command(WorkerCommand),
    /// Free-text stdout line, forwarded in receipt order.
    Diagnostic(String),
    /// The worker's stdout closed. Stale generations belong to an instance
    /// that was already replaced or intentionally stopped.
    Exited { generation: u64 },
}

/// Owns at most one worker child process at a time.
pub struct WorkerSupervisor {
    config: WorkerConfig,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    generation: u64,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerConfig) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                events_tx,
                child: None,
                stdin: None,
                generation: 0,
            },
            events_rx,
        )
    }

    pub fn restart_on_exit(&self) -> bool {
        self.config.restart_on_exit
    }

    /// Whether an exit event belongs to the currently running instance.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Check if the worker process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.as_mut().map(Child::try_wait), Some(Ok(None)))
    }

    /// Spawn the worker, killing and replacing any prior instance first.
    pub async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            info!("replacing running worker instance");
            self.stop().await;
        }

        self.generation += 1;
        let generation = self.generation;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: self.config.program.clone(),
            source,
        })?;

        self.stdin = child.stdin.take();

        if let Some(stdout) = child.stdout.take() {
            let tx = self.events_tx.clone();
            let banner = self.config.startup_banner.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match classify(&line, banner.as_deref()) {
                        None => {},
                        Some(InboundLine::Banner) => {
                            debug!(target: "worker", "{}", line.trim());
                        },
                        Some(InboundLine::Command(command)) => {
                            if tx.send(WorkerEvent::Command(command)).is_err() {
                                break;
                            }
                        },
                        Some(InboundLine::Diagnostic(text)) => {
                            if tx.send(WorkerEvent::Diagnostic(text)).is_err() {
                                break;
                            }
                        },
                    }
                }
                let _ = tx.send(WorkerEvent::Exited { generation });
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        warn!(target: "worker", "{trimmed}");
                    }
                }
            });
        }

        info!(
            program = %self.config.program,
            pid = child.id(),
            "worker started"
        );
        self.child = Some(child);
        Ok(())
    }

    /// Write one frame as a single line to the worker's stdin. A no-op when
    /// no worker is running: frames generated while the worker is down are
    /// dropped, never queued. The worker is stateless from the bridge's
    /// perspective except for the durable broadcast job.
    pub async fn send(&mut self, frame: &OutboundFrame) {
        let Some(stdin) = self.stdin.as_mut() else {
            trace!("worker not running, dropping outbound frame");
            return;
        };

        let mut line = match serde_json::to_string(frame) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound frame");
                return;
            },
        };
        line.push('\n');

        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(error = %e, "worker stdin closed, dropping outbound frame");
            self.stdin = None;
            return;
        }
        if let Err(e) = stdin.flush().await {
            warn!(error = %e, "worker stdin closed, dropping outbound frame");
            self.stdin = None;
        }
    }

    /// Terminate the child if present. Exit events of the stopped instance
    /// become stale, so an intentional stop never looks like a crash.
    pub async fn stop(&mut self) {
        self.stdin = None;
        self.generation += 1;

        let Some(mut child) = self.child.take() else {
            return;
        };
        info!("stopping worker process");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.kill().await;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "worker process exited");
            },
            Ok(Err(e)) => {
                warn!(error = %e, "error waiting for worker process");
            },
            Err(_) => {
                warn!("worker did not exit gracefully, killing");
                let _ = child.kill().await;
            },
        }
    }

    /// Collect the exit status after a current-generation exit event. A
    /// worker that closed its stdout but kept running can no longer issue
    /// commands, so it is killed rather than waited on forever.
    pub async fn reap(&mut self) -> Option<std::process::ExitStatus> {
        self.stdin = None;
        let mut child = self.child.take()?;
        match tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await {
            Ok(result) => result.ok(),
            Err(_) => {
                warn!("worker closed stdout but kept running, killing");
                let _ = child.kill().await;
                child.wait().await.ok()
            },
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, tokio::time::{Duration, timeout}};

    fn sh(script: &str) -> WorkerConfig {
        WorkerConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            startup_banner: None,
            restart_on_exit: false,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_command_then_diagnostic_in_receipt_order() {
        let (mut sup, mut rx) = WorkerSupervisor::new(sh(
            r#"printf '{"type":"reply","to":"1","text":"ok"}\nnot json at all\n'"#,
        ));
        sup.start().await.unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            WorkerEvent::Command(WorkerCommand::Reply {
                to: "1".into(),
                text: "ok".into(),
            })
        );
        assert_eq!(
            next_event(&mut rx).await,
            WorkerEvent::Diagnostic("not json at all".into())
        );
        assert!(matches!(
            next_event(&mut rx).await,
            WorkerEvent::Exited { .. }
        ));
    }

    #[tokio::test]
    async fn test_send_reaches_worker_stdin() {
        // `cat` echoes stdin; the echoed frame is not a worker command, so it
        // comes back as a diagnostic.
        let (mut sup, mut rx) = WorkerSupervisor::new(WorkerConfig {
            program: "cat".into(),
            args: vec![],
            startup_banner: None,
            restart_on_exit: false,
        });
        sup.start().await.unwrap();
        sup.send(&OutboundFrame::connected("me@s.whatsapp.net")).await;

        let WorkerEvent::Diagnostic(line) = next_event(&mut rx).await else {
            panic!("expected echoed diagnostic");
        };
        assert!(line.contains(r#""status":"connected""#));
        sup.stop().await;
    }

    #[tokio::test]
    async fn test_send_without_worker_is_noop() {
        let (mut sup, _rx) = WorkerSupervisor::new(sh("true"));
        sup.send(&OutboundFrame::connected("me")).await;
    }

    #[tokio::test]
    async fn test_start_replaces_prior_instance() {
        let (mut sup, _rx) = WorkerSupervisor::new(sh("sleep 30"));
        sup.start().await.unwrap();
        let first_pid = sup.child.as_ref().unwrap().id();

        sup.start().await.unwrap();
        let second_pid = sup.child.as_ref().unwrap().id();

        assert_ne!(first_pid, second_pid);
        assert!(sup.is_running());
        sup.stop().await;
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn test_exit_events_go_stale_after_restart() {
        let (mut sup, mut rx) = WorkerSupervisor::new(sh("true"));
        sup.start().await.unwrap();

        let WorkerEvent::Exited { generation } = next_event(&mut rx).await else {
            panic!("expected exit event");
        };
        assert!(sup.is_current(generation));

        sup.start().await.unwrap();
        assert!(!sup.is_current(generation));
        sup.stop().await;
    }

    #[tokio::test]
    async fn test_stop_marks_exit_stale() {
        let (mut sup, mut rx) = WorkerSupervisor::new(sh("sleep 30"));
        sup.start().await.unwrap();
        sup.stop().await;

        let WorkerEvent::Exited { generation } = next_event(&mut rx).await else {
            panic!("expected exit event");
        };
        assert!(!sup.is_current(generation));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let (mut sup, _rx) = WorkerSupervisor::new(WorkerConfig {
            program: "nonexistent_worker_binary_xyz".into(),
            args: vec![],
            startup_banner: None,
            restart_on_exit: false,
        });
        assert!(matches!(sup.start().await, Err(Error::Spawn { .. })));
    }
}
